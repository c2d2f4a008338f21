use thiserror::Error;

use crate::webdav::WebDavError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// 取消信号触发，不是传输错误
    #[error("操作已取消")]
    Cancelled,

    #[error("{}", worker_failure(.message, .path.as_deref()))]
    Worker {
        message: String,
        path: Option<String>,
    },

    #[error("工作线程 #{0} 已退出")]
    WorkerLost(usize),

    #[error("所有工作线程都已退出")]
    WorkersExited,

    #[error("数据流错误: {0}")]
    Stream(#[from] StreamError),

    #[error("WebDAV 错误: {0}")]
    WebDav(#[from] WebDavError),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// 失败任务的路径（如果已知）
    pub fn path(&self) -> Option<&str> {
        match self {
            TransferError::Worker { path, .. } => path.as_deref(),
            _ => None,
        }
    }
}

fn worker_failure(message: &str, path: Option<&str>) -> String {
    match path {
        Some(path) => format!("传输失败 ({}): {}", path, message),
        None => format!("传输失败: {}", message),
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("HTTP错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("服务器返回异常状态码 {0}")]
    Status(u16),

    #[error("缺少 Content-Range 响应头")]
    MissingContentRange,

    #[error("无法解析 Content-Range: {0}")]
    InvalidContentRange(String),

    #[error("服务器忽略了 Range 请求")]
    RangeIgnored,

    #[error("接收的数据超出资源大小: {received} > {total}")]
    Overflow { received: u64, total: u64 },

    #[error("连接提前结束: 已接收 {received}/{total} 字节")]
    UnexpectedEof { received: u64, total: u64 },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("数据流已中止")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_failure_mentions_path() {
        let err = TransferError::Worker {
            message: "磁盘已满".to_string(),
            path: Some("/docs/a.txt".to_string()),
        };
        assert_eq!(err.to_string(), "传输失败 (/docs/a.txt): 磁盘已满");
        assert_eq!(err.path(), Some("/docs/a.txt"));
        assert!(!err.is_cancelled());
    }
}
