use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebDavError {
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("无效的地址: {0}")]
    InvalidUrl(String),

    #[error("群组云盘需要指定群组 ID")]
    MissingGroup,

    #[error("{method} {url} 返回状态码 {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("远程路径不存在: {0}")]
    NotFound(String),

    #[error("响应解析失败: {0}")]
    InvalidResponse(String),
}

impl From<url::ParseError> for WebDavError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}
