//! 基于 WebDAV 的下载和上传工作者

pub mod download;
pub mod upload;

pub use download::DownloadWorker;
pub use upload::UploadWorker;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::webdav::WebDavClient;

/// 每个工作者初始化时拿到的共享参数
#[derive(Debug, Clone)]
pub struct WorkerInit {
    pub client: WebDavClient,
    pub chunk_size: usize,
}

impl WorkerInit {
    pub fn new(client: WebDavClient) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}
