use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::WorkerInit;
use crate::transfer::progress::RateMeter;
use crate::transfer::{ResumableStream, Task, TaskContext, TaskKind, TransferError, Worker};
use crate::webdav::WebDavClient;

/// 未完成下载的后缀
const PART_SUFFIX: &str = ".part";

/// 把远程文件或目录下载到本地
pub struct DownloadWorker {
    client: WebDavClient,
}

#[async_trait]
impl Worker for DownloadWorker {
    type Init = WorkerInit;

    fn init(init: WorkerInit) -> Result<Self, TransferError> {
        Ok(Self {
            client: init.client,
        })
    }

    async fn run(&self, task: Task, ctx: &TaskContext) -> Result<Vec<Task>, TransferError> {
        match task.kind {
            TaskKind::Directory => self.expand_directory(&task, ctx).await,
            TaskKind::File => {
                self.download_file(&task, ctx).await?;
                Ok(Vec::new())
            }
        }
    }
}

impl DownloadWorker {
    // 创建本地目录，每个子项派生一个任务
    async fn expand_directory(
        &self,
        task: &Task,
        ctx: &TaskContext,
    ) -> Result<Vec<Task>, TransferError> {
        ctx.wait_if_paused().await?;
        fs::create_dir_all(&task.local_path).await?;
        let entries = self
            .client
            .list(task.disk_type, task.group_id.as_deref(), &task.remote_path)
            .await?;

        debug!("展开目录 {}: {} 项", task.remote_path, entries.len());
        Ok(entries
            .iter()
            .map(|e| task.child(e.kind, &e.name, Some(e.size)))
            .collect())
    }

    async fn download_file(&self, task: &Task, ctx: &TaskContext) -> Result<(), TransferError> {
        let path = task.display_path();
        if let Some(parent) = task.local_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part_path = part_path(&task.local_path);
        let mut offset = fs::metadata(&part_path).await.map(|m| m.len()).unwrap_or(0);

        let source = self
            .client
            .range_source(task.disk_type, task.group_id.as_deref(), &task.remote_path)?;
        let mut stream = ResumableStream::new(
            source,
            ctx.pause_signal().clone(),
            ctx.abort_signal().clone(),
        );

        let total = stream.total().await?;
        if offset > total {
            warn!("残留文件比远程文件大，重新下载: {}", part_path.display());
            fs::remove_file(&part_path).await?;
            offset = 0;
        } else if offset > 0 {
            info!("从 {} 字节处继续下载: {}", offset, path);
        }
        let mut stream = stream.starting_at(offset);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&part_path)
            .await?;

        let mut meter = RateMeter::default();
        meter.record(offset);
        ctx.report_progress(&path, offset, 0.0);

        while let Some(chunk) = stream.next_chunk().await? {
            file.write_all(&chunk).await?;

            let received = stream.bytes_received();
            let rate = meter.record(received);
            ctx.report_progress(&path, received, rate);
        }
        file.flush().await?;
        drop(file);

        fs::rename(&part_path, &task.local_path).await?;
        ctx.report_progress(&path, stream.bytes_received(), 0.0);
        debug!("下载完成: {} -> {}", path, task.local_path.display());
        Ok(())
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}
