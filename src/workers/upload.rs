use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::{debug, warn};

use super::WorkerInit;
use crate::transfer::progress::RateMeter;
use crate::transfer::{Task, TaskContext, TaskKind, TransferError, Worker, upload_ranges};
use crate::webdav::WebDavClient;

/// 把本地文件或目录上传到远程
pub struct UploadWorker {
    client: WebDavClient,
    chunk_size: usize,
}

#[async_trait]
impl Worker for UploadWorker {
    type Init = WorkerInit;

    fn init(init: WorkerInit) -> Result<Self, TransferError> {
        Ok(Self {
            client: init.client,
            chunk_size: init.chunk_size,
        })
    }

    async fn run(&self, task: Task, ctx: &TaskContext) -> Result<Vec<Task>, TransferError> {
        match task.kind {
            TaskKind::Directory => self.expand_directory(&task, ctx).await,
            TaskKind::File => {
                self.upload_file(&task, ctx).await?;
                Ok(Vec::new())
            }
        }
    }
}

impl UploadWorker {
    async fn expand_directory(
        &self,
        task: &Task,
        ctx: &TaskContext,
    ) -> Result<Vec<Task>, TransferError> {
        ctx.wait_if_paused().await?;
        self.client
            .mkdir(task.disk_type, task.group_id.as_deref(), &task.remote_path)
            .await?;

        let mut children = Vec::new();
        let mut dir = fs::read_dir(&task.local_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("跳过无法编码的文件名: {}", entry.path().display());
                continue;
            };
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                children.push(task.child(TaskKind::Directory, &name, None));
            } else if meta.is_file() {
                children.push(task.child(TaskKind::File, &name, Some(meta.len())));
            } else {
                warn!("跳过非普通文件: {}", entry.path().display());
            }
        }

        debug!("展开本地目录 {}: {} 项", task.local_path.display(), children.len());
        Ok(children)
    }

    async fn upload_file(&self, task: &Task, ctx: &TaskContext) -> Result<(), TransferError> {
        let path = task.display_path();
        let group = task.group_id.as_deref();

        // 先创建空文件，内容全部通过部分写入填充
        self.client
            .create_empty(task.disk_type, group, &task.remote_path)
            .await?;
        let sink = self.client.range_sink(task.disk_type, group, &task.remote_path)?;

        let mut reader = BufReader::new(File::open(&task.local_path).await?);
        let mut meter = RateMeter::default();
        meter.record(0);
        ctx.report_progress(&path, 0, 0.0);

        let sent = upload_ranges(
            &sink,
            &mut reader,
            0,
            self.chunk_size,
            ctx.pause_signal(),
            ctx.abort_signal(),
            |offset| {
                let rate = meter.record(offset);
                ctx.report_progress(&path, offset, rate);
            },
        )
        .await?;

        ctx.report_progress(&path, sent, 0.0);
        debug!("上传完成: {} -> {} ({} 字节)", task.local_path.display(), path, sent);
        Ok(())
    }
}
