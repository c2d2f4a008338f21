use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::cli::{DiskArgs, RemoteCommand, TransferArgs};
use crate::common::format::{format_bytes, format_rate};
use crate::common::logger::PrettyLogger;
use crate::common::path::{join_remote, remote_file_name, resolve_remote};
use crate::common::table::render_table;
use crate::config::AppConfig;
use crate::transfer::{
    ProgressCallback, Task, TaskKind, TransferError, TransferExecutor, Worker,
};
use crate::webdav::{RemoteEntry, WebDavClient};
use crate::workers::{DownloadWorker, UploadWorker, WorkerInit};
use crate::{log_info, log_success, log_warning};

/// 传输被用户取消时的退出码，和 shell 中被 SIGINT 结束的惯例一致
pub const EXIT_CANCELLED: i32 = 130;

/// 命令失败时的进程退出码
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if is_cancelled(err) { EXIT_CANCELLED } else { 1 }
}

pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TransferError>()
        .is_some_and(TransferError::is_cancelled)
}

/// 标准输入按行读取，交互模式和传输中的暂停切换共用
pub type InputLines = Lines<BufReader<Stdin>>;

pub fn stdin_lines() -> InputLines {
    BufReader::new(tokio::io::stdin()).lines()
}

/// 已登录的会话，保存当前远程目录
pub struct Session {
    client: WebDavClient,
    config: AppConfig,
    cwd: String,
    input: InputLines,
}

impl Session {
    pub fn new(config: AppConfig) -> Result<Self> {
        let (endpoint, credentials) = config.credentials()?;
        let client = WebDavClient::new(&endpoint, credentials)
            .with_context(|| format!("无效的服务器地址: {}", endpoint))?;
        debug!("会话已创建: {}", client.base());

        Ok(Self {
            client,
            config,
            cwd: "/".to_string(),
            input: stdin_lines(),
        })
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn resolve(&self, input: &str) -> String {
        resolve_remote(&self.cwd, input)
    }

    /// 读取一行用户输入，输入结束时返回 None
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.input.next_line().await?)
    }

    pub async fn execute(&mut self, command: RemoteCommand) -> Result<()> {
        match command {
            RemoteCommand::Ls { path, disk } => self.ls(path.as_deref(), &disk).await,
            RemoteCommand::Lsp { path, disk } => self.lsp(path.as_deref(), &disk).await,
            RemoteCommand::Mkdir { path, disk } => self.mkdir(&path, &disk).await,
            RemoteCommand::Rm { path, disk } => self.rm(&path, &disk).await,
            RemoteCommand::Download {
                remote,
                local,
                transfer,
            } => self.download(&remote, local.as_deref(), &transfer).await,
            RemoteCommand::Upload {
                local,
                remote,
                transfer,
            } => self.upload(&local, &remote, &transfer).await,
        }
    }

    /// 切换当前目录，目标必须是已存在的目录
    pub async fn cd(&mut self, path: Option<&str>) -> Result<()> {
        let target = self.resolve(path.unwrap_or("/"));
        let disk = DiskArgs::default();
        if let Some(entry) = self.client.stat(disk.disk, disk.group.as_deref(), &target).await? {
            if !entry.is_directory() {
                bail!("不是目录: {}", target);
            }
        }
        self.cwd = target;
        Ok(())
    }

    async fn list(&self, path: Option<&str>, disk: &DiskArgs) -> Result<Vec<RemoteEntry>> {
        let target = self.resolve(path.unwrap_or("."));
        let entries = self
            .client
            .list(disk.disk, disk.group.as_deref(), &target)
            .await?;
        // 目录在前，再按名称排序
        Ok(entries
            .into_iter()
            .sorted_by(|a, b| {
                b.is_directory()
                    .cmp(&a.is_directory())
                    .then_with(|| a.name.cmp(&b.name))
            })
            .collect())
    }

    pub async fn ls(&self, path: Option<&str>, disk: &DiskArgs) -> Result<()> {
        let entries = self.list(path, disk).await?;
        if entries.is_empty() {
            log_info!("目录为空");
            return Ok(());
        }

        let rows = entries
            .iter()
            .map(|e| {
                vec![
                    if e.is_directory() { "目录" } else { "文件" }.to_string(),
                    if e.is_directory() {
                        "-".to_string()
                    } else {
                        format_bytes(e.size)
                    },
                    e.modified
                        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    e.name.clone(),
                ]
            })
            .collect::<Vec<_>>();
        println!("{}", render_table(&["类型", "大小", "修改时间", "名称"], &rows));
        Ok(())
    }

    pub async fn lsp(&self, path: Option<&str>, disk: &DiskArgs) -> Result<()> {
        for entry in self.list(path, disk).await? {
            if entry.is_directory() {
                println!("{}/", entry.name);
            } else {
                println!("{}", entry.name);
            }
        }
        Ok(())
    }

    pub async fn mkdir(&self, path: &str, disk: &DiskArgs) -> Result<()> {
        let target = self.resolve(path);
        self.client
            .mkdir(disk.disk, disk.group.as_deref(), &target)
            .await?;
        log_success!("已创建目录: {}", target);
        Ok(())
    }

    pub async fn rm(&self, path: &str, disk: &DiskArgs) -> Result<()> {
        let target = self.resolve(path);
        if target == "/" {
            bail!("不能删除根目录");
        }
        self.client
            .remove(disk.disk, disk.group.as_deref(), &target)
            .await?;
        log_success!("已删除: {}", target);
        Ok(())
    }

    pub async fn download(
        &mut self,
        remote: &str,
        local: Option<&Path>,
        args: &TransferArgs,
    ) -> Result<()> {
        let remote = self.resolve(remote);
        let group = args.disk.group.clone();
        let entry = self
            .client
            .stat(args.disk.disk, group.as_deref(), &remote)
            .await?;

        let name = remote_file_name(&remote);
        let local = match (local, name) {
            (Some(dir), Some(name)) if dir.is_dir() => dir.join(name),
            (Some(path), _) => path.to_path_buf(),
            (None, Some(name)) => PathBuf::from(name),
            (None, None) => PathBuf::from("."),
        };

        let seed = match entry {
            Some(e) if !e.is_directory() => {
                Task::new(TaskKind::File, args.disk.disk, group, &remote, &local).with_size(e.size)
            }
            _ => Task::new(TaskKind::Directory, args.disk.disk, group, &remote, &local),
        };
        info!("下载 {} -> {}", remote, local.display());

        let executor = TransferExecutor::<DownloadWorker>::new(
            self.workers(args),
            WorkerInit::new(self.client.clone()).with_chunk_size(self.config.chunk_size),
        );
        let target = local.display().to_string();
        self.run_transfer(executor, seed, "下载", &target).await
    }

    pub async fn upload(&mut self, local: &Path, remote_dir: &str, args: &TransferArgs) -> Result<()> {
        let meta = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("无法访问本地路径: {}", local.display()))?;
        let absolute = tokio::fs::canonicalize(local).await?;
        let Some(name) = absolute
            .components()
            .next_back()
            .and_then(|c| c.as_os_str().to_str())
            .map(str::to_string)
        else {
            bail!("无法确定上传名称: {}", local.display());
        };

        let remote = join_remote(&self.resolve(remote_dir), &name);
        let group = args.disk.group.clone();
        let seed = if meta.is_dir() {
            Task::new(TaskKind::Directory, args.disk.disk, group, &remote, local)
        } else {
            Task::new(TaskKind::File, args.disk.disk, group, &remote, local).with_size(meta.len())
        };
        info!("上传 {} -> {}", local.display(), remote);

        let executor = TransferExecutor::<UploadWorker>::new(
            self.workers(args),
            WorkerInit::new(self.client.clone()).with_chunk_size(self.config.chunk_size),
        );
        self.run_transfer(executor, seed, "上传", &remote).await
    }

    fn workers(&self, args: &TransferArgs) -> usize {
        args.workers.unwrap_or(self.config.workers)
    }

    /// 执行一次传输：回车切换暂停，Ctrl-C 取消
    async fn run_transfer<W: Worker>(
        &mut self,
        executor: TransferExecutor<W>,
        seed: Task,
        action: &str,
        target: &str,
    ) -> Result<()> {
        let source = seed.display_path();
        let pause = executor.pause_signal().clone();
        let abort = executor.abort_signal().clone();

        let pb = transfer_spinner(action);
        let transferred = Arc::new(AtomicU64::new(0));
        let on_progress: ProgressCallback = {
            let pb = pb.clone();
            let transferred = transferred.clone();
            Box::new(move |path: &str, bytes: u64, rate: f64| {
                transferred.store(bytes, Ordering::Relaxed);
                pb.set_message(format!(
                    "{}  {}  {}",
                    path,
                    format_bytes(bytes),
                    format_rate(rate)
                ));
            })
        };

        PrettyLogger::transfer_hint();
        let started = Instant::now();
        let execution = executor.execute(seed, Some(on_progress));
        tokio::pin!(execution);

        let mut input_open = true;
        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                _ = tokio::signal::ctrl_c() => {
                    pb.println("正在取消...");
                    abort.abort();
                }
                line = self.input.next_line(), if input_open => match line {
                    Ok(Some(_)) => {
                        if pause.toggle() {
                            pb.println("已暂停，回车继续");
                        } else {
                            pb.println("已继续");
                        }
                    }
                    // 标准输入已关闭，不再响应暂停
                    Ok(None) | Err(_) => input_open = false,
                },
            }
        };
        pb.finish_and_clear();

        finish_transfer(action, result)?;
        let bytes = transferred.load(Ordering::Relaxed);
        let elapsed = started.elapsed();
        PrettyLogger::transfer_summary(
            action,
            vec![
                format!("来源: {}", source),
                format!("目标: {}", target),
                format!(
                    "大小: {}，用时 {:.1}s",
                    format_bytes(bytes),
                    elapsed.as_secs_f64()
                ),
            ],
        );
        Ok(())
    }
}

/// 取消同样作为错误返回，调用方据此决定退出码
fn finish_transfer(action: &str, result: Result<(), TransferError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => {
            log_warning!("{}已取消", action);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn transfer_spinner(action: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {prefix} {wide_msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(action.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_transfer_is_an_error() {
        let err = finish_transfer("下载", Err(TransferError::Cancelled)).unwrap_err();
        assert!(is_cancelled(&err));
        assert_eq!(exit_code(&err), EXIT_CANCELLED);
    }

    #[test]
    fn failures_exit_with_one() {
        let err = finish_transfer(
            "上传",
            Err(TransferError::Worker {
                message: "磁盘已满".to_string(),
                path: Some("/a".to_string()),
            }),
        )
        .unwrap_err();
        assert!(!is_cancelled(&err));
        assert_eq!(exit_code(&err), 1);

        let err = anyhow::anyhow!("未登录");
        assert_eq!(exit_code(&err), 1);
        assert!(finish_transfer("下载", Ok(())).is_ok());
    }
}
