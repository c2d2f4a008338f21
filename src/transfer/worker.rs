use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use super::error::TransferError;
use super::message::{WorkerCommand, WorkerEvent};
use super::signal::{AbortSignal, PauseSignal};
use super::task::Task;

/// 执行单个任务的工作单元
///
/// 执行器为每个工作线程调用一次 [`Worker::init`]，之后每分配一个任务调用一次
/// [`Worker::run`]。`run` 返回的任务会重新进入执行器的队列（比如目录展开成文件）。
/// 暂停和取消通过 [`TaskContext`] 里的信号传递，实现方需要在暂停时停止网络 IO，
/// 并且不能丢失已传输的字节位置。
#[async_trait]
pub trait Worker: Send + Sync + Sized + 'static {
    /// 每个工作线程收到相同的一份初始化数据
    type Init: Clone + Send + Sync + 'static;

    fn init(init: Self::Init) -> Result<Self, TransferError>;

    async fn run(&self, task: Task, ctx: &TaskContext) -> Result<Vec<Task>, TransferError>;

    /// 收到 `Exit` 之后调用
    async fn shutdown(&self) {}
}

/// 任务运行期间工作单元可以访问的上下文
#[derive(Debug, Clone)]
pub struct TaskContext {
    slot: usize,
    pause: PauseSignal,
    abort: AbortSignal,
    events: UnboundedSender<WorkerEvent>,
}

impl TaskContext {
    pub fn new(
        slot: usize,
        pause: PauseSignal,
        abort: AbortSignal,
        events: UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            slot,
            pause,
            abort,
            events,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn pause_signal(&self) -> &PauseSignal {
        &self.pause
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn report_progress(&self, path: &str, transferred: u64, rate: f64) {
        let _ = self.events.send(WorkerEvent::Progress {
            slot: self.slot,
            path: path.to_string(),
            transferred,
            rate,
        });
    }

    /// 暂停时阻塞，直到恢复或被取消
    pub async fn wait_if_paused(&self) -> Result<(), TransferError> {
        if self.abort.is_aborted() {
            return Err(TransferError::Cancelled);
        }
        if !self.pause.is_paused() {
            return Ok(());
        }
        tokio::select! {
            _ = self.abort.aborted() => Err(TransferError::Cancelled),
            _ = self.pause.wait_until_resumed() => Ok(()),
        }
    }
}

/// 工作线程主循环：接收命令、执行任务、回报结果
pub(crate) async fn run_worker<W: Worker>(
    slot: usize,
    init: W::Init,
    mut commands: UnboundedReceiver<WorkerCommand>,
    events: UnboundedSender<WorkerEvent>,
) {
    let pause = PauseSignal::new();
    let abort = AbortSignal::new();

    let worker = match W::init(init) {
        Ok(worker) => Some(worker),
        Err(e) => {
            error!("工作线程 #{} 初始化失败: {}", slot, e);
            let _ = events.send(WorkerEvent::Failed {
                error: e.to_string(),
                path: None,
            });
            None
        }
    };

    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Task { slot, task } => {
                let Some(worker) = worker.as_ref() else {
                    continue;
                };
                let path = task.display_path();
                debug!("工作线程 #{} 开始任务: {}", slot, path);

                let ctx = TaskContext::new(slot, pause.clone(), abort.clone(), events.clone());
                let mut run = Box::pin(AssertUnwindSafe(worker.run(task, &ctx)).catch_unwind());

                let outcome = loop {
                    tokio::select! {
                        result = &mut run => break Some(result),
                        command = commands.recv() => match command {
                            Some(WorkerCommand::Pause) => {
                                pause.pause();
                            }
                            Some(WorkerCommand::Resume) => {
                                pause.resume();
                            }
                            Some(WorkerCommand::Task { .. }) => {
                                warn!("工作线程 #{} 正忙，忽略新任务", slot);
                            }
                            Some(WorkerCommand::Exit) | None => break None,
                        },
                    }
                };

                let event = match outcome {
                    None => {
                        // 任务中途收到 Exit
                        abort.abort();
                        drop(run);
                        worker.shutdown().await;
                        return;
                    }
                    Some(Ok(Ok(derived))) => WorkerEvent::Finish { slot, derived },
                    Some(Ok(Err(e))) => {
                        error!("工作线程 #{} 任务失败: {}: {}", slot, path, e);
                        WorkerEvent::Failed {
                            error: e.to_string(),
                            path: Some(path),
                        }
                    }
                    Some(Err(_)) => {
                        error!("工作线程 #{} 任务异常退出: {}", slot, path);
                        WorkerEvent::Failed {
                            error: "工作线程异常退出".to_string(),
                            path: Some(path),
                        }
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            WorkerCommand::Pause => {
                pause.pause();
            }
            WorkerCommand::Resume => {
                pause.resume();
            }
            WorkerCommand::Exit => break,
        }
    }

    abort.abort();
    if let Some(worker) = worker.as_ref() {
        worker.shutdown().await;
    }
    debug!("工作线程 #{} 已退出", slot);
}
