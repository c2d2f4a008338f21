use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::message::{WorkerCommand, WorkerEvent};
use super::progress::{AggregateProgress, PROGRESS_INTERVAL, ProgressCallback, Slot, Throttle};
use super::signal::{AbortSignal, PauseSignal};
use super::task::Task;
use super::worker::{Worker, run_worker};

/// 暂停期间检查信号的间隔
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 发送 Exit 之后等待工作线程自行退出的时间
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// 固定数量工作线程的传输执行器
///
/// 每次 [`execute`](Self::execute) 都会创建全新的工作线程，调用结束前全部终止。
/// 种子任务交给 0 号工作线程，其余工作线程在任务完成并派生出后续任务后才开始参与，
/// 因此实际并发度随目录树的展开而增长。
pub struct TransferExecutor<W: Worker> {
    worker_count: usize,
    init: W::Init,
    abort: AbortSignal,
    pause: PauseSignal,
}

impl<W: Worker> TransferExecutor<W> {
    pub fn new(worker_count: usize, init: W::Init) -> Self {
        if worker_count == 0 {
            warn!("工作线程数不能为 0，使用 1");
        }
        Self {
            worker_count: worker_count.max(1),
            init,
            abort: AbortSignal::new(),
            pause: PauseSignal::new(),
        }
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_pause_signal(mut self, pause: PauseSignal) -> Self {
        self.pause = pause;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn pause_signal(&self) -> &PauseSignal {
        &self.pause
    }

    /// 执行种子任务及其派生出的全部任务
    ///
    /// 所有工作线程空闲且队列为空时成功；任一工作线程失败时以该错误失败；
    /// 取消信号触发时返回 [`TransferError::Cancelled`]。无论结果如何，返回前都会终止全部工作线程。
    pub async fn execute(
        &self,
        seed: Task,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(), TransferError> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut run = Execution::spawn::<W>(
            self.worker_count,
            &self.init,
            events_tx,
            self.abort.clone(),
            self.pause.clone(),
            on_progress,
        );

        let result = run.drive(seed, &mut events).await;
        run.shutdown().await;

        match &result {
            Ok(()) => info!("传输完成"),
            Err(TransferError::Cancelled) => info!("传输已取消"),
            Err(e) => warn!("传输失败: {}", e),
        }
        result
    }
}

/// 单次 execute 的全部状态，只在执行器的消息循环里修改
struct Execution {
    slots: Vec<Slot>,
    queue: VecDeque<Task>,
    commands: Vec<UnboundedSender<WorkerCommand>>,
    handles: Vec<JoinHandle<()>>,
    abort: AbortSignal,
    pause: PauseSignal,
    paused_broadcast: bool, // 最近一次广播给工作线程的暂停状态
    throttle: Throttle,
    on_progress: Option<ProgressCallback>,
}

impl Execution {
    fn spawn<W: Worker>(
        worker_count: usize,
        init: &W::Init,
        events: UnboundedSender<WorkerEvent>,
        abort: AbortSignal,
        pause: PauseSignal,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        let mut commands = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for slot in 0..worker_count {
            let (tx, rx) = mpsc::unbounded_channel();
            commands.push(tx);
            handles.push(tokio::spawn(run_worker::<W>(
                slot,
                init.clone(),
                rx,
                events.clone(),
            )));
        }
        debug!("已启动 {} 个工作线程", worker_count);

        Self {
            slots: vec![Slot::default(); worker_count],
            queue: VecDeque::new(),
            commands,
            handles,
            abort,
            pause,
            paused_broadcast: false,
            throttle: Throttle::new(PROGRESS_INTERVAL),
            on_progress,
        }
    }

    async fn drive(
        &mut self,
        seed: Task,
        events: &mut UnboundedReceiver<WorkerEvent>,
    ) -> Result<(), TransferError> {
        if self.abort.is_aborted() {
            return Err(TransferError::Cancelled);
        }

        let mut pause_rx = self.pause.subscribe();
        self.sync_pause()?;
        self.assign(0, seed)?;

        let abort = self.abort.clone();
        loop {
            if self.is_idle() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = abort.aborted() => return Err(TransferError::Cancelled),
                changed = pause_rx.changed() => {
                    if changed.is_ok() {
                        self.sync_pause()?;
                    }
                }
                event = events.recv() => {
                    // 所有工作线程都已退出
                    let Some(event) = event else {
                        return Err(TransferError::WorkersExited);
                    };
                    self.wait_while_paused().await?;
                    self.handle(event)?;
                }
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.slots.iter().all(|slot| slot.ready)
    }

    /// 暂停期间轮询等待，已送达的消息按原顺序保留到恢复之后处理
    async fn wait_while_paused(&mut self) -> Result<(), TransferError> {
        loop {
            if self.abort.is_aborted() {
                return Err(TransferError::Cancelled);
            }
            if !self.pause.is_paused() {
                break;
            }
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
        self.sync_pause()
    }

    /// 暂停状态变化时向所有工作线程广播，重复的状态不会再次广播
    fn sync_pause(&mut self) -> Result<(), TransferError> {
        let paused = self.pause.is_paused();
        if paused == self.paused_broadcast {
            return Ok(());
        }
        self.paused_broadcast = paused;

        let command = if paused {
            info!("传输已暂停");
            WorkerCommand::Pause
        } else {
            info!("传输已恢复");
            WorkerCommand::Resume
        };
        for tx in &self.commands {
            let _ = tx.send(command.clone());
        }

        if !paused {
            self.dispatch()?;
        }
        Ok(())
    }

    fn handle(&mut self, event: WorkerEvent) -> Result<(), TransferError> {
        match event {
            WorkerEvent::Progress {
                slot,
                path,
                transferred,
                rate,
            } => {
                let Some(state) = self.slots.get_mut(slot).filter(|s| !s.ready) else {
                    warn!("忽略空闲工作线程 #{} 的进度消息", slot);
                    return Ok(());
                };
                state.update(path, transferred, rate);
                if self.throttle.ready() {
                    let path = self.slots[slot].progress.current_path.clone();
                    self.emit(&path);
                }
            }
            WorkerEvent::Finish { slot, derived } => {
                let Some(state) = self.slots.get_mut(slot).filter(|s| !s.ready) else {
                    warn!("忽略空闲工作线程 #{} 的完成消息", slot);
                    return Ok(());
                };
                state.finish();
                let path = state.progress.current_path.clone();
                debug!(
                    "工作线程 #{} 完成: {}，派生 {} 个任务",
                    slot,
                    path,
                    derived.len()
                );
                self.queue.extend(derived);

                if !self.pause.is_paused() && !self.abort.is_aborted() {
                    self.emit(&path);
                    self.throttle.mark();
                }
                self.dispatch()?;
            }
            WorkerEvent::Failed { error, path } => {
                return Err(TransferError::Worker {
                    message: error,
                    path,
                });
            }
        }
        Ok(())
    }

    /// 把队首任务依次分配给第一个空闲的工作线程
    fn dispatch(&mut self) -> Result<(), TransferError> {
        while !self.pause.is_paused() && !self.abort.is_aborted() {
            let Some(slot) = self.slots.iter().position(|s| s.ready) else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.assign(slot, task)?;
        }
        Ok(())
    }

    fn assign(&mut self, slot: usize, task: Task) -> Result<(), TransferError> {
        self.slots[slot].assign(task.display_path());
        debug!("分配任务 {} -> 工作线程 #{}", task.display_path(), slot);
        self.commands[slot]
            .send(WorkerCommand::Task { slot, task })
            .map_err(|_| TransferError::WorkerLost(slot))
    }

    fn emit(&mut self, path: &str) {
        let total = AggregateProgress::of(&self.slots);
        if let Some(callback) = self.on_progress.as_mut() {
            callback(path, total.transferred, total.rate);
        }
    }

    async fn shutdown(&mut self) {
        for tx in &self.commands {
            let _ = tx.send(WorkerCommand::Exit);
        }
        for mut handle in self.handles.drain(..) {
            if tokio::time::timeout(EXIT_GRACE, &mut handle).await.is_err() {
                warn!("工作线程未能按时退出，强制终止");
                handle.abort();
                let _ = handle.await;
            }
        }
        self.commands.clear();
        self.queue.clear();
        self.slots.clear();
        self.on_progress = None;
    }
}

impl Drop for Execution {
    // execute 被中途丢弃时也不能留下工作线程
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
