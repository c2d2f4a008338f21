use super::task::Task;

/// 执行器发给工作线程的消息
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Task { slot: usize, task: Task },
    Pause,
    Resume,
    /// 强制终止前的最后一条消息
    Exit,
}

/// 工作线程发给执行器的消息
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Finish {
        slot: usize,
        derived: Vec<Task>, // 需要继续执行的后续任务
    },
    Progress {
        slot: usize,
        path: String,
        transferred: u64,
        rate: f64,
    },
    /// 不可恢复的错误，整个操作失败
    Failed {
        error: String,
        path: Option<String>,
    },
}
