//! 传输执行引擎：固定数量的工作线程执行可递归展开、可暂停、可取消的批量传输

pub mod error;
pub mod executor;
pub mod message;
pub mod progress;
pub mod signal;
pub mod stream;
pub mod task;
pub mod upload;
pub mod worker;

pub use error::{StreamError, TransferError};
pub use executor::TransferExecutor;
pub use progress::{AggregateProgress, ProgressCallback};
pub use signal::{AbortSignal, PauseSignal};
pub use stream::{ByteStream, RangeSource, ResumableStream};
pub use task::{DiskType, Task, TaskKind};
pub use upload::{RangeSink, upload_ranges};
pub use worker::{TaskContext, Worker};
