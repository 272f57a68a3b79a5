pub mod pool;
pub mod retry;

pub use pool::{JobReport, LogSink, PoolError, PoolJob, PoolOptions, Processor, Retryable, WorkerPool};
pub use retry::RetryPolicy;
