pub mod remote;
pub mod services;

pub use services::dispatcher::{StreamDispatcher, StreamError};
pub use services::worker_pool::{FailurePolicy, PostHandler, WorkerPool};
