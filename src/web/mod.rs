//! HTTP status server: run state, run log, and a trigger for new runs.
//!
//! The server and the exporter share only files: the progress file in the
//! export directory, the run log, and the lock file naming the running
//! exporter's PID.

pub mod lock;
pub mod logs;
pub mod server;

pub use lock::RunLock;
pub use server::{router, serve, AppState};
