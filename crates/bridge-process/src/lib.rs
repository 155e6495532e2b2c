//! Lanzamiento y supervisión del proceso hijo.

pub mod launch;
pub mod log_buffer;
pub mod supervisor;

pub use launch::{GcAlgorithm, JvmOptions, LaunchSpec};
pub use log_buffer::{LogLine, LogRing, LogStream};
pub use supervisor::{ProcessSupervisor, SupervisorOptions, CHILD_LOG_TARGET};
