mod backoff;
mod core;
mod process;
mod stats;
mod types;

pub use backoff::RestartBackoff;
pub use core::ProcessSupervisor;
pub use stats::SupervisorStats;
pub use types::{ProcessInfo, ProcessState, RestartWindow};

#[cfg(test)]
mod tests;
