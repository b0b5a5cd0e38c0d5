mod cursor;
mod manager;
mod rotation;
mod types;
mod writer;

pub use manager::LogManager;
pub use rotation::{cut_point, plan_rotation, trim_front, TrimResult};
pub use types::{LogEntry, LogStats, LogSubscription};
pub use writer::LogWriteLocks;

#[cfg(test)]
mod tests;
