pub const DEFAULT_API_PORT: u16 = 7420;

pub const DEFAULT_LOCAL_SWEEP_SECS: u64 = 30;
pub const DEFAULT_REMOTE_SWEEP_SECS: u64 = 120;
pub const DEFAULT_LOCAL_HTTP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HTTP_ATTEMPTS: u32 = 3;
pub const DEFAULT_HTTP_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 1000;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_RESTART_WINDOW_SECS: u64 = 600;

pub const DEFAULT_STDIO_TAIL_BYTES: u64 = 64 * 1024;
pub const DEFAULT_STDIO_FRESH_SECS: u64 = 60;
pub const DEFAULT_STDIO_STALE_SECS: u64 = 300;

pub const DEFAULT_LOG_POLL_MS: u64 = 500;
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 1024;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 100 * 1024 * 1024;

pub const HEALTH_URL_ENV: &str = "HEALTH_HTTP_URL";
