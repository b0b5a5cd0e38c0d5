use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

const LATENCY_BUCKETS: &[u64] = &[1, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];
const SYSTEM_REFRESH: Duration = Duration::from_secs(5);

/// Counters for the daemon's own API plus its resident memory and CPU.
pub struct DaemonMetrics {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_latency_us: AtomicU64,
    latency_histogram: Vec<AtomicU64>,
    sse_streams_opened: AtomicU64,
    start_time: Instant,
    system: RwLock<System>,
    pid: Pid,
    last_system_update: RwLock<Option<Instant>>,
    cached_cpu: AtomicU64,
    cached_memory: AtomicU64,
}

impl Default for DaemonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_histogram: LATENCY_BUCKETS.iter().map(|_| AtomicU64::new(0)).collect(),
            sse_streams_opened: AtomicU64::new(0),
            start_time: Instant::now(),
            system: RwLock::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            last_system_update: RwLock::new(None),
            cached_cpu: AtomicU64::new(0),
            cached_memory: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self, success: bool, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);

        let latency_ms = latency.as_millis() as u64;
        if let Some(i) = LATENCY_BUCKETS.iter().position(|&bucket| latency_ms <= bucket) {
            self.latency_histogram[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stream_opened(&self) {
        self.sse_streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    pub fn streams_opened(&self) -> u64 {
        self.sse_streams_opened.load(Ordering::Relaxed)
    }

    pub fn total_latency_us(&self) -> u64 {
        self.total_latency_us.load(Ordering::Relaxed)
    }

    /// `(upper bound ms, count)` per bucket, not cumulative.
    pub fn latency_histogram(&self) -> Vec<(u64, u64)> {
        LATENCY_BUCKETS
            .iter()
            .zip(self.latency_histogram.iter())
            .map(|(&bucket, count)| (bucket, count.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn update_system_metrics(&self) {
        {
            let mut last_update = self.last_system_update.write();
            if last_update.is_some_and(|at| at.elapsed() < SYSTEM_REFRESH) {
                return;
            }
            *last_update = Some(Instant::now());
        }

        let mut system = self.system.write();
        system.refresh_process(self.pid);
        if let Some(process) = system.process(self.pid) {
            let cpu = (process.cpu_usage() * 100.0) as u64;
            self.cached_cpu.store(cpu, Ordering::Relaxed);
            self.cached_memory.store(process.memory(), Ordering::Relaxed);
        }
    }

    pub fn cpu_usage(&self) -> f64 {
        self.cached_cpu.load(Ordering::Relaxed) as f64 / 100.0
    }

    pub fn memory_usage(&self) -> u64 {
        self.cached_memory.load(Ordering::Relaxed)
    }
}
