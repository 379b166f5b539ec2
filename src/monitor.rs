//! Background system sampler
//!
//! Samples CPU, memory and process count on a fixed interval into a bounded
//! history. It never touches rules or the audit log. Stopping is a flag
//! checked between samples and during the sliced sleep.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Longest single sleep, which bounds how long `stop` can take
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// One sample of system load
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub used_memory: u64,
    pub total_memory: u64,
    pub process_count: usize,
}

impl SystemMetrics {
    /// Take a sample from `system`, refreshing what is needed
    pub fn sample(system: &mut System) -> Self {
        system.refresh_cpu_usage();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::All, true);

        Self {
            timestamp: Utc::now(),
            cpu_percent: system.global_cpu_usage(),
            used_memory: system.used_memory(),
            total_memory: system.total_memory(),
            process_count: system.processes().len(),
        }
    }

    pub fn memory_percent(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        self.used_memory as f64 * 100.0 / self.total_memory as f64
    }
}

/// Handle to a running sampler thread
pub struct Sampler {
    history: Arc<Mutex<VecDeque<SystemMetrics>>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Spawn the sampling thread
    pub fn start(interval: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let history = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let cancel = Arc::new(AtomicBool::new(false));

        let thread_history = Arc::clone(&history);
        let thread_cancel = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name("userwall-sampler".to_string())
            .spawn(move || run(interval, capacity, &thread_history, &thread_cancel));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start sampler thread");
                None
            }
        };

        Self {
            history,
            cancel,
            handle,
        }
    }

    /// Flag that stops the loop when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn latest(&self) -> Option<SystemMetrics> {
        self.history.lock().back().copied()
    }

    /// Samples collected so far, oldest first
    pub fn history(&self) -> Vec<SystemMetrics> {
        self.history.lock().iter().copied().collect()
    }

    /// Stop the thread and return the collected samples
    pub fn stop(mut self) -> Vec<SystemMetrics> {
        self.shutdown();
        self.history()
    }

    fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sampler thread panicked");
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    interval: Duration,
    capacity: usize,
    history: &Mutex<VecDeque<SystemMetrics>>,
    cancel: &AtomicBool,
) {
    let mut system = System::new();
    debug!(interval_ms = interval.as_millis() as u64, "sampler started");

    while !cancel.load(Ordering::SeqCst) {
        let sample = SystemMetrics::sample(&mut system);
        {
            let mut history = history.lock();
            if history.len() == capacity {
                history.pop_front();
            }
            history.push_back(sample);
        }

        let deadline = Instant::now() + interval;
        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    debug!("sampler stopped");
}
