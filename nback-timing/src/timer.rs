use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Millisecond clock the engine measures every interval against.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> u64;

    fn elapsed(&self, since: u64) -> u64 {
        self.now().saturating_sub(since)
    }
}

/// Wall clock backed by `Instant`, counting from construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock that only moves when told to. Clones share the same time, so a test
/// can keep one handle and give the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Poll-loop iteration timings, kept as a bounded window.
#[derive(Debug, Clone)]
pub struct LoopStats {
    pub iteration_times: Vec<Duration>,
    pub max_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub average_ns: f64,
    pub jitter_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
    pub effective_hz: f64,
}

impl LoopStats {
    pub fn new(max_samples: usize) -> Self {
        Self {
            iteration_times: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, d: Duration) {
        if self.iteration_times.len() >= self.max_samples {
            self.iteration_times.remove(0);
        }
        self.iteration_times.push(d);
    }

    pub fn summary(&self) -> Option<LoopSummary> {
        if self.iteration_times.is_empty() {
            return None;
        }
        let times: Vec<f64> = self
            .iteration_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(LoopSummary {
            average_ns: avg,
            jitter_ns: var.sqrt(),
            min_ns: min,
            max_ns: max,
            effective_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        })
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let handle = clock.clone();
        handle.advance(25);
        assert_eq!(clock.now(), 35);
        assert_eq!(clock.elapsed(30), 5);
        assert_eq!(clock.elapsed(50), 0);
        clock.set(40);
        assert_eq!(handle.now(), 40);
    }

    #[test]
    fn loop_stats_window_is_bounded() {
        let mut stats = LoopStats::new(3);
        assert!(stats.summary().is_none());
        for ms in [1, 2, 3, 4] {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.iteration_times.len(), 3);
        let s = stats.summary().unwrap();
        assert_eq!(s.min_ns, 2_000_000.0);
        assert_eq!(s.max_ns, 4_000_000.0);
        assert_eq!(s.average_ns, 3_000_000.0);
    }
}
