//! Wall-clock and memory monitoring.

use crate::error::{EngineError, EngineResult};
use std::cell::Cell;
use std::time::Instant;

/// Returns current process memory usage in MB, or None if unavailable.
fn current_memory_mb() -> Option<f64> {
    memory_stats::memory_stats().map(|stats| stats.physical_mem as f64 / (1024.0 * 1024.0))
}

/// Wall-clock budget for one search. A zero limit means unlimited.
#[derive(Debug)]
pub struct TimeMonitor {
    start: Instant,
    limit_secs: f64,
}

impl TimeMonitor {
    pub fn new(limit_secs: f64) -> Self {
        Self {
            start: Instant::now(),
            limit_secs,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Polled between steps only; timeouts terminate the search.
    pub fn check_timeout(&self) -> EngineResult<()> {
        let elapsed = self.elapsed_secs();
        if self.limit_secs > 0.0 && elapsed > self.limit_secs {
            return Err(EngineError::Timeout { seconds: elapsed });
        }
        Ok(())
    }
}

/// Process-memory watermark tracking against a soft limit.
#[derive(Debug)]
pub struct MemoryMonitor {
    limit_mb: f64,
    max_seen_mb: Cell<f64>,
}

impl MemoryMonitor {
    pub fn new(limit_mb: f64) -> Self {
        Self {
            limit_mb,
            max_seen_mb: Cell::new(0.0),
        }
    }

    pub fn limit_mb(&self) -> f64 {
        self.limit_mb
    }

    /// Current usage in MB, updating the watermark. Zero when the platform
    /// reports nothing.
    pub fn current_mb(&self) -> f64 {
        let mb = current_memory_mb().unwrap_or(0.0);
        if mb > self.max_seen_mb.get() {
            self.max_seen_mb.set(mb);
        }
        mb
    }

    pub fn max_mb(&self) -> f64 {
        self.max_seen_mb.get()
    }

    pub fn check_memout(&self) -> EngineResult<()> {
        let mb = self.current_mb();
        if self.limit_mb > 0.0 && mb > self.limit_mb {
            return Err(EngineError::Memout { megabytes: mb });
        }
        Ok(())
    }

    /// Whether usage crossed 80% of the limit (solver cleanup threshold).
    pub fn above_cleanup_threshold(&self) -> bool {
        self.limit_mb > 0.0 && self.current_mb() > 0.8 * self.limit_mb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_times_out() {
        let t = TimeMonitor::new(0.0);
        assert!(t.check_timeout().is_ok());
        let m = MemoryMonitor::new(0.0);
        assert!(m.check_memout().is_ok());
        assert!(!m.above_cleanup_threshold());
    }

    #[test]
    fn test_tiny_time_limit_trips() {
        let t = TimeMonitor::new(1e-9);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(matches!(
            t.check_timeout(),
            Err(EngineError::Timeout { .. })
        ));
    }

    #[test]
    fn test_memory_watermark_monotone() {
        let m = MemoryMonitor::new(0.0);
        let a = m.current_mb();
        let max = m.max_mb();
        assert!(max >= a || a == 0.0);
    }
}
