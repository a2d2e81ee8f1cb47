// Engine metrics
//
// Lightweight counters for what the scheduling loop has done since start

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine counters.
///
/// Atomic so the binary can read them while the loop owns the engine.
/// Logged on every rule check at debug level and once on shutdown.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Backups written and registered
    pub backups_created: AtomicU64,

    /// Backups that failed to write
    pub backups_failed: AtomicU64,

    /// Backups removed by retention or on request
    pub backups_pruned: AtomicU64,

    pub restores_completed: AtomicU64,

    pub restores_failed: AtomicU64,

    /// Rule matching passes
    pub rule_checks: AtomicU64,

    /// Change detection passes
    pub monitor_ticks: AtomicU64,

    /// State change notifications delivered to at least one subscriber
    pub state_broadcasts: AtomicU64,

    /// State change notifications nobody was listening for
    pub state_broadcast_misses: AtomicU64,

    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            backups_created: AtomicU64::new(0),
            backups_failed: AtomicU64::new(0),
            backups_pruned: AtomicU64::new(0),
            restores_completed: AtomicU64::new(0),
            restores_failed: AtomicU64::new(0),
            rule_checks: AtomicU64::new(0),
            monitor_ticks: AtomicU64::new(0),
            state_broadcasts: AtomicU64::new(0),
            state_broadcast_misses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_backup_created(&self) {
        self.backups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backup_failed(&self) {
        self.backups_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backup_pruned(&self) {
        self.backups_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore(&self, success: bool) {
        if success {
            self.restores_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.restores_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rule_check(&self) {
        self.rule_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_monitor_tick(&self) {
        self.monitor_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast(&self) {
        self.state_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast_miss(&self) {
        self.state_broadcast_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Engine Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Backups: {} created, {} failed, {} pruned",
            self.backups_created.load(Ordering::Relaxed),
            self.backups_failed.load(Ordering::Relaxed),
            self.backups_pruned.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Restores: {} completed, {} failed",
            self.restores_completed.load(Ordering::Relaxed),
            self.restores_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Passes: {} rule checks, {} monitor ticks",
            self.rule_checks.load(Ordering::Relaxed),
            self.monitor_ticks.load(Ordering::Relaxed)
        );
        tracing::info!(
            "State broadcasts: {}, without listeners: {}",
            self.state_broadcasts.load(Ordering::Relaxed),
            self.state_broadcast_misses.load(Ordering::Relaxed)
        );
    }

    /// Log periodic metrics
    pub fn log_periodic(&self) {
        tracing::debug!(
            "Metrics: {} backups, {} pruned, {} rule checks, {} monitor ticks, uptime {:.0}s",
            self.backups_created.load(Ordering::Relaxed),
            self.backups_pruned.load(Ordering::Relaxed),
            self.rule_checks.load(Ordering::Relaxed),
            self.monitor_ticks.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = EngineMetrics::new();
        assert_eq!(metrics.backups_created.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.rule_checks.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_backup_operations() {
        let metrics = EngineMetrics::new();

        metrics.record_backup_created();
        metrics.record_backup_created();
        metrics.record_backup_failed();
        metrics.record_backup_pruned();

        assert_eq!(metrics.backups_created.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.backups_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.backups_pruned.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_restore() {
        let metrics = EngineMetrics::new();

        metrics.record_restore(true);
        metrics.record_restore(false);
        metrics.record_restore(false);

        assert_eq!(metrics.restores_completed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.restores_failed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_uptime() {
        let metrics = EngineMetrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }

    #[test]
    fn test_loop_and_broadcast_counters() {
        let metrics = EngineMetrics::new();

        metrics.record_rule_check();
        metrics.record_monitor_tick();
        metrics.record_monitor_tick();
        metrics.record_state_broadcast();
        metrics.record_state_broadcast_miss();

        assert_eq!(metrics.rule_checks.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.monitor_ticks.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.state_broadcasts.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.state_broadcast_misses.load(Ordering::Relaxed), 1);
    }
}
