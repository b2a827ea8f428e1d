//! Uplink activity log.
//!
//! Counts what the engine did across cycles so an operator can see how often
//! the radio was actually used and why cycles ended without a transmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters for the current run.
#[derive(Debug)]
pub struct UplinkLog {
    /// Cycles started
    cycles: AtomicU64,
    /// Sub-windows classified
    sub_windows: AtomicU64,
    /// Frames accepted by the radio
    transmissions: AtomicU64,
    /// Cycles skipped because the decision was unchanged
    unchanged: AtomicU64,
    /// Cycles skipped because no slot met the threshold
    below_threshold: AtomicU64,
    /// Sends rejected by duty-cycle enforcement
    duty_cycle_rejections: AtomicU64,
    /// Cycles aborted by sensor, classifier or radio errors
    failures: AtomicU64,
    /// Identifies this run in persisted stats and logs
    session_id: Uuid,
    /// Run start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl UplinkLog {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            sub_windows: AtomicU64::new(0),
            transmissions: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            below_threshold: AtomicU64::new(0),
            duty_cycle_rejections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            session_id: Uuid::new_v4(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues the counters stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous uplink stats: {}", e);
        }

        log
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sub_windows(&self, count: u64) {
        self.sub_windows.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_transmission(&self) {
        self.transmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_below_threshold(&self) {
        self.below_threshold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duty_cycle_rejection(&self) {
        self.duty_cycle_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> UplinkStats {
        UplinkStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            sub_windows: self.sub_windows.load(Ordering::Relaxed),
            transmissions: self.transmissions.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            below_threshold: self.below_threshold.load(Ordering::Relaxed),
            duty_cycle_rejections: self.duty_cycle_rejections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            session_id: self.session_id,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Uplink Statistics (session {}):\n\
             - Cycles run: {}\n\
             - Sub-windows classified: {}\n\
             - Messages transmitted: {}\n\
             - Skipped (unchanged): {}\n\
             - Skipped (below threshold): {}\n\
             - Duty-cycle rejections: {}\n\
             - Failed cycles: {}\n\
             - Session duration: {} seconds",
            &stats.session_id.to_string()[..8],
            stats.cycles,
            stats.sub_windows,
            stats.transmissions,
            stats.unchanged,
            stats.below_threshold,
            stats.duty_cycle_rejections,
            stats.failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                cycles: stats.cycles,
                sub_windows: stats.sub_windows,
                transmissions: stats.transmissions,
                unchanged: stats.unchanged,
                below_threshold: stats.below_threshold,
                duty_cycle_rejections: stats.duty_cycle_rejections,
                failures: stats.failures,
                last_session: stats.session_id,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.cycles.store(persisted.cycles, Ordering::Relaxed);
                self.sub_windows
                    .store(persisted.sub_windows, Ordering::Relaxed);
                self.transmissions
                    .store(persisted.transmissions, Ordering::Relaxed);
                self.unchanged.store(persisted.unchanged, Ordering::Relaxed);
                self.below_threshold
                    .store(persisted.below_threshold, Ordering::Relaxed);
                self.duty_cycle_rejections
                    .store(persisted.duty_cycle_rejections, Ordering::Relaxed);
                self.failures.store(persisted.failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.cycles.store(0, Ordering::Relaxed);
        self.sub_windows.store(0, Ordering::Relaxed);
        self.transmissions.store(0, Ordering::Relaxed);
        self.unchanged.store(0, Ordering::Relaxed);
        self.below_threshold.store(0, Ordering::Relaxed);
        self.duty_cycle_rejections.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

impl Default for UplinkLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the uplink counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkStats {
    pub cycles: u64,
    pub sub_windows: u64,
    pub transmissions: u64,
    pub unchanged: u64,
    pub below_threshold: u64,
    pub duty_cycle_rejections: u64,
    pub failures: u64,
    pub session_id: Uuid,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    cycles: u64,
    sub_windows: u64,
    transmissions: u64,
    unchanged: u64,
    below_threshold: u64,
    duty_cycle_rejections: u64,
    failures: u64,
    #[serde(default)]
    last_session: Uuid,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared uplink log.
pub type SharedUplinkLog = Arc<UplinkLog>;

/// Create a new shared uplink log.
pub fn create_shared_log() -> SharedUplinkLog {
    Arc::new(UplinkLog::new())
}

/// Create a new shared uplink log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedUplinkLog {
    Arc::new(UplinkLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uplink_log_counting() {
        let log = UplinkLog::new();

        log.record_cycle();
        log.record_cycle();
        log.record_sub_windows(21);
        log.record_transmission();
        log.record_duty_cycle_rejection();

        let stats = log.stats();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.sub_windows, 21);
        assert_eq!(stats.transmissions, 1);
        assert_eq!(stats.duty_cycle_rejections, 1);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_uplink_log_reset() {
        let log = UplinkLog::new();
        log.record_sub_windows(100);
        log.record_failure();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.sub_windows, 0);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_summary_format() {
        let log = UplinkLog::new();
        let summary = log.summary();

        assert!(summary.contains("Cycles run"));
        assert!(summary.contains("Duty-cycle rejections"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("motion-uplink-test-{}", uuid::Uuid::new_v4()))
            .join("uplink.json");

        let log = UplinkLog::with_persistence(path.clone());
        log.record_cycle();
        log.record_transmission();
        log.save().unwrap();

        let restored = UplinkLog::with_persistence(path.clone());
        let stats = restored.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.transmissions, 1);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
