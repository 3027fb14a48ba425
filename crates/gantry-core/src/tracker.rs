//! Per-module install state plus the aggregate view of one pass.
//!
//! The tracker is mutated only by the orchestrator while a pass runs; the
//! presentation layer reads it afterwards to render the grid and the log.

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Sentinel shown before the server has ever been asked about a module.
pub const VERSION_UNKNOWN: &str = "(unknown)";

/// Sentinel set by reconciliation when the server does not list a module.
pub const VERSION_NOT_INSTALLED: &str = "(not installed)";

/// Where a module stands in the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleStatus {
    Pending,
    Installing,
    Installed,
    Failed,
    Skipped,
}

impl ModuleStatus {
    /// Terminal states are never left during a pass; only a new pass (or
    /// reconciliation) may overwrite them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Installed | ModuleStatus::Failed | ModuleStatus::Skipped
        )
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModuleStatus::Pending => "Pending",
            ModuleStatus::Installing => "Installing",
            ModuleStatus::Installed => "Installed",
            ModuleStatus::Failed => "Failed",
            ModuleStatus::Skipped => "Skipped",
        };
        write!(f, "{label}")
    }
}

/// One discovered artifact and its locally tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Artifact file stem; doubles as the key the fuzzy matcher bridges to
    /// graph keys and server names.
    pub name: String,

    /// Where the artifact lives on disk.
    pub artifact_path: PathBuf,

    /// Version parsed from the artifact file name, `"?"` when absent.
    pub local_version: String,

    /// Version the server reports, or one of the sentinel strings.
    pub installed_version: String,

    pub status: ModuleStatus,

    /// Cause string for the last failure; cleared when the module installs.
    pub failure: Option<String>,
}

impl ModuleRecord {
    pub fn new(name: String, artifact_path: PathBuf, local_version: String) -> Self {
        Self {
            name,
            artifact_path,
            local_version,
            installed_version: VERSION_UNKNOWN.to_string(),
            status: ModuleStatus::Pending,
            failure: None,
        }
    }
}

/// Aggregate progress counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub total: usize,
    pub completed: usize,
    pub percent: u32,
}

impl InstallProgress {
    /// Reset the counters for a pass over `total` modules.
    pub fn start(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            percent: 0,
        }
    }

    /// Count one more module as visited, whatever its outcome.
    pub fn advance(&mut self) {
        self.completed += 1;
        self.percent = self.ratio();
    }

    /// Snap to 100 once every module has been visited, so integer
    /// truncation can never leave a finished pass at 99.
    pub fn finish(&mut self) {
        if self.total > 0 && self.completed >= self.total {
            self.percent = 100;
        }
    }

    fn ratio(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100 / self.total) as u32).min(100)
    }
}

/// Mutable store of module records plus the pass activity log.
#[derive(Debug, Default)]
pub struct StatusTracker {
    records: Vec<ModuleRecord>,
    progress: InstallProgress,
    log: Vec<String>,
}

impl StatusTracker {
    pub fn new(records: Vec<ModuleRecord>) -> Self {
        Self {
            records,
            progress: InstallProgress::default(),
            log: Vec::new(),
        }
    }

    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ModuleRecord] {
        &mut self.records
    }

    pub fn progress(&self) -> InstallProgress {
        self.progress
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reset the counters at the start of a pass over `total` modules.
    pub fn begin_pass(&mut self, total: usize) {
        self.progress = InstallProgress::start(total);
    }

    pub fn advance(&mut self) {
        self.progress.advance();
    }

    pub fn finish_pass(&mut self) {
        self.progress.finish();
    }

    pub fn mark_installing(&mut self, index: usize) {
        self.records[index].status = ModuleStatus::Installing;
    }

    pub fn mark_installed(&mut self, index: usize) {
        let record = &mut self.records[index];
        record.status = ModuleStatus::Installed;
        record.failure = None;
    }

    pub fn mark_failed(&mut self, index: usize, reason: &str) {
        let record = &mut self.records[index];
        record.status = ModuleStatus::Failed;
        record.failure = Some(reason.to_string());
    }

    pub fn mark_skipped(&mut self, index: usize) {
        self.records[index].status = ModuleStatus::Skipped;
    }

    /// Append a timestamped line to the activity log and mirror it to the
    /// tracing subscriber.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.log
            .push(format!("[{}] {}", Local::now().format("%H:%M:%S"), line));
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ModuleRecord {
        ModuleRecord::new(
            name.to_string(),
            PathBuf::from(format!("{name}.jar")),
            "1.0.0".to_string(),
        )
    }

    #[test]
    fn test_new_record_starts_pending_and_unknown() {
        let r = record("patient-1.0.0");
        assert_eq!(r.status, ModuleStatus::Pending);
        assert_eq!(r.installed_version, VERSION_UNKNOWN);
        assert!(r.failure.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ModuleStatus::Pending.is_terminal());
        assert!(!ModuleStatus::Installing.is_terminal());
        assert!(ModuleStatus::Installed.is_terminal());
        assert!(ModuleStatus::Failed.is_terminal());
        assert!(ModuleStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_progress_truncates_midway_and_snaps_at_end() {
        let mut p = InstallProgress::start(3);
        p.advance();
        assert_eq!(p.percent, 33);
        p.advance();
        assert_eq!(p.percent, 66);
        p.advance();
        p.finish();
        assert_eq!(p.completed, 3);
        assert_eq!(p.percent, 100);
    }

    #[test]
    fn test_progress_with_zero_total_stays_at_zero() {
        let mut p = InstallProgress::start(0);
        p.finish();
        assert_eq!(p.percent, 0);
    }

    #[test]
    fn test_unfinished_pass_does_not_snap_to_100() {
        let mut p = InstallProgress::start(4);
        p.advance();
        p.advance();
        p.finish();
        assert_eq!(p.percent, 50);
    }

    #[test]
    fn test_mark_failed_then_installed_clears_reason() {
        let mut tracker = StatusTracker::new(vec![record("hiv-2.0.1")]);
        tracker.mark_failed(0, "connection refused");
        assert_eq!(tracker.records()[0].status, ModuleStatus::Failed);
        assert_eq!(
            tracker.records()[0].failure.as_deref(),
            Some("connection refused")
        );

        tracker.mark_installed(0);
        assert_eq!(tracker.records()[0].status, ModuleStatus::Installed);
        assert!(tracker.records()[0].failure.is_none());
    }

    #[test]
    fn test_log_lines_carry_timestamps() {
        let mut tracker = StatusTracker::new(Vec::new());
        tracker.log("starting install of patient-1.0.0");
        let lines = tracker.log_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("starting install of patient-1.0.0"));
    }
}
