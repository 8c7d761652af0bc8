// Peek - Live-state Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Capture metrics for monitoring the snapshot engine

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::Duration,
};

use once_cell::sync::Lazy;
use peek_common::types::{CaptureKind, Snapshot, SnapshotFlag};
use serde::{Deserialize, Serialize};

static GLOBAL: Lazy<CaptureMetrics> = Lazy::new(CaptureMetrics::new);

/// Per capture kind statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    /// Number of snapshots produced
    pub snapshots: u64,
    /// Total variables across those snapshots
    pub variables: u64,
}

impl KindStats {
    /// Average number of variables per snapshot
    pub fn avg_variables(&self) -> f64 {
        if self.snapshots == 0 {
            0.0
        } else {
            self.variables as f64 / self.snapshots as f64
        }
    }
}

/// Counters updated by every capture
#[derive(Debug, Default)]
pub struct CaptureMetrics {
    captures: AtomicU64,
    snapshots: AtomicU64,
    failed: AtomicU64,
    time_exceeded: AtomicU64,
    vars_exceeded: AtomicU64,
    skipped_breakpoints: AtomicU64,
    total_capture_time_us: AtomicU64,
    max_capture_time_us: AtomicU64,
    by_kind: RwLock<BTreeMap<CaptureKind, KindStats>>,
}

impl CaptureMetrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide collector used by the capture entry points
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Record one capture run: one walk, any number of snapshots
    pub fn record_capture(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.captures.fetch_add(1, Ordering::Relaxed);
        self.total_capture_time_us.fetch_add(micros, Ordering::Relaxed);
        self.max_capture_time_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Record a snapshot handed to the host
    pub fn record_snapshot(&self, kind: CaptureKind, snapshot: &Snapshot) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
        if snapshot.has_flag(SnapshotFlag::CaptureFailed) {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if snapshot.has_flag(SnapshotFlag::TimeExceeded) {
            self.time_exceeded.fetch_add(1, Ordering::Relaxed);
        }
        if snapshot.has_flag(SnapshotFlag::VarsExceeded) {
            self.vars_exceeded.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut by_kind) = self.by_kind.write() {
            let stats = by_kind.entry(kind).or_default();
            stats.snapshots += 1;
            stats.variables += snapshot.variable_table.len() as u64;
        }
    }

    /// Record breakpoints dropped by the per-line limit
    pub fn record_skipped(&self, count: usize) {
        self.skipped_breakpoints.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Average wall time of a capture run in milliseconds
    pub fn avg_capture_time_ms(&self) -> f64 {
        let captures = self.captures.load(Ordering::Relaxed);
        if captures == 0 {
            0.0
        } else {
            self.total_capture_time_us.load(Ordering::Relaxed) as f64 / captures as f64 / 1000.0
        }
    }

    /// Point-in-time copy of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            captures: self.captures.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            time_exceeded: self.time_exceeded.load(Ordering::Relaxed),
            vars_exceeded: self.vars_exceeded.load(Ordering::Relaxed),
            skipped_breakpoints: self.skipped_breakpoints.load(Ordering::Relaxed),
            avg_capture_time_ms: self.avg_capture_time_ms(),
            max_capture_time_ms: self.max_capture_time_us.load(Ordering::Relaxed) as f64 / 1000.0,
            by_kind: self.by_kind.read().map(|m| m.clone()).unwrap_or_default(),
        }
    }
}

/// Serializable view of [`CaptureMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Capture runs
    pub captures: u64,
    /// Snapshots produced
    pub snapshots: u64,
    /// Snapshots degraded by a capture fault
    pub failed: u64,
    /// Snapshots cut short by the time budget
    pub time_exceeded: u64,
    /// Snapshots cut short by the variable ceiling
    pub vars_exceeded: u64,
    /// Breakpoints dropped by the per-line limit
    pub skipped_breakpoints: u64,
    /// Average capture run time in milliseconds
    pub avg_capture_time_ms: f64,
    /// Slowest capture run in milliseconds
    pub max_capture_time_ms: f64,
    /// Statistics per capture kind
    pub by_kind: BTreeMap<CaptureKind, KindStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn snapshot(flags: &[SnapshotFlag]) -> Snapshot {
        Snapshot {
            frames: vec![],
            variable_table: Default::default(),
            watches: vec![],
            flags: flags.iter().copied().collect::<BTreeSet<_>>(),
            tags: Default::default(),
            log_message: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_summary() {
        let metrics = CaptureMetrics::new();
        assert_eq!(metrics.summary(), MetricsSummary::default());
        assert_eq!(metrics.avg_capture_time_ms(), 0.0);
    }

    #[test]
    fn test_counts_flags_and_kinds() {
        let metrics = CaptureMetrics::new();
        metrics.record_capture(Duration::from_millis(2));
        metrics.record_capture(Duration::from_millis(4));
        metrics.record_snapshot(CaptureKind::Full, &snapshot(&[SnapshotFlag::TimeExceeded]));
        metrics.record_snapshot(CaptureKind::Full, &snapshot(&[]));
        metrics.record_snapshot(
            CaptureKind::LogPoint,
            &snapshot(&[SnapshotFlag::CaptureFailed, SnapshotFlag::VarsExceeded]),
        );
        metrics.record_skipped(3);

        let summary = metrics.summary();
        assert_eq!(summary.captures, 2);
        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.time_exceeded, 1);
        assert_eq!(summary.vars_exceeded, 1);
        assert_eq!(summary.skipped_breakpoints, 3);
        assert!((summary.avg_capture_time_ms - 3.0).abs() < 1e-9);
        assert!((summary.max_capture_time_ms - 4.0).abs() < 1e-9);
        assert_eq!(summary.by_kind[&CaptureKind::Full].snapshots, 2);
        assert_eq!(summary.by_kind[&CaptureKind::LogPoint].avg_variables(), 0.0);
    }

    #[test]
    fn test_summary_serializes() {
        let metrics = CaptureMetrics::new();
        metrics.record_snapshot(CaptureKind::Profile, &snapshot(&[]));
        let json = serde_json::to_value(metrics.summary()).unwrap();
        assert_eq!(json["snapshots"], 1);
        assert_eq!(json["by_kind"]["profile"]["snapshots"], 1);
    }
}
