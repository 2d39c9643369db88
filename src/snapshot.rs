use crate::{
    model::{DashboardStats, DriveInfo, FormatProgress, JobInfo, PendingTapeChange},
    poll::{Dataset, PollReport},
};
use anyhow::Result;
use log::warn;
use std::sync::Arc;

/// Freshness of a cached dataset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchStatus {
    /// Never fetched successfully
    #[default]
    Missing,
    /// Fetched in the most recent poll cycle
    Fresh,
    /// Last fetch failed, the previous value is retained
    Stale,
}

/// A cached value together with its freshness
#[derive(Clone, Debug, PartialEq)]
pub struct Tracked<T> {
    value: Option<T>,
    status: FetchStatus,
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self {
            value: None,
            status: FetchStatus::Missing,
        }
    }
}

impl<T> Tracked<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    fn merge(&mut self, result: Result<T>, dataset: Dataset) {
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.status = FetchStatus::Fresh;
            }
            Err(e) => {
                warn!("fetching {dataset} failed: {e:#}");
                if self.value.is_some() {
                    self.status = FetchStatus::Stale;
                }
            }
        }
    }
}

/// Most recent view of every remote dataset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub dashboard: Tracked<DashboardStats>,
    pub jobs: Tracked<Vec<JobInfo>>,
    pub drives: Tracked<Vec<DriveInfo>>,
    pub tape_changes: Tracked<Vec<PendingTapeChange>>,
    pub format_status: Tracked<Option<FormatProgress>>,
}

impl Snapshot {
    pub fn jobs(&self) -> &[JobInfo] {
        self.jobs.value().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn drives(&self) -> &[DriveInfo] {
        self.drives.value().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tape_changes(&self) -> &[PendingTapeChange] {
        self.tape_changes.value().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_pending_tape_change(&self) -> bool {
        !self.tape_changes().is_empty()
    }

    /// Format job currently running, if any has been reported
    pub fn active_format(&self) -> Option<&FormatProgress> {
        self.format_status
            .value()
            .and_then(Option::as_ref)
            .filter(|progress| progress.active)
    }
}

/// Result of applying a poll report to the cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Complete,
    Partial { failed: Vec<Dataset> },
    Failed { error: String },
}

/// Holds the current snapshot and replaces it once per poll cycle
#[derive(Default)]
pub struct SnapshotCache {
    current: Arc<Snapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    /// Merge a poll report into a new snapshot
    ///
    /// When every fetch failed the snapshot is left untouched. Otherwise failed
    /// datasets keep their previous value and are marked stale.
    pub fn apply(&mut self, report: PollReport) -> PollOutcome {
        let failures = report.failures();

        if failures.len() == Dataset::COUNT {
            for (dataset, e) in &failures {
                warn!("fetching {dataset} failed: {e:#}");
            }
            let error = failures
                .last()
                .map(|(_, e)| format!("{e:#}"))
                .unwrap_or_default();
            return PollOutcome::Failed { error };
        }

        let failed: Vec<Dataset> = failures.into_iter().map(|(dataset, _)| dataset).collect();

        let mut next = Snapshot::clone(&self.current);
        next.dashboard.merge(report.dashboard, Dataset::Dashboard);
        next.jobs.merge(report.jobs, Dataset::Jobs);
        next.drives.merge(report.drives, Dataset::Drives);
        next.tape_changes
            .merge(report.tape_changes, Dataset::TapeChanges);
        next.format_status
            .merge(report.format_status, Dataset::FormatStatus);
        self.current = Arc::new(next);

        if failed.is_empty() {
            PollOutcome::Complete
        } else {
            PollOutcome::Partial { failed }
        }
    }
}
