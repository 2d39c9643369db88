//! Poll gating and the fixed-order fetch cycle

use crate::{
    backup_service_client::BackupService,
    config_server::ConfigServer,
    model::{DashboardStats, DriveInfo, FormatProgress, JobInfo, PendingTapeChange},
};
use anyhow::Result;
use std::{
    fmt,
    time::{Duration, Instant},
};

/// One of the independently fetched remote datasets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dataset {
    Dashboard,
    Jobs,
    Drives,
    TapeChanges,
    FormatStatus,
}

impl Dataset {
    pub const COUNT: usize = 5;
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Dashboard => write!(f, "dashboard"),
            Dataset::Jobs => write!(f, "active jobs"),
            Dataset::Drives => write!(f, "drives"),
            Dataset::TapeChanges => write!(f, "tape changes"),
            Dataset::FormatStatus => write!(f, "format status"),
        }
    }
}

/// Results of one poll cycle, one entry per dataset
pub struct PollReport {
    pub dashboard: Result<DashboardStats>,
    pub jobs: Result<Vec<JobInfo>>,
    pub drives: Result<Vec<DriveInfo>>,
    pub tape_changes: Result<Vec<PendingTapeChange>>,
    pub format_status: Result<Option<FormatProgress>>,
}

impl PollReport {
    /// Failed fetches in fetch order
    pub fn failures(&self) -> Vec<(Dataset, &anyhow::Error)> {
        [
            (Dataset::Dashboard, self.dashboard.as_ref().err()),
            (Dataset::Jobs, self.jobs.as_ref().err()),
            (Dataset::Drives, self.drives.as_ref().err()),
            (Dataset::TapeChanges, self.tape_changes.as_ref().err()),
            (Dataset::FormatStatus, self.format_status.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(dataset, error)| error.map(|e| (dataset, e)))
        .collect()
    }
}

/// Decide whether a poll cycle is due
pub fn should_poll(
    now: Instant,
    last_poll: Option<Instant>,
    interval: Duration,
    connected: bool,
    configured: bool,
) -> bool {
    if !connected || !configured {
        return false;
    }

    match last_poll {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

/// Fetch every dataset once, giving the configuration server a turn between fetches
pub async fn poll_once<S, C>(source: &S, server: &mut C) -> PollReport
where
    S: BackupService,
    C: ConfigServer,
{
    let dashboard = source.dashboard().await;
    server.pump_once().await;

    let jobs = source.active_jobs().await;
    server.pump_once().await;

    let drives = source.drives().await;
    server.pump_once().await;

    let tape_changes = source.pending_tape_changes().await;
    server.pump_once().await;

    let format_status = source.format_status().await;

    PollReport {
        dashboard,
        jobs,
        drives,
        tape_changes,
        format_status,
    }
}
