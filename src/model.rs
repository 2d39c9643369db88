//! Data reported by the backup service, decoded from its JSON representation

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_tapes: u32,
    pub active_tapes: u32,
    pub total_jobs: u32,
    pub running_jobs: u32,
    pub total_drives: u32,
    pub total_capacity_bytes: u64,
    pub used_capacity_bytes: u64,
}

impl DashboardStats {
    /// Used capacity in percent of total, 0 when no capacity is known
    pub fn used_percent(&self) -> u8 {
        if self.total_capacity_bytes == 0 {
            return 0;
        }
        let pct = self.used_capacity_bytes.saturating_mul(100) / self.total_capacity_bytes;
        pct.min(100) as u8
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Initializing,
    Scanning,
    Streaming,
    Cataloging,
    Completed,
    Failed,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Paused,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(from = "JobRecord")]
pub struct JobInfo {
    #[serde(rename = "job_id")]
    pub id: i64,
    #[serde(rename = "job_name")]
    pub name: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub file_count: u64,
    pub total_files: u64,
    pub total_bytes: u64,
    pub bytes_written: u64,
    /// Bytes per second
    pub write_speed: f64,
    pub tape_label: String,
    pub tape_capacity_bytes: u64,
    pub tape_used_bytes: u64,
    pub estimated_seconds_remaining: f64,
    pub tape_estimated_seconds_remaining: f64,
    pub start_time: String,
    pub scan_files_found: u64,
    pub scan_dirs_scanned: u64,
    pub scan_bytes_found: u64,
}

impl Default for JobInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: "Unknown".to_string(),
            phase: JobPhase::default(),
            status: JobStatus::default(),
            file_count: 0,
            total_files: 0,
            total_bytes: 0,
            bytes_written: 0,
            write_speed: 0.0,
            tape_label: String::new(),
            tape_capacity_bytes: 0,
            tape_used_bytes: 0,
            estimated_seconds_remaining: 0.0,
            tape_estimated_seconds_remaining: 0.0,
            start_time: String::new(),
            scan_files_found: 0,
            scan_dirs_scanned: 0,
            scan_bytes_found: 0,
        }
    }
}

impl JobInfo {
    /// Write progress in percent, 0 while the total is still unknown
    pub fn progress_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        (self.bytes_written.saturating_mul(100) / self.total_bytes).min(100) as u8
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    Ready,
    Busy,
    Offline,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeFormat {
    Raw,
    Ltfs,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(from = "DriveRecord")]
pub struct DriveInfo {
    pub id: i64,
    pub display_name: String,
    pub vendor: String,
    pub model: String,
    pub status: DriveStatus,
    pub current_tape: String,
    #[serde(rename = "format_type")]
    pub format: TapeFormat,
    pub device_path: String,
    pub enabled: bool,
}

impl Default for DriveInfo {
    fn default() -> Self {
        Self {
            id: 0,
            display_name: "Unknown".to_string(),
            vendor: String::new(),
            model: String::new(),
            status: DriveStatus::default(),
            current_tape: "None".to_string(),
            format: TapeFormat::default(),
            device_path: String::new(),
            enabled: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeChangeReason {
    TapeChangeRequired,
    TapeFull,
}

impl fmt::Display for TapeChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapeChangeReason::TapeChangeRequired => write!(f, "tape change required"),
            TapeChangeReason::TapeFull => write!(f, "tape full"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeChangeStatus {
    #[default]
    Pending,
    Acknowledged,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingTapeChange {
    pub id: i64,
    pub reason: TapeChangeReason,
    pub status: TapeChangeStatus,
    pub current_tape_id: i64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPhase {
    Formatting,
    Verifying,
    Mounting,
    Labeling,
    Finalizing,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FormatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatPhase::Formatting => "Formatting",
            FormatPhase::Verifying => "Verifying",
            FormatPhase::Mounting => "Mounting",
            FormatPhase::Labeling => "Labeling",
            FormatPhase::Finalizing => "Finalizing",
            FormatPhase::Unknown => "Working",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(from = "FormatRecord")]
pub struct FormatProgress {
    pub active: bool,
    pub phase: FormatPhase,
    pub device_path: String,
    #[serde(rename = "progress_pct")]
    pub progress_percent: u8,
    pub elapsed_seconds: u64,
    pub error: String,
}

// Wire records accept `null` for every field. Absent and null values both
// fall back to the defaults of the decoded type.

#[derive(Deserialize)]
struct JobRecord {
    job_id: Option<i64>,
    job_name: Option<String>,
    phase: Option<JobPhase>,
    status: Option<JobStatus>,
    file_count: Option<u64>,
    total_files: Option<u64>,
    total_bytes: Option<u64>,
    bytes_written: Option<u64>,
    write_speed: Option<f64>,
    tape_label: Option<String>,
    tape_capacity_bytes: Option<u64>,
    tape_used_bytes: Option<u64>,
    estimated_seconds_remaining: Option<f64>,
    tape_estimated_seconds_remaining: Option<f64>,
    start_time: Option<String>,
    scan_files_found: Option<u64>,
    scan_dirs_scanned: Option<u64>,
    scan_bytes_found: Option<u64>,
}

impl From<JobRecord> for JobInfo {
    fn from(record: JobRecord) -> Self {
        let default = Self::default();
        Self {
            id: record.job_id.unwrap_or(default.id),
            name: record.job_name.unwrap_or(default.name),
            phase: record.phase.unwrap_or(default.phase),
            status: record.status.unwrap_or(default.status),
            file_count: record.file_count.unwrap_or(default.file_count),
            total_files: record.total_files.unwrap_or(default.total_files),
            total_bytes: record.total_bytes.unwrap_or(default.total_bytes),
            bytes_written: record.bytes_written.unwrap_or(default.bytes_written),
            write_speed: record.write_speed.unwrap_or(default.write_speed),
            tape_label: record.tape_label.unwrap_or(default.tape_label),
            tape_capacity_bytes: record
                .tape_capacity_bytes
                .unwrap_or(default.tape_capacity_bytes),
            tape_used_bytes: record.tape_used_bytes.unwrap_or(default.tape_used_bytes),
            estimated_seconds_remaining: record
                .estimated_seconds_remaining
                .unwrap_or(default.estimated_seconds_remaining),
            tape_estimated_seconds_remaining: record
                .tape_estimated_seconds_remaining
                .unwrap_or(default.tape_estimated_seconds_remaining),
            start_time: record.start_time.unwrap_or(default.start_time),
            scan_files_found: record.scan_files_found.unwrap_or(default.scan_files_found),
            scan_dirs_scanned: record.scan_dirs_scanned.unwrap_or(default.scan_dirs_scanned),
            scan_bytes_found: record.scan_bytes_found.unwrap_or(default.scan_bytes_found),
        }
    }
}

#[derive(Deserialize)]
struct DriveRecord {
    id: Option<i64>,
    display_name: Option<String>,
    vendor: Option<String>,
    model: Option<String>,
    status: Option<DriveStatus>,
    current_tape: Option<String>,
    format_type: Option<TapeFormat>,
    device_path: Option<String>,
    enabled: Option<bool>,
}

impl From<DriveRecord> for DriveInfo {
    fn from(record: DriveRecord) -> Self {
        let default = Self::default();
        Self {
            id: record.id.unwrap_or(default.id),
            display_name: record.display_name.unwrap_or(default.display_name),
            vendor: record.vendor.unwrap_or(default.vendor),
            model: record.model.unwrap_or(default.model),
            status: record.status.unwrap_or(default.status),
            current_tape: record.current_tape.unwrap_or(default.current_tape),
            format: record.format_type.unwrap_or(default.format),
            device_path: record.device_path.unwrap_or(default.device_path),
            enabled: record.enabled.unwrap_or(default.enabled),
        }
    }
}

#[derive(Deserialize)]
struct FormatRecord {
    active: Option<bool>,
    phase: Option<FormatPhase>,
    device_path: Option<String>,
    progress_pct: Option<f64>,
    elapsed_seconds: Option<u64>,
    error: Option<String>,
}

impl From<FormatRecord> for FormatProgress {
    fn from(record: FormatRecord) -> Self {
        Self {
            active: record.active.unwrap_or_default(),
            phase: record.phase.unwrap_or_default(),
            device_path: record.device_path.unwrap_or_default(),
            progress_percent: record
                .progress_pct
                .map(|pct| pct.clamp(0.0, 100.0).round() as u8)
                .unwrap_or_default(),
            elapsed_seconds: record.elapsed_seconds.unwrap_or_default(),
            error: record.error.unwrap_or_default(),
        }
    }
}
