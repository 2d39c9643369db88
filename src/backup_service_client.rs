use crate::{
    config::Settings,
    http_client::handle_http_response,
    model::{
        DashboardStats, DriveInfo, FormatProgress, JobInfo, PendingTapeChange, TapeChangeReason,
        TapeChangeStatus,
    },
};
use anyhow::{Context, Result};
use log::debug;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, header::ACCEPT};
use serde::Deserialize;
use std::time::Duration;
use trait_variant::make;

/// Read access to the tape backup service
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait BackupService {
    async fn dashboard(&self) -> Result<DashboardStats>;
    async fn active_jobs(&self) -> Result<Vec<JobInfo>>;
    async fn drives(&self) -> Result<Vec<DriveInfo>>;
    /// Pending tape change events in server order
    async fn pending_tape_changes(&self) -> Result<Vec<PendingTapeChange>>;
    /// `None` while no format job is active
    async fn format_status(&self) -> Result<Option<FormatProgress>>;
    async fn health(&self) -> Result<()>;
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct DashboardResponse {
    total_tapes: u32,
    active_tapes: u32,
    total_jobs: u32,
    running_jobs: u32,
    drive_status: Option<serde_json::Value>,
    pool_storage: Vec<PoolStorage>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PoolStorage {
    total_capacity_bytes: u64,
    total_used_bytes: u64,
}

impl From<DashboardResponse> for DashboardStats {
    fn from(response: DashboardResponse) -> Self {
        let (total_capacity_bytes, used_capacity_bytes) = response
            .pool_storage
            .iter()
            .fold((0u64, 0u64), |(total, used), pool| {
                (
                    total.saturating_add(pool.total_capacity_bytes),
                    used.saturating_add(pool.total_used_bytes),
                )
            });

        Self {
            total_tapes: response.total_tapes,
            active_tapes: response.active_tapes,
            total_jobs: response.total_jobs,
            running_jobs: response.running_jobs,
            total_drives: u32::from(matches!(
                response.drive_status,
                Some(serde_json::Value::String(_))
            )),
            total_capacity_bytes,
            used_capacity_bytes,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Event {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    status: Option<TapeChangeStatus>,
    tape_id: Option<i64>,
}

impl Event {
    fn into_tape_change(self) -> Option<PendingTapeChange> {
        let reason = match self.kind.as_str() {
            "tape_change_required" => TapeChangeReason::TapeChangeRequired,
            "tape_full" => TapeChangeReason::TapeFull,
            _ => return None,
        };

        Some(PendingTapeChange {
            id: self.id,
            reason,
            status: self.status.unwrap_or_default(),
            current_tape_id: self.tape_id.unwrap_or_default(),
        })
    }
}

/// HTTP client for the TapeBackarr REST API
#[derive(Clone)]
pub struct BackupServiceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BackupServiceClient {
    const DASHBOARD_ENDPOINT: &str = "/api/v1/dashboard";
    const ACTIVE_JOBS_ENDPOINT: &str = "/api/v1/jobs/active";
    const DRIVES_ENDPOINT: &str = "/api/v1/drives";
    const EVENTS_ENDPOINT: &str = "/api/v1/events";
    const FORMAT_STATUS_ENDPOINT: &str = "/api/v1/ltfs/format/status";
    const HEALTH_ENDPOINT: &str = "/api/v1/health";

    pub fn new(settings: &Settings, timeout: Duration) -> Result<Self> {
        Self::with_base_url(settings.base_url(), &settings.api_key, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create backup service HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        // Normalize path to always start with a single "/"
        let normalized_path = path.trim_start_matches('/');
        format!("{}/{normalized_path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = self.build_url(path);
        debug!("GET {url}");

        let res = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .context(format!("GET {url} failed"))?;

        handle_http_response(res, &format!("GET {url}")).await
    }
}

impl BackupService for BackupServiceClient {
    async fn dashboard(&self) -> Result<DashboardStats> {
        let body = self.get(Self::DASHBOARD_ENDPOINT).await?;
        let response: DashboardResponse =
            serde_json::from_str(&body).context("failed to parse dashboard")?;
        Ok(response.into())
    }

    async fn active_jobs(&self) -> Result<Vec<JobInfo>> {
        let body = self.get(Self::ACTIVE_JOBS_ENDPOINT).await?;
        serde_json::from_str(&body).context("failed to parse active jobs")
    }

    async fn drives(&self) -> Result<Vec<DriveInfo>> {
        let body = self.get(Self::DRIVES_ENDPOINT).await?;
        serde_json::from_str(&body).context("failed to parse drives")
    }

    async fn pending_tape_changes(&self) -> Result<Vec<PendingTapeChange>> {
        let body = self.get(Self::EVENTS_ENDPOINT).await?;
        let events: Vec<Event> = serde_json::from_str(&body).context("failed to parse events")?;
        Ok(events
            .into_iter()
            .filter_map(Event::into_tape_change)
            .collect())
    }

    async fn format_status(&self) -> Result<Option<FormatProgress>> {
        let body = self.get(Self::FORMAT_STATUS_ENDPOINT).await?;
        let progress: FormatProgress =
            serde_json::from_str(&body).context("failed to parse format status")?;
        Ok(progress.active.then_some(progress))
    }

    async fn health(&self) -> Result<()> {
        self.get(Self::HEALTH_ENDPOINT).await?;
        Ok(())
    }
}
