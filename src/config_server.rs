//! Local configuration server state, pumped from the control loop
//!
//! HTTP handlers only hold a [`ConfigServerHandle`]. Every request is queued and
//! answered by [`LocalConfigServer::pump_once`] on the control loop's task, so the
//! settings store and restart requests are never touched concurrently.

use crate::{
    backup_service_client::BackupService,
    config::{ConfigStore, FormatTouchPolicy, Settings},
    connectivity::ConnectivityState,
    network_link::{NetworkScanner, WifiNetwork},
};
use anyhow::{Context, Result, anyhow};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, oneshot};
use trait_variant::make;

const REQUEST_QUEUE_SIZE: usize = 16;

/// Device state reported on the status endpoint
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub wifi_state: ConnectivityState,
    pub wifi_ip: Ipv4Addr,
    pub api_connected: bool,
    pub api_error: String,
    pub alert_pending: bool,
    /// Seconds since the control loop started
    pub uptime: u64,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            wifi_state: ConnectivityState::Disconnected,
            wifi_ip: Ipv4Addr::UNSPECIFIED,
            api_connected: false,
            api_error: String::new(),
            alert_pending: false,
            uptime: 0,
        }
    }
}

/// Request from the configuration server to the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAction {
    Restart,
}

/// Configuration server as seen by the control loop
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait ConfigServer {
    fn publish_status(&mut self, status: DeviceStatus);
    /// Answer the requests queued so far, never waits for new ones
    async fn pump_once(&mut self);
    fn take_action(&mut self) -> Option<DeviceAction>;
}

/// Stored settings with secrets replaced by presence flags
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub wifi_ssid: String,
    pub has_wifi_password: bool,
    pub srv_host: String,
    pub srv_port: u16,
    pub has_api_key: bool,
    pub use_https: bool,
    pub brightness: u8,
    pub poll_int: u16,
    pub dev_name: String,
    pub format_touch: FormatTouchPolicy,
    pub configured: bool,
}

impl From<Settings> for SettingsView {
    fn from(settings: Settings) -> Self {
        Self {
            configured: settings.is_configured(),
            has_wifi_password: !settings.wifi_password.is_empty(),
            has_api_key: !settings.api_key.is_empty(),
            wifi_ssid: settings.wifi_ssid,
            srv_host: settings.server_host,
            srv_port: settings.server_port,
            use_https: settings.use_https,
            brightness: settings.brightness,
            poll_int: settings.poll_interval_secs,
            dev_name: settings.device_name,
            format_touch: settings.format_touch,
        }
    }
}

/// Result of probing the backup service health endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub connected: bool,
    pub error: String,
}

/// Partial settings update, absent fields keep their stored value
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct SaveSettingsRequest {
    pub wifi_ssid: Option<String>,
    #[serde(rename = "wifi_pass")]
    pub wifi_password: Option<String>,
    #[serde(rename = "srv_host")]
    pub server_host: Option<String>,
    #[serde(rename = "srv_port")]
    #[validate(minimum = 1)]
    pub server_port: Option<u16>,
    pub api_key: Option<String>,
    pub use_https: Option<bool>,
    #[validate(maximum = 100)]
    pub brightness: Option<u8>,
    #[serde(rename = "poll_int")]
    #[validate(minimum = 1)]
    pub poll_interval_secs: Option<u16>,
    #[serde(rename = "dev_name")]
    pub device_name: Option<String>,
    pub format_touch: Option<FormatTouchPolicy>,
}

impl SaveSettingsRequest {
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(ssid) = &self.wifi_ssid {
            settings.wifi_ssid = ssid.trim().to_string();
        }
        if let Some(password) = self.wifi_password.as_ref().filter(|p| !p.is_empty()) {
            settings.wifi_password = password.clone();
        }
        if let Some(host) = &self.server_host {
            settings.server_host = host.trim().to_string();
        }
        if let Some(port) = self.server_port {
            settings.server_port = port;
        }
        if let Some(api_key) = &self.api_key {
            settings.api_key = api_key.trim().to_string();
        }
        if let Some(use_https) = self.use_https {
            settings.use_https = use_https;
        }
        if let Some(brightness) = self.brightness {
            settings.brightness = brightness;
        }
        if let Some(poll_interval_secs) = self.poll_interval_secs {
            settings.poll_interval_secs = poll_interval_secs;
        }
        if let Some(name) = self.device_name.as_ref().filter(|n| !n.is_empty()) {
            settings.device_name = name.clone();
        }
        if let Some(format_touch) = self.format_touch {
            settings.format_touch = format_touch;
        }
    }
}

/// A queued HTTP request together with its reply channel
pub enum ConfigRequest {
    Settings(oneshot::Sender<Result<SettingsView>>),
    Save(SaveSettingsRequest, oneshot::Sender<Result<()>>),
    Status(oneshot::Sender<DeviceStatus>),
    Reboot(oneshot::Sender<()>),
    Reset(oneshot::Sender<Result<()>>),
    Scan(oneshot::Sender<Result<Vec<WifiNetwork>>>),
    TestConnection(oneshot::Sender<ConnectionTest>),
}

/// Cloneable sender side used by the HTTP handlers
#[derive(Clone)]
pub struct ConfigServerHandle {
    requests: mpsc::Sender<ConfigRequest>,
}

impl ConfigServerHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ConfigRequest) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.requests
            .send(build(reply_tx))
            .await
            .map_err(|_| anyhow!("device loop is not running"))?;

        reply_rx.await.context("device loop dropped the request")
    }

    pub async fn settings(&self) -> Result<SettingsView> {
        self.request(ConfigRequest::Settings).await?
    }

    pub async fn save(&self, request: SaveSettingsRequest) -> Result<()> {
        self.request(|reply| ConfigRequest::Save(request, reply))
            .await?
    }

    pub async fn status(&self) -> Result<DeviceStatus> {
        self.request(ConfigRequest::Status).await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.request(ConfigRequest::Reboot).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(ConfigRequest::Reset).await?
    }

    pub async fn scan(&self) -> Result<Vec<WifiNetwork>> {
        self.request(ConfigRequest::Scan).await?
    }

    pub async fn test_connection(&self) -> Result<ConnectionTest> {
        self.request(ConfigRequest::TestConnection).await
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("config request abandoned before reply");
    }
}

pub struct LocalConfigServer<Store, Scanner, Service>
where
    Store: ConfigStore,
    Scanner: NetworkScanner,
    Service: BackupService,
{
    store: Store,
    scanner: Scanner,
    service: Service,
    requests: mpsc::Receiver<ConfigRequest>,
    status: DeviceStatus,
    action: Option<DeviceAction>,
}

impl<Store, Scanner, Service> LocalConfigServer<Store, Scanner, Service>
where
    Store: ConfigStore,
    Scanner: NetworkScanner,
    Service: BackupService,
{
    pub fn new(store: Store, scanner: Scanner, service: Service) -> (Self, ConfigServerHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_SIZE);

        let server = Self {
            store,
            scanner,
            service,
            requests: rx,
            status: DeviceStatus::default(),
            action: None,
        };

        (server, ConfigServerHandle { requests: tx })
    }

    fn save(&mut self, request: &SaveSettingsRequest) -> Result<()> {
        request.validate().context("settings validation failed")?;

        let mut settings = self.store.load().context("failed to load settings")?;
        request.apply_to(&mut settings);
        self.store.save(&settings).context("failed to save settings")
    }

    fn reset(&mut self) -> Result<()> {
        self.store.reset().context("failed to reset settings")?;
        self.action = Some(DeviceAction::Restart);
        Ok(())
    }

    async fn handle(&mut self, request: ConfigRequest) {
        match request {
            ConfigRequest::Settings(reply) => {
                let settings = self.store.load().map(SettingsView::from);
                respond(reply, settings);
            }
            ConfigRequest::Save(request, reply) => {
                info!("saving settings");
                let result = self.save(&request);
                respond(reply, result);
            }
            ConfigRequest::Status(reply) => respond(reply, self.status.clone()),
            ConfigRequest::Reboot(reply) => {
                info!("reboot requested");
                self.action = Some(DeviceAction::Restart);
                respond(reply, ());
            }
            ConfigRequest::Reset(reply) => {
                info!("settings reset requested");
                let result = self.reset();
                respond(reply, result);
            }
            ConfigRequest::Scan(reply) => {
                let networks = self.scanner.scan().await;
                respond(reply, networks);
            }
            ConfigRequest::TestConnection(reply) => {
                let test = match self.service.health().await {
                    Ok(()) => ConnectionTest {
                        connected: true,
                        error: String::new(),
                    },
                    Err(e) => ConnectionTest {
                        connected: false,
                        error: format!("{e:#}"),
                    },
                };
                respond(reply, test);
            }
        }
    }
}

impl<Store, Scanner, Service> ConfigServer for LocalConfigServer<Store, Scanner, Service>
where
    Store: ConfigStore + Send + Sync,
    Scanner: NetworkScanner + Send + Sync,
    Service: BackupService + Send + Sync,
{
    fn publish_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    async fn pump_once(&mut self) {
        let pending = self.requests.len();

        for _ in 0..pending {
            let Ok(request) = self.requests.try_recv() else {
                break;
            };
            self.handle(request).await;
        }
    }

    fn take_action(&mut self) -> Option<DeviceAction> {
        self.action.take()
    }
}
