use crate::{
    alert::{AlertManager, AlertPhase},
    backup_service_client::BackupService,
    config::Settings,
    config_server::{ConfigServer, DeviceAction, DeviceStatus},
    connectivity::{ConnectivityManager, ConnectivityState, NetworkLink},
    navigation::{NavigationController, Tab, TouchAction},
    poll::{Dataset, poll_once, should_poll},
    render::{RenderSurface, Screen, ScreenKind, StatusBar},
    snapshot::{PollOutcome, Snapshot, SnapshotCache},
};
use log::{debug, info, warn};
use std::{sync::Arc, time::Instant};

/// Drives connectivity, polling, alerts and navigation from a single loop
pub struct Orchestrator<Surface, Link, Source, Server>
where
    Surface: RenderSurface,
    Link: NetworkLink,
    Source: BackupService,
    Server: ConfigServer,
{
    settings: Settings,
    surface: Surface,
    connectivity: ConnectivityManager<Link>,
    source: Source,
    server: Server,
    cache: SnapshotCache,
    alert: AlertManager,
    navigation: NavigationController,
    displayed: Option<ScreenKind>,
    last_poll: Option<Instant>,
    api_connected: bool,
    last_error: String,
    started_at: Option<Instant>,
}

impl<Surface, Link, Source, Server> Orchestrator<Surface, Link, Source, Server>
where
    Surface: RenderSurface,
    Link: NetworkLink,
    Source: BackupService,
    Server: ConfigServer,
{
    pub fn new(
        settings: Settings,
        surface: Surface,
        link: Link,
        source: Source,
        server: Server,
    ) -> Self {
        Self {
            settings,
            surface,
            connectivity: ConnectivityManager::new(link),
            source,
            server,
            cache: SnapshotCache::new(),
            alert: AlertManager::new(),
            navigation: NavigationController::new(),
            displayed: None,
            last_poll: None,
            api_connected: false,
            last_error: String::new(),
            started_at: None,
        }
    }

    pub fn displayed(&self) -> Option<ScreenKind> {
        self.displayed
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    pub fn alert_phase(&self) -> AlertPhase {
        self.alert.phase()
    }

    pub fn active_tab(&self) -> Tab {
        self.navigation.active_tab()
    }

    pub fn api_connected(&self) -> bool {
        self.api_connected
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.current()
    }

    pub fn show_boot(&mut self) {
        self.show(Screen::Boot {
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
    }

    /// Apply brightness, start connecting and show the matching mode screen
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.surface.set_brightness(self.settings.brightness);
        self.connectivity.start(&self.settings, now);

        if self.connectivity.state() == ConnectivityState::LocalMode {
            self.show_local_mode();
        } else {
            self.show_connecting();
        }
    }

    /// Run one loop iteration, returning an action requested through the configuration server
    pub async fn tick(&mut self, now: Instant) -> Option<DeviceAction> {
        self.connectivity.tick(now);

        let status = self.device_status(now);
        self.server.publish_status(status);
        self.server.pump_once().await;

        self.surface.update(now);

        let mut refresh = self.handle_touch(now);

        match self.connectivity.state() {
            ConnectivityState::LocalMode => {
                if self.displayed != Some(ScreenKind::LocalMode) {
                    self.show_local_mode();
                }
                return self.server.take_action();
            }
            ConnectivityState::Disconnected | ConnectivityState::Connecting => {
                if self.displayed != Some(ScreenKind::Connecting) {
                    self.show_connecting();
                }
                return self.server.take_action();
            }
            ConnectivityState::Connected => {}
        }

        if !self.settings.is_configured() {
            if self.displayed != Some(ScreenKind::NotConfigured) {
                self.show(Screen::NotConfigured {
                    address: self.connectivity.address(),
                });
            }
            return self.server.take_action();
        }

        if should_poll(
            now,
            self.last_poll,
            self.settings.poll_interval(),
            self.connectivity.is_connected(),
            self.settings.is_configured(),
        ) {
            self.last_poll = Some(now);
            refresh = self.poll().await;
        }

        if refresh || self.displayed.is_none_or(ScreenKind::is_setup_screen) {
            self.refresh();
        }

        self.server.take_action()
    }

    /// Returns whether the data screens should be redrawn
    async fn poll(&mut self) -> bool {
        let previous_jobs = self.cache.current().jobs().len();
        let report = poll_once(&self.source, &mut self.server).await;

        match self.cache.apply(report) {
            PollOutcome::Failed { error } => {
                warn!("poll failed: {error}");
                self.api_connected = false;
                self.last_error = error.clone();
                self.show(Screen::ConnectionError {
                    message: error,
                    address: self.connectivity.address(),
                });
                return false;
            }
            PollOutcome::Partial { failed } => {
                self.api_connected = false;
                self.last_error = format!("failed to fetch {}", join(&failed));
            }
            PollOutcome::Complete => {
                if !self.api_connected {
                    info!("backup service connected");
                }
                self.api_connected = true;
                self.last_error.clear();
            }
        }

        let snapshot = self.cache.current();
        self.navigation
            .observe_jobs(previous_jobs, snapshot.jobs().len());
        self.navigation
            .observe_format(snapshot.active_format().is_some());
        self.alert.observe(snapshot.has_pending_tape_change());
        true
    }

    fn handle_touch(&mut self, now: Instant) -> bool {
        let Some(point) = self.surface.query_touch() else {
            return false;
        };

        // tabs are not drawn on setup screens
        if self.displayed.is_none_or(ScreenKind::is_setup_screen) {
            debug!("touch at {},{} ignored on setup screen", point.x, point.y);
            return false;
        }

        let tab_hit = self
            .surface
            .tab_index_for_point(point)
            .and_then(Tab::from_index);
        let action = self.navigation.handle_touch(
            now,
            self.displayed,
            tab_hit,
            self.settings.format_touch,
        );
        debug!("touch at {},{}: {action:?}", point.x, point.y);

        if action == TouchAction::DismissAlert {
            self.alert.dismiss();
        }
        action.needs_refresh()
    }

    fn refresh(&mut self) {
        let snapshot = self.cache.current();
        let screen = self
            .navigation
            .select_screen(self.alert.is_shown(), &snapshot);
        self.show(screen);
    }

    fn show_local_mode(&mut self) {
        self.show(Screen::LocalMode {
            name: self.connectivity.access_point_name().to_string(),
            address: self.connectivity.address(),
        });
    }

    fn show_connecting(&mut self) {
        self.show(Screen::Connecting {
            ssid: self.connectivity.ssid().to_string(),
        });
    }

    fn show(&mut self, screen: Screen) {
        let status = self.status_bar();
        self.surface.select_screen(&screen, &status);
        self.displayed = Some(screen.kind());
    }

    fn status_bar(&self) -> StatusBar {
        StatusBar {
            wifi_connected: self.connectivity.is_connected(),
            api_connected: self.api_connected,
            address: self.connectivity.address(),
            active_tab: self.navigation.active_tab(),
            alert_active: self.alert.is_shown(),
        }
    }

    fn device_status(&self, now: Instant) -> DeviceStatus {
        DeviceStatus {
            wifi_state: self.connectivity.state(),
            wifi_ip: self.connectivity.address(),
            api_connected: self.api_connected,
            api_error: self.last_error.clone(),
            alert_pending: self.cache.current().has_pending_tape_change(),
            uptime: self
                .started_at
                .map(|started| now.saturating_duration_since(started).as_secs())
                .unwrap_or_default(),
        }
    }
}

fn join(datasets: &[Dataset]) -> String {
    datasets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
