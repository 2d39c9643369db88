use crate::config::Settings;
use anyhow::Result;
use log::{error, info, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use serde_repr::Serialize_repr;
use std::{
    net::Ipv4Addr,
    time::{Duration, Instant},
};

/// Time allowed for an association attempt before falling back to local mode
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize_repr)]
#[repr(u8)]
pub enum ConnectivityState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    LocalMode = 3,
}

/// Association state reported by the network link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Associating,
    Associated,
    Down,
}

/// Wireless link driven by the connectivity manager
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NetworkLink {
    fn begin_association(&mut self, ssid: &str, password: &str) -> Result<()>;
    fn link_status(&mut self) -> LinkStatus;
    fn start_access_point(&mut self, name: &str) -> Result<()>;
    fn station_address(&self) -> Option<Ipv4Addr>;
    fn access_point_address(&self) -> Option<Ipv4Addr>;
}

pub struct ConnectivityManager<L: NetworkLink> {
    link: L,
    state: ConnectivityState,
    ssid: String,
    password: String,
    access_point_name: String,
    attempt_started: Option<Instant>,
}

impl<L: NetworkLink> ConnectivityManager<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: ConnectivityState::Disconnected,
            ssid: String::new(),
            password: String::new(),
            access_point_name: String::new(),
            attempt_started: None,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectivityState::Connected
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn access_point_name(&self) -> &str {
        &self.access_point_name
    }

    /// Start associating with the configured network, or open the setup access point
    pub fn start(&mut self, settings: &Settings, now: Instant) {
        self.ssid = settings.wifi_ssid.clone();
        self.password = settings.wifi_password.clone();
        self.access_point_name = settings.access_point_name().to_string();

        if settings.has_wifi_credentials() {
            self.begin_association(now);
        } else {
            self.enter_local_mode();
        }
    }

    pub fn tick(&mut self, now: Instant) {
        match self.state {
            ConnectivityState::Connecting => {
                if self.link.link_status() == LinkStatus::Associated {
                    self.state = ConnectivityState::Connected;
                    info!("wifi connected, address: {}", self.address());
                } else if self
                    .attempt_started
                    .is_some_and(|started| now.saturating_duration_since(started) >= CONNECT_TIMEOUT)
                {
                    warn!("wifi connection timeout, starting access point");
                    self.enter_local_mode();
                }
            }
            ConnectivityState::Connected => {
                if self.link.link_status() != LinkStatus::Associated {
                    warn!("wifi disconnected, reconnecting");
                    self.begin_association(now);
                }
            }
            ConnectivityState::Disconnected | ConnectivityState::LocalMode => {}
        }
    }

    /// Device address in the current mode, unspecified while not associated
    pub fn address(&self) -> Ipv4Addr {
        let address = match self.state {
            ConnectivityState::Connected => self.link.station_address(),
            ConnectivityState::LocalMode => self.link.access_point_address(),
            ConnectivityState::Disconnected | ConnectivityState::Connecting => None,
        };
        address.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    fn begin_association(&mut self, now: Instant) {
        info!("connecting to wifi: {}", self.ssid);

        if let Err(e) = self.link.begin_association(&self.ssid, &self.password) {
            error!("failed to begin wifi association: {e:#}");
        }

        self.state = ConnectivityState::Connecting;
        self.attempt_started = Some(now);
    }

    fn enter_local_mode(&mut self) {
        if let Err(e) = self.link.start_access_point(&self.access_point_name) {
            error!("failed to start access point: {e:#}");
        }

        self.state = ConnectivityState::LocalMode;
        self.attempt_started = None;
        info!("access point started: {}", self.access_point_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use mockall::predicate::eq;

    fn with_credentials() -> Settings {
        Settings {
            wifi_ssid: "backup-lan".to_string(),
            wifi_password: "secret".to_string(),
            ..Default::default()
        }
    }

    mod start {
        use super::*;

        #[test]
        fn with_credentials_enters_connecting() {
            let mut link = MockNetworkLink::new();
            link.expect_begin_association()
                .with(eq("backup-lan"), eq("secret"))
                .times(1)
                .returning(|_, _| Ok(()));
            link.expect_start_access_point().never();

            let mut manager = ConnectivityManager::new(link);
            manager.start(&with_credentials(), Instant::now());

            assert_eq!(manager.state(), ConnectivityState::Connecting);
            assert_eq!(manager.address(), Ipv4Addr::UNSPECIFIED);
        }

        #[test]
        fn failing_association_still_enters_connecting() {
            let mut link = MockNetworkLink::new();
            link.expect_begin_association()
                .returning(|_, _| Err(anyhow!("nmcli not found")));

            let mut manager = ConnectivityManager::new(link);
            manager.start(&with_credentials(), Instant::now());

            assert_eq!(manager.state(), ConnectivityState::Connecting);
        }

        #[test]
        fn without_ssid_enters_local_mode() {
            let mut link = MockNetworkLink::new();
            link.expect_begin_association().never();
            link.expect_start_access_point()
                .with(eq("TapeBackarr-CYD"))
                .times(1)
                .returning(|_| Ok(()));
            link.expect_access_point_address()
                .returning(|| Some(Ipv4Addr::new(192, 168, 4, 1)));

            let mut manager = ConnectivityManager::new(link);
            manager.start(&Settings::default(), Instant::now());

            assert_eq!(manager.state(), ConnectivityState::LocalMode);
            assert_eq!(manager.address(), Ipv4Addr::new(192, 168, 4, 1));
        }
    }

    mod tick {
        use super::*;

        fn connecting_manager(
            statuses: Vec<LinkStatus>,
        ) -> (ConnectivityManager<MockNetworkLink>, Instant) {
            let mut link = MockNetworkLink::new();
            link.expect_begin_association().returning(|_, _| Ok(()));
            link.expect_start_access_point().returning(|_| Ok(()));
            link.expect_station_address()
                .returning(|| Some(Ipv4Addr::new(10, 0, 0, 42)));
            link.expect_access_point_address()
                .returning(|| Some(Ipv4Addr::new(192, 168, 4, 1)));

            let mut statuses = statuses.into_iter();
            link.expect_link_status()
                .returning(move || statuses.next().unwrap_or(LinkStatus::Associating));

            let start = Instant::now();
            let mut manager = ConnectivityManager::new(link);
            manager.start(&with_credentials(), start);
            (manager, start)
        }

        #[test]
        fn association_completes_connection() {
            let (mut manager, start) = connecting_manager(vec![LinkStatus::Associated]);

            manager.tick(start + Duration::from_millis(20));

            assert!(manager.is_connected());
            assert_eq!(manager.address(), Ipv4Addr::new(10, 0, 0, 42));
        }

        #[test]
        fn stays_connecting_just_before_timeout() {
            let (mut manager, start) = connecting_manager(vec![]);

            manager.tick(start + CONNECT_TIMEOUT - Duration::from_millis(1));

            assert_eq!(manager.state(), ConnectivityState::Connecting);
        }

        #[test]
        fn falls_back_to_local_mode_at_timeout() {
            let (mut manager, start) = connecting_manager(vec![]);

            manager.tick(start + CONNECT_TIMEOUT);

            assert_eq!(manager.state(), ConnectivityState::LocalMode);
            assert_eq!(manager.address(), Ipv4Addr::new(192, 168, 4, 1));
        }

        #[test]
        fn falls_back_to_local_mode_after_timeout() {
            let (mut manager, start) = connecting_manager(vec![]);

            manager.tick(start + CONNECT_TIMEOUT + Duration::from_millis(1));

            assert_eq!(manager.state(), ConnectivityState::LocalMode);
        }

        #[test]
        fn link_loss_restarts_association_with_fresh_timer() {
            let (mut manager, start) = connecting_manager(vec![
                LinkStatus::Associated,
                LinkStatus::Down,
                LinkStatus::Associating,
            ]);

            manager.tick(start);
            assert!(manager.is_connected());

            let lost = start + Duration::from_secs(60);
            manager.tick(lost);
            assert_eq!(manager.state(), ConnectivityState::Connecting);

            // a timer carried over from the first attempt would have expired here
            manager.tick(lost + Duration::from_secs(1));
            assert_eq!(manager.state(), ConnectivityState::Connecting);
        }

        #[test]
        fn local_mode_is_terminal() {
            let (mut manager, start) = connecting_manager(vec![]);
            manager.tick(start + CONNECT_TIMEOUT);

            manager.tick(start + CONNECT_TIMEOUT * 10);

            assert_eq!(manager.state(), ConnectivityState::LocalMode);
        }
    }
}
