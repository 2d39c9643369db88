use crate::connectivity::{LinkStatus, NetworkLink};
use anyhow::{Context, Result, ensure};
use log::{debug, info, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use serde::Serialize;
use std::{net::Ipv4Addr, process::Stdio};
use tokio::process::{Child, Command};
use trait_variant::make;

/// A wireless network found by a scan
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WifiNetwork {
    pub ssid: String,
    /// Signal strength in dBm
    pub rssi: i32,
    pub secure: bool,
}

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NetworkScanner {
    async fn scan(&self) -> Result<Vec<WifiNetwork>>;
}

/// Wireless link managed through NetworkManager's `nmcli`
pub struct NmcliLink {
    interface: String,
    pending: Option<Child>,
}

impl NmcliLink {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            pending: None,
        }
    }

    fn spawn(&mut self, args: &[&str]) -> Result<()> {
        if let Some(mut previous) = self.pending.take()
            && let Err(e) = previous.start_kill()
        {
            debug!("failed to stop previous nmcli call: {e}");
        }

        let child = Command::new("nmcli")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn nmcli")?;

        self.pending = Some(child);
        Ok(())
    }

    fn interface_address(&self) -> Option<Ipv4Addr> {
        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("failed to read interface addresses: {e}");
                return None;
            }
        };

        interfaces
            .into_iter()
            .filter(|iface| iface.name == self.interface)
            .find_map(|iface| match iface.ip() {
                std::net::IpAddr::V4(addr) => Some(addr),
                std::net::IpAddr::V6(_) => None,
            })
    }
}

impl NetworkLink for NmcliLink {
    fn begin_association(&mut self, ssid: &str, password: &str) -> Result<()> {
        let interface = self.interface.clone();
        let mut args = vec!["device", "wifi", "connect", ssid];
        if !password.is_empty() {
            args.extend(["password", password]);
        }
        args.extend(["ifname", &interface]);

        self.spawn(&args)
    }

    fn link_status(&mut self) -> LinkStatus {
        if let Some(child) = self.pending.as_mut() {
            match child.try_wait() {
                Ok(None) => return LinkStatus::Associating,
                Ok(Some(status)) => {
                    if !status.success() {
                        warn!("nmcli exited with {status}");
                    }
                    self.pending = None;
                }
                Err(e) => {
                    warn!("failed to poll nmcli: {e}");
                    self.pending = None;
                }
            }
        }

        if self.interface_address().is_some() {
            LinkStatus::Associated
        } else {
            LinkStatus::Down
        }
    }

    fn start_access_point(&mut self, name: &str) -> Result<()> {
        info!("starting hotspot {name} on {}", self.interface);
        let interface = self.interface.clone();
        self.spawn(&["device", "wifi", "hotspot", "ifname", &interface, "ssid", name])
    }

    fn station_address(&self) -> Option<Ipv4Addr> {
        self.interface_address()
    }

    fn access_point_address(&self) -> Option<Ipv4Addr> {
        self.interface_address()
    }
}

/// Scans for networks with `nmcli device wifi list`
#[derive(Clone)]
pub struct NmcliScanner {
    interface: String,
}

impl NmcliScanner {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }
}

impl NetworkScanner for NmcliScanner {
    async fn scan(&self) -> Result<Vec<WifiNetwork>> {
        let output = Command::new("nmcli")
            .args(["-t", "-f", "SSID,SIGNAL,SECURITY", "device", "wifi", "list"])
            .args(["--rescan", "yes", "ifname", &self.interface])
            .output()
            .await
            .context("failed to run nmcli")?;

        ensure!(
            output.status.success(),
            "wifi scan failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        Ok(parse_scan_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse terse `SSID:SIGNAL:SECURITY` lines, skipping hidden networks
fn parse_scan_output(output: &str) -> Vec<WifiNetwork> {
    output
        .lines()
        .filter_map(|line| {
            // SSIDs may contain escaped colons, so split from the right
            let mut fields = line.rsplitn(3, ':');
            let security = fields.next()?;
            let signal: i32 = fields.next()?.parse().ok()?;
            let ssid = fields.next()?.replace("\\:", ":");

            if ssid.is_empty() {
                return None;
            }

            Some(WifiNetwork {
                ssid,
                rssi: signal / 2 - 100,
                secure: !security.is_empty() && security != "--",
            })
        })
        .collect()
}
