use crate::{
    model::{DashboardStats, DriveInfo, FormatProgress, JobInfo},
    navigation::Tab,
};
use std::{net::Ipv4Addr, time::Instant};

/// A touch location in surface coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
}

/// Indicators drawn on top of every data screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusBar {
    pub wifi_connected: bool,
    pub api_connected: bool,
    pub address: Ipv4Addr,
    pub active_tab: Tab,
    pub alert_active: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Boot { version: String },
    LocalMode { name: String, address: Ipv4Addr },
    Connecting { ssid: String },
    NotConfigured { address: Ipv4Addr },
    ConnectionError { message: String, address: Ipv4Addr },
    Dashboard(DashboardStats),
    Jobs(Vec<JobInfo>),
    Drives(Vec<DriveInfo>),
    TapeAlert { reason: String },
    FormatProgress(FormatProgress),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenKind {
    Boot,
    LocalMode,
    Connecting,
    NotConfigured,
    ConnectionError,
    Dashboard,
    Jobs,
    Drives,
    TapeAlert,
    FormatProgress,
}

impl ScreenKind {
    /// Screens shown while the device cannot display remote data yet
    pub fn is_setup_screen(self) -> bool {
        matches!(
            self,
            ScreenKind::Boot
                | ScreenKind::LocalMode
                | ScreenKind::Connecting
                | ScreenKind::NotConfigured
        )
    }
}

impl Screen {
    pub fn kind(&self) -> ScreenKind {
        match self {
            Screen::Boot { .. } => ScreenKind::Boot,
            Screen::LocalMode { .. } => ScreenKind::LocalMode,
            Screen::Connecting { .. } => ScreenKind::Connecting,
            Screen::NotConfigured { .. } => ScreenKind::NotConfigured,
            Screen::ConnectionError { .. } => ScreenKind::ConnectionError,
            Screen::Dashboard(_) => ScreenKind::Dashboard,
            Screen::Jobs(_) => ScreenKind::Jobs,
            Screen::Drives(_) => ScreenKind::Drives,
            Screen::TapeAlert { .. } => ScreenKind::TapeAlert,
            Screen::FormatProgress(_) => ScreenKind::FormatProgress,
        }
    }
}

/// Output device showing screens and reporting touches
pub trait RenderSurface {
    /// Backlight level in percent
    fn set_brightness(&mut self, percent: u8);
    fn select_screen(&mut self, screen: &Screen, status: &StatusBar);
    /// Next pending touch, if any
    fn query_touch(&mut self) -> Option<TouchPoint>;
    fn tab_index_for_point(&self, point: TouchPoint) -> Option<usize>;
    /// Advance time based effects
    fn update(&mut self, now: Instant);
}

impl<T: RenderSurface + ?Sized> RenderSurface for &mut T {
    fn set_brightness(&mut self, percent: u8) {
        (**self).set_brightness(percent)
    }

    fn select_screen(&mut self, screen: &Screen, status: &StatusBar) {
        (**self).select_screen(screen, status)
    }

    fn query_touch(&mut self) -> Option<TouchPoint> {
        (**self).query_touch()
    }

    fn tab_index_for_point(&self, point: TouchPoint) -> Option<usize> {
        (**self).tab_index_for_point(point)
    }

    fn update(&mut self, now: Instant) {
        (**self).update(now)
    }
}
