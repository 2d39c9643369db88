//! Text rendition of the display for headless operation
//!
//! Screens are written through the log, touches are read from stdin as `x,y`
//! lines in the 320x240 coordinate space of the panel.

use crate::{
    model::{DriveStatus, JobStatus},
    navigation::Tab,
    render::{RenderSurface, Screen, StatusBar, TouchPoint},
};
use log::{debug, info, warn};
use std::time::{Duration, Instant};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

pub const SCREEN_WIDTH: u16 = 320;
pub const SCREEN_HEIGHT: u16 = 240;
pub const TAB_BAR_Y: u16 = 210;

const ALERT_BLINK_PERIOD: Duration = Duration::from_millis(500);
const MAX_MESSAGE_LEN: usize = 35;
const MAX_LIST_ENTRIES: usize = 3;
const TOUCH_QUEUE_SIZE: usize = 8;

/// Color of the status LED
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Led {
    Off,
    Red,
    Green,
    Blue,
}

pub struct ConsoleSurface {
    touches: mpsc::Receiver<TouchPoint>,
    brightness: u8,
    led: Led,
    blinking: bool,
    last_blink: Option<Instant>,
}

impl ConsoleSurface {
    pub fn new(touches: mpsc::Receiver<TouchPoint>) -> Self {
        Self {
            touches,
            brightness: 100,
            led: Led::Off,
            blinking: false,
            last_blink: None,
        }
    }

    /// Surface fed by touch points typed on stdin
    pub fn with_stdin_touches() -> Self {
        let (tx, rx) = mpsc::channel(TOUCH_QUEUE_SIZE);
        tokio::spawn(read_touches(tx));
        Self::new(rx)
    }

    pub fn led(&self) -> Led {
        self.led
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_led(&mut self, led: Led) {
        if led != self.led {
            debug!("led: {led:?}");
            self.led = led;
        }
    }
}

impl RenderSurface for ConsoleSurface {
    fn set_brightness(&mut self, percent: u8) {
        self.brightness = percent.min(100);
        info!("brightness set to {}%", self.brightness);
    }

    fn select_screen(&mut self, screen: &Screen, status: &StatusBar) {
        for line in render_lines(screen, status) {
            info!("{line}");
        }

        self.blinking = matches!(screen, Screen::TapeAlert { .. });
        self.last_blink = None;

        match screen {
            Screen::LocalMode { .. } | Screen::FormatProgress(_) => self.set_led(Led::Blue),
            Screen::Dashboard(_) => self.set_led(Led::Green),
            Screen::ConnectionError { .. } | Screen::TapeAlert { .. } => self.set_led(Led::Red),
            _ => {}
        }
    }

    fn query_touch(&mut self) -> Option<TouchPoint> {
        self.touches.try_recv().ok()
    }

    fn tab_index_for_point(&self, point: TouchPoint) -> Option<usize> {
        if point.y < TAB_BAR_Y || point.y >= SCREEN_HEIGHT || point.x >= SCREEN_WIDTH {
            return None;
        }
        let tab_width = SCREEN_WIDTH / Tab::ALL.len() as u16;
        Some(usize::from(point.x / tab_width).min(Tab::ALL.len() - 1))
    }

    fn update(&mut self, now: Instant) {
        if !self.blinking {
            return;
        }

        match self.last_blink {
            Some(last) if now.saturating_duration_since(last) < ALERT_BLINK_PERIOD => {}
            _ => {
                self.last_blink = Some(now);
                let next = if self.led == Led::Red { Led::Off } else { Led::Red };
                self.set_led(next);
            }
        }
    }
}

async fn read_touches(tx: mpsc::Sender<TouchPoint>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_touch(&line) {
                Some(point) => {
                    if tx.send(point).await.is_err() {
                        return;
                    }
                }
                None => warn!("ignoring touch input: {line:?}"),
            },
            Ok(None) => {
                debug!("touch input closed");
                return;
            }
            Err(e) => {
                warn!("failed to read touch input: {e}");
                return;
            }
        }
    }
}

/// Parse `x,y` or `x y`
pub fn parse_touch(line: &str) -> Option<TouchPoint> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;

    if parts.next().is_some() {
        return None;
    }
    Some(TouchPoint { x, y })
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    const TB: u64 = 1 << 40;

    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b < TB => format!("{:.1} GB", b as f64 / GB as f64),
        b => format!("{:.1} TB", b as f64 / TB as f64),
    }
}

pub fn format_duration(seconds: u64) -> String {
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn status_line(status: &StatusBar) -> String {
    let tabs: Vec<String> = Tab::ALL
        .iter()
        .map(|tab| {
            if *tab == status.active_tab {
                format!("[{}]", tab.title())
            } else {
                tab.title().to_string()
            }
        })
        .collect();

    format!(
        "wifi: {} | api: {} | {} | {}",
        if status.wifi_connected { "up" } else { "down" },
        if status.api_connected { "ok" } else { "n/a" },
        status.address,
        tabs.join(" ")
    )
}

/// Text lines making up a screen
pub fn render_lines(screen: &Screen, status: &StatusBar) -> Vec<String> {
    let mut lines = match screen {
        Screen::Boot { version } => {
            vec!["TapeBackarr Monitor".to_string(), format!("v{version}")]
        }
        Screen::LocalMode { name, address } => vec![
            "Setup Mode".to_string(),
            format!("Connect to WiFi: {name}"),
            format!("Then open http://{address}"),
        ],
        Screen::Connecting { ssid } => vec!["Connecting to WiFi...".to_string(), ssid.clone()],
        Screen::NotConfigured { address } => vec![
            "Not configured".to_string(),
            format!("Open http://{address} to set up"),
        ],
        Screen::ConnectionError { message, address } => vec![
            "Connection Error".to_string(),
            truncate(message, MAX_MESSAGE_LEN),
            format!("IP: {address}"),
        ],
        Screen::Dashboard(stats) => vec![
            "Dashboard".to_string(),
            format!(
                "Tapes: {} | Active: {} | Jobs: {} | Running: {} | Drives: {}",
                stats.total_tapes,
                stats.active_tapes,
                stats.total_jobs,
                stats.running_jobs,
                stats.total_drives
            ),
            format!(
                "Storage: {} / {} ({}%)",
                format_bytes(stats.used_capacity_bytes),
                format_bytes(stats.total_capacity_bytes),
                stats.used_percent()
            ),
        ],
        Screen::Jobs(jobs) => {
            let mut lines = vec!["Active Jobs".to_string()];
            if jobs.is_empty() {
                lines.push("No active jobs".to_string());
            }
            for job in jobs.iter().take(MAX_LIST_ENTRIES) {
                let state = match job.status {
                    JobStatus::Running => "running",
                    JobStatus::Paused => "paused",
                    JobStatus::Cancelled => "cancelled",
                    JobStatus::Unknown => "unknown",
                };
                lines.push(format!(
                    "{} [{state}] {}/{} files | {} ({}%)",
                    truncate(&job.name, 25),
                    job.file_count,
                    job.total_files,
                    format_bytes(job.bytes_written),
                    job.progress_percent()
                ));
                if job.estimated_seconds_remaining > 0.0 {
                    lines.push(format!(
                        "  ETA {}",
                        format_duration(job.estimated_seconds_remaining as u64)
                    ));
                }
            }
            lines
        }
        Screen::Drives(drives) => {
            let mut lines = vec!["Drives".to_string()];
            if drives.is_empty() {
                lines.push("No drives found".to_string());
            }
            for drive in drives.iter().take(MAX_LIST_ENTRIES) {
                let state = match drive.status {
                    DriveStatus::Ready => "ready",
                    DriveStatus::Busy => "busy",
                    DriveStatus::Offline => "offline",
                    DriveStatus::Error => "error",
                    DriveStatus::Unknown => "unknown",
                };
                lines.push(format!(
                    "{} [{state}] Tape: {} [{:?}]",
                    truncate(&drive.display_name, 22),
                    drive.current_tape,
                    drive.format
                ));
            }
            lines
        }
        Screen::TapeAlert { reason } => vec![
            "! TAPE CHANGE REQUIRED !".to_string(),
            reason.clone(),
            "Please insert a new tape into the drive".to_string(),
            "Touch screen to dismiss".to_string(),
        ],
        Screen::FormatProgress(progress) => {
            let mut lines = vec![
                "LTFS Format".to_string(),
                format!("{}: {}%", progress.phase, progress.progress_percent),
                format!("Elapsed: {}", format_duration(progress.elapsed_seconds)),
            ];
            if !progress.device_path.is_empty() {
                lines.push(progress.device_path.clone());
            }
            if !progress.error.is_empty() {
                lines.push(truncate(&progress.error, MAX_MESSAGE_LEN));
            }
            lines
        }
    };

    if matches!(
        screen,
        Screen::Dashboard(_) | Screen::Jobs(_) | Screen::Drives(_)
    ) {
        lines.insert(0, status_line(status));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn status_bar() -> StatusBar {
        StatusBar {
            wifi_connected: true,
            api_connected: true,
            address: Ipv4Addr::new(10, 0, 0, 42),
            active_tab: Tab::Jobs,
            alert_active: false,
        }
    }

    fn surface() -> (ConsoleSurface, mpsc::Sender<TouchPoint>) {
        let (tx, rx) = mpsc::channel(TOUCH_QUEUE_SIZE);
        (ConsoleSurface::new(rx), tx)
    }

    mod formatting {
        use super::*;

        #[test]
        fn bytes_use_binary_units() {
            assert_eq!(format_bytes(512), "512 B");
            assert_eq!(format_bytes(1536), "1.5 KB");
            assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
            assert_eq!(format_bytes(3 * (1 << 40)), "3.0 TB");
        }

        #[test]
        fn durations_drop_seconds_after_an_hour() {
            assert_eq!(format_duration(42), "42s");
            assert_eq!(format_duration(125), "2m 5s");
            assert_eq!(format_duration(7260), "2h 1m");
        }

        #[test]
        fn error_message_is_truncated() {
            let lines = render_lines(
                &Screen::ConnectionError {
                    message: "GET http://10.0.0.5:8080/api/v1/dashboard failed".to_string(),
                    address: Ipv4Addr::new(10, 0, 0, 42),
                },
                &status_bar(),
            );
            assert_eq!(lines[0], "Connection Error");
            assert_eq!(lines[1].chars().count(), 35);
            assert_eq!(lines[2], "IP: 10.0.0.42");
        }

        #[test]
        fn data_screens_carry_status_line() {
            let lines = render_lines(&Screen::Jobs(vec![]), &status_bar());
            assert_eq!(lines[0], "wifi: up | api: ok | 10.0.0.42 | Dashboard [Jobs] Drives");
            assert_eq!(lines[2], "No active jobs");
        }
    }

    mod touch {
        use super::*;

        #[test]
        fn parses_both_separators() {
            assert_eq!(parse_touch("12,215"), Some(TouchPoint { x: 12, y: 215 }));
            assert_eq!(parse_touch(" 300 220 "), Some(TouchPoint { x: 300, y: 220 }));
            assert_eq!(parse_touch("12"), None);
            assert_eq!(parse_touch("1,2,3"), None);
            assert_eq!(parse_touch("a,b"), None);
        }

        #[test]
        fn tab_bar_maps_to_thirds() {
            let (surface, _tx) = surface();
            assert_eq!(surface.tab_index_for_point(TouchPoint { x: 10, y: 215 }), Some(0));
            assert_eq!(surface.tab_index_for_point(TouchPoint { x: 160, y: 215 }), Some(1));
            assert_eq!(surface.tab_index_for_point(TouchPoint { x: 319, y: 239 }), Some(2));
            assert_eq!(surface.tab_index_for_point(TouchPoint { x: 160, y: 100 }), None);
        }

        #[test]
        fn queued_touches_are_returned_once() {
            let (mut surface, tx) = surface();
            tx.try_send(TouchPoint { x: 1, y: 2 })
                .expect("should queue");

            assert_eq!(surface.query_touch(), Some(TouchPoint { x: 1, y: 2 }));
            assert_eq!(surface.query_touch(), None);
        }
    }

    mod led {
        use super::*;

        #[test]
        fn alert_blinks_every_half_second() {
            let (mut surface, _tx) = surface();
            surface.select_screen(
                &Screen::TapeAlert {
                    reason: "tape full".to_string(),
                },
                &status_bar(),
            );

            let start = Instant::now();
            surface.update(start);
            let first = surface.led();

            surface.update(start + Duration::from_millis(499));
            assert_eq!(surface.led(), first);

            surface.update(start + ALERT_BLINK_PERIOD);
            assert_ne!(surface.led(), first);
        }

        #[test]
        fn leaving_alert_stops_blinking() {
            let (mut surface, _tx) = surface();
            surface.select_screen(
                &Screen::TapeAlert {
                    reason: "tape full".to_string(),
                },
                &status_bar(),
            );
            surface.select_screen(&Screen::Dashboard(Default::default()), &status_bar());

            let start = Instant::now();
            surface.update(start);
            surface.update(start + Duration::from_secs(2));

            assert_eq!(surface.led(), Led::Green);
        }

        #[test]
        fn brightness_is_clamped() {
            let (mut surface, _tx) = surface();
            surface.set_brightness(250);
            assert_eq!(surface.brightness(), 100);
        }
    }
}
