use anyhow::{Context, Result, ensure};
use ini::{Ini, Properties};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs, io::ErrorKind, ops::RangeInclusive, path::PathBuf, str::FromStr,
    time::Duration,
};

pub const DEFAULT_DEVICE_NAME: &str = "TapeBackarr-CYD";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_POLL_INTERVAL_SECS: u16 = 5;
pub const DEFAULT_BRIGHTNESS: u8 = 100;

const SETTINGS_SECTION: &str = "device";

/// Process configuration loaded from the environment at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Local configuration server
    pub ui: UiConfig,

    /// Wireless interface used for association and setup mode
    pub network: NetworkConfig,

    /// Control loop timing
    pub timing: TimingConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub interface: String,
}

#[derive(Clone, Debug)]
pub struct TimingConfig {
    pub loop_period: Duration,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub settings_file: PathBuf,
}

impl AppConfig {
    /// Load and validate all configuration from environment variables
    ///
    /// Missing variables fall back to their defaults, malformed ones are an error.
    pub fn load() -> Result<Self> {
        Ok(Self {
            ui: UiConfig::load()?,
            network: NetworkConfig::load()?,
            timing: TimingConfig::load()?,
            paths: PathConfig::load()?,
        })
    }
}

impl UiConfig {
    fn load() -> Result<Self> {
        let port = env::var("UI_PORT")
            .unwrap_or_else(|_| "80".to_string())
            .parse::<u16>()
            .context("failed to parse UI_PORT: invalid format")?;

        Ok(Self { port })
    }
}

impl NetworkConfig {
    fn load() -> Result<Self> {
        let interface = env::var("WIFI_INTERFACE").unwrap_or_else(|_| "wlan0".to_string());

        Ok(Self { interface })
    }
}

impl TimingConfig {
    fn load() -> Result<Self> {
        let loop_period = env::var("LOOP_PERIOD_MS")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u64>()
            .context("failed to parse LOOP_PERIOD_MS: invalid format")?;

        let request_timeout = env::var("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u64>()
            .context("failed to parse REQUEST_TIMEOUT_MS: invalid format")?;

        Self::from_millis(loop_period, request_timeout)
    }

    fn from_millis(loop_period: u64, request_timeout: u64) -> Result<Self> {
        ensure!(loop_period > 0, "LOOP_PERIOD_MS must be positive");
        ensure!(request_timeout > 0, "REQUEST_TIMEOUT_MS must be positive");

        Ok(Self {
            loop_period: Duration::from_millis(loop_period),
            request_timeout: Duration::from_millis(request_timeout),
        })
    }
}

impl PathConfig {
    fn load() -> Result<Self> {
        let settings_file = env::var("SETTINGS_PATH")
            .unwrap_or_else(|_| "/data/config/settings.ini".to_string())
            .into();

        Ok(Self { settings_file })
    }
}

/// What a touch on the format-progress screen does
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTouchPolicy {
    /// Touch is consumed without effect
    #[default]
    Ignore,
    /// Touch hides the format screen until the format job ends
    Dismiss,
}

impl FormatTouchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTouchPolicy::Ignore => "ignore",
            FormatTouchPolicy::Dismiss => "dismiss",
        }
    }
}

impl fmt::Display for FormatTouchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTouchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(FormatTouchPolicy::Ignore),
            "dismiss" => Ok(FormatTouchPolicy::Dismiss),
            other => anyhow::bail!("unknown format touch policy: {other}"),
        }
    }
}

/// Device settings persisted in the configuration store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_key: String,
    pub use_https: bool,
    pub brightness: u8,
    pub poll_interval_secs: u16,
    pub device_name: String,
    pub format_touch: FormatTouchPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            server_host: String::new(),
            server_port: DEFAULT_SERVER_PORT,
            api_key: String::new(),
            use_https: false,
            brightness: DEFAULT_BRIGHTNESS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            format_touch: FormatTouchPolicy::default(),
        }
    }
}

impl Settings {
    /// Network identity, endpoint and credential are all present
    pub fn is_configured(&self) -> bool {
        !self.wifi_ssid.is_empty() && !self.server_host.is_empty() && !self.api_key.is_empty()
    }

    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_secs))
    }

    /// Name used for the setup access point and as hostname
    pub fn access_point_name(&self) -> &str {
        if self.device_name.is_empty() {
            DEFAULT_DEVICE_NAME
        } else {
            &self.device_name
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.server_host, self.server_port)
    }

    fn from_properties(props: &Properties) -> Self {
        let defaults = Self::default();

        Self {
            wifi_ssid: read_or(props, "wifi_ssid", defaults.wifi_ssid),
            wifi_password: read_or(props, "wifi_pass", defaults.wifi_password),
            server_host: read_or(props, "srv_host", defaults.server_host),
            server_port: read_in_range(props, "srv_port", defaults.server_port, 1..=u16::MAX),
            api_key: read_or(props, "api_key", defaults.api_key),
            use_https: read_or(props, "use_https", defaults.use_https),
            brightness: read_in_range(props, "brightness", defaults.brightness, 0..=100),
            poll_interval_secs: read_in_range(
                props,
                "poll_int",
                defaults.poll_interval_secs,
                1..=u16::MAX,
            ),
            device_name: read_or(props, "dev_name", defaults.device_name),
            format_touch: read_or(props, "format_touch", defaults.format_touch),
        }
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some(SETTINGS_SECTION))
            .set("wifi_ssid", self.wifi_ssid.as_str())
            .set("wifi_pass", self.wifi_password.as_str())
            .set("srv_host", self.server_host.as_str())
            .set("srv_port", self.server_port.to_string())
            .set("api_key", self.api_key.as_str())
            .set("use_https", self.use_https.to_string())
            .set("brightness", self.brightness.to_string())
            .set("poll_int", self.poll_interval_secs.to_string())
            .set("dev_name", self.device_name.as_str())
            .set("format_touch", self.format_touch.as_str());

        ini
    }
}

fn read_or<T: FromStr>(props: &Properties, key: &str, default: T) -> T {
    match props.get(key).map(str::parse::<T>) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            debug!("ignoring malformed setting {key}");
            default
        }
        None => default,
    }
}

fn read_in_range<T>(props: &Properties, key: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Copy,
{
    let value = read_or(props, key, default);
    if range.contains(&value) {
        value
    } else {
        debug!("ignoring out of range setting {key}");
        default
    }
}

/// Persistent storage for device settings
pub trait ConfigStore {
    fn load(&self) -> Result<Settings>;
    fn save(&mut self, settings: &Settings) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
}

/// Settings kept in a single INI file
pub struct IniConfigStore {
    path: PathBuf,
}

impl IniConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for IniConfigStore {
    fn load(&self) -> Result<Settings> {
        if !self
            .path
            .try_exists()
            .context("failed to check if settings file exists")?
        {
            info!("no settings file found at {:?}, using defaults", self.path);
            return Ok(Settings::default());
        }

        let ini = Ini::load_from_file(&self.path)
            .context(format!("failed to read settings file: {:?}", self.path))?;

        Ok(ini
            .section(Some(SETTINGS_SECTION))
            .map(Settings::from_properties)
            .unwrap_or_default())
    }

    fn save(&mut self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("failed to create settings directory")?;
        }

        settings
            .to_ini()
            .write_to_file(&self.path)
            .context(format!("failed to write settings file: {:?}", self.path))?;

        info!("settings saved to {:?}", self.path);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("settings reset"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("failed to remove settings file: {:?}", self.path));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn configured() -> Settings {
        Settings {
            wifi_ssid: "backup-lan".to_string(),
            wifi_password: "secret".to_string(),
            server_host: "10.0.0.5".to_string(),
            api_key: "key-123".to_string(),
            ..Default::default()
        }
    }

    mod settings {
        use super::*;

        #[test]
        fn defaults_are_not_configured() {
            let settings = Settings::default();
            assert!(!settings.is_configured());
            assert_eq!(settings.server_port, 8080);
            assert_eq!(settings.poll_interval(), Duration::from_secs(5));
            assert_eq!(settings.brightness, 100);
        }

        #[test]
        fn requires_ssid_host_and_key() {
            assert!(configured().is_configured());

            let mut missing_key = configured();
            missing_key.api_key.clear();
            assert!(!missing_key.is_configured());

            let mut missing_host = configured();
            missing_host.server_host.clear();
            assert!(!missing_host.is_configured());

            let mut missing_ssid = configured();
            missing_ssid.wifi_ssid.clear();
            assert!(!missing_ssid.is_configured());
        }

        #[test]
        fn base_url_follows_https_flag() {
            let mut settings = configured();
            assert_eq!(settings.base_url(), "http://10.0.0.5:8080");

            settings.use_https = true;
            settings.server_port = 8443;
            assert_eq!(settings.base_url(), "https://10.0.0.5:8443");
        }

        #[test]
        fn empty_device_name_falls_back_for_access_point() {
            let mut settings = configured();
            settings.device_name.clear();
            assert_eq!(settings.access_point_name(), DEFAULT_DEVICE_NAME);
        }
    }

    mod timing {
        use super::*;

        #[test]
        fn zero_loop_period_is_rejected() {
            let error = TimingConfig::from_millis(0, 3000).expect_err("should reject");
            assert!(error.to_string().contains("LOOP_PERIOD_MS"));
        }

        #[test]
        fn zero_request_timeout_is_rejected() {
            let error = TimingConfig::from_millis(20, 0).expect_err("should reject");
            assert!(error.to_string().contains("REQUEST_TIMEOUT_MS"));
        }

        #[test]
        fn positive_values_are_accepted() {
            let timing = TimingConfig::from_millis(20, 3000).expect("should accept");
            assert_eq!(timing.loop_period, Duration::from_millis(20));
            assert_eq!(timing.request_timeout, Duration::from_secs(3));
        }
    }

    mod ini_store {
        use super::*;

        #[test]
        fn missing_file_loads_defaults() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let store = IniConfigStore::new(dir.path().join("settings.ini"));

            assert_eq!(store.load().expect("should load"), Settings::default());
        }

        #[test]
        fn save_then_load_preserves_settings() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let mut store = IniConfigStore::new(dir.path().join("nested/settings.ini"));

            let mut settings = configured();
            settings.use_https = true;
            settings.poll_interval_secs = 30;
            settings.format_touch = FormatTouchPolicy::Dismiss;

            store.save(&settings).expect("should save");
            assert_eq!(store.load().expect("should load"), settings);
        }

        #[test]
        fn malformed_values_fall_back_to_defaults() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("settings.ini");
            fs::write(
                &path,
                "[device]\nwifi_ssid=lab\nsrv_port=not-a-port\nbrightness=999\n",
            )
            .expect("should write");

            let settings = IniConfigStore::new(&path).load().expect("should load");
            assert_eq!(settings.wifi_ssid, "lab");
            assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
            assert_eq!(settings.brightness, DEFAULT_BRIGHTNESS);
        }

        #[test]
        fn out_of_range_values_fall_back_to_defaults() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("settings.ini");
            fs::write(
                &path,
                "[device]\nsrv_port=0\nbrightness=150\npoll_int=0\n",
            )
            .expect("should write");

            let settings = IniConfigStore::new(&path).load().expect("should load");
            assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
            assert_eq!(settings.brightness, DEFAULT_BRIGHTNESS);
            assert_eq!(settings.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
            assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        }

        #[test]
        fn range_bounds_are_accepted() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("settings.ini");
            fs::write(&path, "[device]\nbrightness=0\npoll_int=1\n").expect("should write");

            let settings = IniConfigStore::new(&path).load().expect("should load");
            assert_eq!(settings.brightness, 0);
            assert_eq!(settings.poll_interval_secs, 1);
        }

        #[test]
        fn reset_removes_stored_settings() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let mut store = IniConfigStore::new(dir.path().join("settings.ini"));

            store.save(&configured()).expect("should save");
            store.reset().expect("should reset");
            assert_eq!(store.load().expect("should load"), Settings::default());

            // resetting twice is fine
            store.reset().expect("should reset again");
        }
    }
}
