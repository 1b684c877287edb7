use serde::Deserialize;
use std::fs;

use crate::pipeline::Credentials;
use crate::transform::LengthPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Full request URL; built from `lat`/`lon` when absent.
    pub url: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_fcst_type")]
    pub fcst_type: String,
    #[serde(default = "default_forecast_raw_prefix")]
    pub raw_prefix: String,
    #[serde(default = "default_forecast_csv_prefix")]
    pub csv_prefix: String,
    #[serde(default)]
    pub length_policy: LengthPolicy,
}

impl ForecastConfig {
    pub fn request_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "https://forecast.weather.gov/MapClick.php?lat={}&lon={}&unit=0&lg=english&FcstType={}",
                self.lat, self.lon, self.fcst_type
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnergyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_energy_url_base")]
    pub url_base: String,
    #[serde(default = "default_location")]
    pub location: String,
    /// First day (`YYYYMMDD`) of the scheduled range; the range ends today.
    pub start_date: Option<String>,
    #[serde(default = "default_energy_raw_prefix")]
    pub raw_prefix: String,
    #[serde(default = "default_energy_csv_prefix")]
    pub csv_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EnergyConfig {
    pub fn day_url(&self, day: &str) -> String {
        format!(
            "{}/day/{day}/location/{}",
            self.url_base.trim_end_matches('/'),
            self.location
        )
    }

    pub fn master_path(&self) -> String {
        format!("{}master_{}.csv", self.csv_prefix, self.location)
    }

    /// Replace configured credentials with non-empty overrides; an empty
    /// value counts as unset.
    pub fn override_credentials(&mut self, username: Option<String>, password: Option<String>) {
        if let Some(user) = username.filter(|u| !u.is_empty()) {
            self.username = Some(user);
        }
        if let Some(pass) = password.filter(|p| !p.is_empty()) {
            self.password = Some(pass);
        }
    }

    /// Basic credentials, present only when both halves are configured and
    /// non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between runs; a single run when absent.
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub forecast: ForecastConfig,
    pub energy: EnergyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("FEED_INGEST_CONFIG").unwrap_or_else(|_| "feed-ingest.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let mut cfg = Self::from_toml(&contents)?;

        cfg.energy
            .override_credentials(env::var("ISO_NE_USER").ok(), env::var("ISO_NE_PASS").ok());
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

fn default_true() -> bool {
    true
}

fn default_fcst_type() -> String {
    "digitalDWML".to_string()
}

fn default_forecast_raw_prefix() -> String {
    "nws_raw/".to_string()
}

fn default_forecast_csv_prefix() -> String {
    "nws_flat/".to_string()
}

fn default_energy_url_base() -> String {
    "https://webservices.iso-ne.com/api/v1.1/realtimehourlydemand".to_string()
}

fn default_location() -> String {
    "4004".to_string()
}

fn default_energy_raw_prefix() -> String {
    "nws_energy_raw/".to_string()
}

fn default_energy_csv_prefix() -> String {
    "nws_energy_flat/".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("feed-ingest/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [storage]
        root_dir = "/var/lib/feed-ingest"

        [forecast]
        lat = 41.94
        lon = -72.685

        [energy]
        start_date = "20250801"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = AppConfig::from_toml(MINIMAL).unwrap();

        assert!(cfg.forecast.enabled);
        assert_eq!(cfg.forecast.length_policy, LengthPolicy::Truncate);
        assert_eq!(
            cfg.forecast.request_url(),
            "https://forecast.weather.gov/MapClick.php?lat=41.94&lon=-72.685&unit=0&lg=english&FcstType=digitalDWML"
        );
        assert_eq!(cfg.energy.location, "4004");
        assert_eq!(cfg.energy.master_path(), "nws_energy_flat/master_4004.csv");
        assert_eq!(
            cfg.energy.day_url("20250825"),
            "https://webservices.iso-ne.com/api/v1.1/realtimehourlydemand/day/20250825/location/4004"
        );
        assert_eq!(cfg.fetch.timeout_secs, 60);
        assert!(cfg.schedule.interval_secs.is_none());
        assert!(cfg.metrics.is_none());
        assert!(cfg.energy.credentials().is_none());
    }

    #[test]
    fn explicit_url_and_policy_are_honoured() {
        let toml = r#"
            [storage]
            root_dir = "data"

            [forecast]
            url = "http://localhost:9000/dwml.xml"
            lat = 0.0
            lon = 0.0
            length_policy = "reject"

            [energy]
            enabled = false
            url_base = "http://localhost:9001/api/"
            username = "u"
            password = "p"
        "#;
        let cfg = AppConfig::from_toml(toml).unwrap();

        assert_eq!(cfg.forecast.request_url(), "http://localhost:9000/dwml.xml");
        assert_eq!(cfg.forecast.length_policy, LengthPolicy::Reject);
        assert!(!cfg.energy.enabled);
        assert_eq!(cfg.energy.day_url("20250101"), "http://localhost:9001/api/day/20250101/location/4004");
        assert_eq!(cfg.energy.credentials().map(|c| c.username), Some("u".to_string()));
    }

    #[test]
    fn empty_credentials_count_as_unset() {
        let mut cfg = AppConfig::from_toml(MINIMAL).unwrap();
        cfg.energy.override_credentials(Some(String::new()), Some(String::new()));
        assert!(cfg.energy.username.is_none());
        assert!(cfg.energy.credentials().is_none());

        cfg.energy.username = Some(String::new());
        cfg.energy.password = Some(String::new());
        assert!(cfg.energy.credentials().is_none());

        cfg.energy.override_credentials(Some("u".to_string()), Some("p".to_string()));
        assert_eq!(cfg.energy.credentials().map(|c| c.password), Some("p".to_string()));
    }

    #[test]
    fn missing_storage_is_an_error() {
        assert!(AppConfig::from_toml("[forecast]\nlat = 1.0\nlon = 2.0\n[energy]\n").is_err());
    }
}
