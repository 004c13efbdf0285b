//! Configuration for the mock API.
//!
//! Defines the listening address, the backing data file, booking simulation
//! parameters, and global router settings.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the mock API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockApiConfig {
    /// Listening address
    #[serde(default)]
    pub server: ServerConfig,

    /// Backing data document
    #[serde(default)]
    pub data: DataConfig,

    /// Booking simulation
    #[serde(default)]
    pub booking: BookingSettings,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockApiConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.booking
            .validate()
            .map_err(|e| anyhow::anyhow!("booking: {}", e))?;
        self.settings
            .validate()
            .map_err(|e| anyhow::anyhow!("settings: {}", e))?;
        if self.data.path.as_os_str().is_empty() {
            anyhow::bail!("data: path cannot be empty");
        }
        Ok(())
    }
}

/// Listening address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Overridden by `--port` or the `PORT` environment variable
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3001
}

/// Location of the JSON document holding every record collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("db.json")
}

/// Booking simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingSettings {
    /// Latency applied before the outcome is drawn
    #[serde(default = "default_booking_delay")]
    pub delay: DelayConfig,

    /// Probability of a simulated failure (0.0 - 1.0)
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    #[serde(default = "default_success_message")]
    pub success_message: String,

    #[serde(default = "default_failure_message")]
    pub failure_message: String,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            delay: default_booking_delay(),
            failure_rate: default_failure_rate(),
            success_message: default_success_message(),
            failure_message: default_failure_message(),
        }
    }
}

impl BookingSettings {
    /// Validate the booking settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            anyhow::bail!("failure_rate must be within 0.0..=1.0, got {}", self.failure_rate);
        }
        if self.success_message.is_empty() || self.failure_message.is_empty() {
            anyhow::bail!("booking messages cannot be empty");
        }
        self.delay.validate()
    }
}

fn default_booking_delay() -> DelayConfig {
    DelayConfig {
        fixed_ms: 1000,
        min_ms: 0,
        max_ms: 0,
    }
}

fn default_failure_rate() -> f64 {
    0.2
}

fn default_success_message() -> String {
    "Booking simulated successfully!".to_string()
}

fn default_failure_message() -> String {
    "An unexpected error occurred. Please try again.".to_string()
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> Duration {
        if self.fixed_ms > 0 {
            return Duration::from_millis(self.fixed_ms);
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms));
        }
        Duration::from_millis(self.min_ms)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.fixed_ms == 0 && self.max_ms != 0 && self.max_ms < self.min_ms {
            anyhow::bail!(
                "delay max_ms ({}) is below min_ms ({})",
                self.max_ms,
                self.min_ms
            );
        }
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log every booking payload
    #[serde(default = "default_true")]
    pub log_bookings: bool,

    /// Log listings answered by the property filter
    #[serde(default = "default_true")]
    pub log_filtered: bool,

    /// Reject every write made through the record router
    #[serde(default)]
    pub read_only: bool,

    /// Field used as the record identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_bookings: true,
            log_filtered: true,
            read_only: false,
            id_field: default_id_field(),
        }
    }
}

impl GlobalSettings {
    fn validate(&self) -> anyhow::Result<()> {
        if self.id_field.is_empty() {
            anyhow::bail!("id_field cannot be empty");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_id_field() -> String {
    "id".to_string()
}
