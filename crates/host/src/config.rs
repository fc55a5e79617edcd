//! Host configuration management

use accessory::{AccessoryDescriptor, DeviceIdentity, NegotiatorConfig};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::echo::EchoOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: HostSettings,
    pub device: DeviceSettings,
    /// Identity strings sent during the mode switch
    #[serde(default)]
    pub accessory: AccessorySettings,
    /// Delays and transfer timeouts
    #[serde(default)]
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    pub log_level: String,
    /// Stop the echo loop after this many messages (None = run until error)
    #[serde(default)]
    pub max_messages: Option<u64>,
}

/// The phone to switch into accessory mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Vendor ID in hex, e.g. "0x2717"
    pub vendor_id: String,
    /// Product ID in hex, e.g. "0xff40"
    pub product_id: String,
    /// Detach a kernel driver before claiming (None = platform default)
    #[serde(default)]
    pub detach_kernel_driver: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessorySettings {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    #[serde(default)]
    pub serial: String,
}

impl Default for AccessorySettings {
    fn default() -> Self {
        Self {
            manufacturer: "AccessoryTest".to_string(),
            model: "TestDemo".to_string(),
            description: "test".to_string(),
            version: "1.0".to_string(),
            uri: "https://github.com/kimasplund/rust-aoa".to_string(),
            serial: String::new(),
        }
    }
}

/// Durations are written as "2s", "100ms", "1m30s"; "0" means no limit
/// where a timeout is expected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "TimingSettings::default_settle_delay", with = "duration_serde")]
    pub settle_delay: Duration,
    #[serde(
        default = "TimingSettings::default_stabilize_delay",
        with = "duration_serde"
    )]
    pub stabilize_delay: Duration,
    #[serde(default, with = "duration_serde")]
    pub control_timeout: Duration,
    #[serde(default = "TimingSettings::default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,
    #[serde(default, with = "duration_serde")]
    pub write_timeout: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            settle_delay: Self::default_settle_delay(),
            stabilize_delay: Self::default_stabilize_delay(),
            control_timeout: Duration::ZERO,
            read_timeout: Self::default_read_timeout(),
            write_timeout: Duration::ZERO,
        }
    }
}

impl TimingSettings {
    fn default_settle_delay() -> Duration {
        accessory::negotiator::DEFAULT_SETTLE_DELAY
    }

    fn default_stabilize_delay() -> Duration {
        accessory::negotiator::DEFAULT_STABILIZE_DELAY
    }

    fn default_read_timeout() -> Duration {
        Duration::from_millis(200)
    }
}

/// Custom serde module for Duration
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format_duration(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a duration string like "2s", "100ms", "1m30s"
    ///
    /// A bare number is read as milliseconds.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err("Empty duration".to_string());
        }

        let mut total_ms: u64 = 0;
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            let mut num = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
                num.push(c);
                chars.next();
            }
            let mut unit = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
                unit.push(c);
                chars.next();
            }

            if num.is_empty() {
                return Err(format!("Invalid duration format: {}", s));
            }
            let value: u64 = num
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", num))?;

            let scale = match unit.as_str() {
                "h" => 3_600_000,
                "m" => 60_000,
                "s" => 1_000,
                "ms" | "" => 1,
                _ => return Err(format!("Invalid duration unit: {}", unit)),
            };
            total_ms = value
                .checked_mul(scale)
                .and_then(|v| total_ms.checked_add(v))
                .ok_or_else(|| format!("Duration too large: {}", s))?;
        }

        Ok(Duration::from_millis(total_ms))
    }

    pub fn format_duration(d: Duration) -> String {
        let ms = d.as_millis() as u64;
        if ms == 0 {
            return "0".to_string();
        }
        if ms % 1000 != 0 {
            return format!("{}ms", ms);
        }

        let secs = ms / 1000;
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        let mut result = String::new();
        if hours > 0 {
            result.push_str(&format!("{}h", hours));
        }
        if mins > 0 {
            result.push_str(&format!("{}m", mins));
        }
        if secs > 0 {
            result.push_str(&format!("{}s", secs));
        }
        result
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: HostSettings {
                log_level: "info".to_string(),
                max_messages: None,
            },
            device: DeviceSettings {
                vendor_id: "0x2717".to_string(),
                product_id: "0xff40".to_string(),
                detach_kernel_driver: None,
            },
            accessory: AccessorySettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/aoa-host/host.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("aoa-host").join("host.toml")
        } else {
            PathBuf::from(".config/aoa-host/host.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        parse_hex_id(&self.device.vendor_id, "vendor_id")?;
        parse_hex_id(&self.device.product_id, "product_id")?;

        Ok(())
    }

    /// Device to switch, from the `[device]` section
    pub fn identity(&self) -> Result<DeviceIdentity> {
        Ok(DeviceIdentity::new(
            parse_hex_id(&self.device.vendor_id, "vendor_id")?,
            parse_hex_id(&self.device.product_id, "product_id")?,
        ))
    }

    pub fn descriptor(&self) -> AccessoryDescriptor {
        let a = &self.accessory;
        AccessoryDescriptor::new(
            a.manufacturer.as_str(),
            a.model.as_str(),
            a.description.as_str(),
            a.version.as_str(),
            a.uri.as_str(),
            a.serial.as_str(),
        )
    }

    pub fn negotiator_config(&self) -> NegotiatorConfig {
        let mut config = NegotiatorConfig::default()
            .with_settle_delay(self.timing.settle_delay)
            .with_stabilize_delay(self.timing.stabilize_delay)
            .with_control_timeout(self.timing.control_timeout);
        if let Some(detach) = self.device.detach_kernel_driver {
            config = config.with_detach_kernel_driver(detach);
        }
        config
    }

    pub fn echo_options(&self) -> EchoOptions {
        EchoOptions {
            read_timeout: self.timing.read_timeout,
            write_timeout: self.timing.write_timeout,
            max_messages: self.host.max_messages,
            ..EchoOptions::default()
        }
    }
}

/// Parse a `0x`-prefixed 16-bit hex ID (VID or PID)
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

#[cfg(test)]
mod tests {
    use super::duration_serde::{format_duration, parse_duration};
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.host.log_level, "info");
        assert_eq!(
            config.identity().unwrap(),
            DeviceIdentity::new(0x2717, 0xff40)
        );
        assert_eq!(config.timing.settle_delay, Duration::from_secs(2));
        assert_eq!(config.timing.stabilize_delay, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x18D1", "VID").unwrap(), 0x18D1);
        assert_eq!(parse_hex_id("0Xff40", "PID").unwrap(), 0xff40);
        assert!(parse_hex_id("18D1", "VID").is_err());
        assert!(parse_hex_id("0x", "VID").is_err());
        assert!(parse_hex_id("0x12345", "VID").is_err());
        assert!(parse_hex_id("0xGHIJ", "VID").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration(" 2S ").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0");
        assert_eq!(format_duration(Duration::from_millis(100)), "100ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.host.log_level, parsed.host.log_level);
        assert_eq!(config.device.vendor_id, parsed.device.vendor_id);
        assert_eq!(config.timing.settle_delay, parsed.timing.settle_delay);
        assert_eq!(config.timing.control_timeout, parsed.timing.control_timeout);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = HostConfig::default();
        config.host.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.host.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negotiator_config() {
        let mut config = HostConfig::default();
        config.timing.settle_delay = Duration::from_millis(500);
        config.device.detach_kernel_driver = Some(false);

        let negotiator = config.negotiator_config();
        assert_eq!(negotiator.settle_delay, Duration::from_millis(500));
        assert!(!negotiator.detach_kernel_driver);
    }
}
