//! Driver configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Device id table entry for the hp-gadget (pid.codes test PID)
pub const DEFAULT_FILTER: &str = "0x1209:0x0001";

/// Accepted range for `usb.transfer_timeout_secs`
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub driver: DriverSettings,
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    pub log_level: String,
    /// Run headless until Ctrl+C instead of the interactive console
    #[serde(default)]
    pub service_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Devices offered to the driver, as "0xVID:0xPID" with `*` wildcards
    #[serde(default = "UsbSettings::default_filters")]
    pub filters: Vec<String>,
    /// Timeout of each bulk transfer to the device
    #[serde(default = "UsbSettings::default_timeout")]
    pub transfer_timeout_secs: u64,
}

impl UsbSettings {
    fn default_filters() -> Vec<String> {
        vec![DEFAULT_FILTER.to_string()]
    }

    fn default_timeout() -> u64 {
        10
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver: DriverSettings {
                log_level: "info".to_string(),
                service_mode: false,
            },
            usb: UsbSettings {
                filters: UsbSettings::default_filters(),
                transfer_timeout_secs: UsbSettings::default_timeout(),
            },
        }
    }
}

impl DriverConfig {
    /// Load configuration from `path`, or from the standard locations
    ///
    /// An explicit path must exist. Without one, the first existing file of
    /// the user config and `/etc/hp-gadget/driver.toml` is used, falling back
    /// to the built-in defaults when neither exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let candidates = [
                    Self::default_path(),
                    PathBuf::from("/etc/hp-gadget/driver.toml"),
                ];

                match candidates.into_iter().find(|p| p.exists()) {
                    Some(p) => p,
                    None => {
                        tracing::debug!("No configuration file found, using defaults");
                        return Ok(Self::default());
                    }
                }
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load from a user-supplied path string, expanding `~`
    pub fn load_from(path: &str) -> Result<Self> {
        let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
        Self::load(Some(path_buf))
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
            config_dir.join("hp-gadget").join("driver.toml")
        } else {
            PathBuf::from(".config/hp-gadget/driver.toml")
        }
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.usb.transfer_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.driver.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.driver.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        if !TIMEOUT_RANGE_SECS.contains(&self.usb.transfer_timeout_secs) {
            return Err(anyhow!(
                "Invalid transfer timeout {}s, must be within {}..={} seconds",
                self.usb.transfer_timeout_secs,
                TIMEOUT_RANGE_SECS.start(),
                TIMEOUT_RANGE_SECS.end()
            ));
        }

        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    fn validate_filter(filter: &str) -> Result<()> {
        let Some((vid, pid)) = filter.split_once(':').filter(|(_, pid)| !pid.contains(':'))
        else {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1209:0x0001' or '0x1209:*')",
                filter
            ));
        };

        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }
        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x1209')",
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
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.driver.log_level, "info");
        assert!(!config.driver.service_mode);
        assert_eq!(config.usb.filters, vec!["0x1209:0x0001".to_string()]);
        assert_eq!(config.transfer_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_filter_valid() {
        assert!(DriverConfig::validate_filter("0x1209:0x0001").is_ok());
        assert!(DriverConfig::validate_filter("0x1209:*").is_ok());
        assert!(DriverConfig::validate_filter("*:0x0001").is_ok());
        assert!(DriverConfig::validate_filter("*:*").is_ok());
        assert!(DriverConfig::validate_filter("0xABCD:0xEF01").is_ok());
    }

    #[test]
    fn test_validate_filter_invalid() {
        assert!(DriverConfig::validate_filter("1209:0001").is_err());
        assert!(DriverConfig::validate_filter("0x1209").is_err());
        assert!(DriverConfig::validate_filter("0x1209:0x0001:0x9abc").is_err());
        assert!(DriverConfig::validate_filter("0xGHIJ:0x0001").is_err());
        assert!(DriverConfig::validate_filter("0x12345:0x0001").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DriverConfig::default();

        config.driver.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.driver.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_range() {
        let mut config = DriverConfig::default();

        config.usb.transfer_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.usb.transfer_timeout_secs = 61;
        assert!(config.validate().is_err());

        config.usb.transfer_timeout_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = DriverConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DriverConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }
}
