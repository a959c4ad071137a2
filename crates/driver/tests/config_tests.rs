//! Integration tests for configuration parsing
//!
//! Tests driver configuration loading from disk, including:
//! - Minimal and full config files
//! - Defaults for omitted fields
//! - Invalid configuration handling
//! - Save/load through a temporary directory

use driver::config::{DEFAULT_FILTER, DriverConfig};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("driver.toml");
    fs::write(&path, content).unwrap();
    path
}

mod loading {
    use super::*;

    const MINIMAL_CONFIG: &str = r#"
[driver]
log_level = "info"

[usb]
"#;

    const FULL_CONFIG: &str = r#"
[driver]
log_level = "debug"
service_mode = true

[usb]
filters = ["0x1209:0x0001", "0x1209:*"]
transfer_timeout_secs = 3
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL_CONFIG);

        let config = DriverConfig::load(Some(path)).unwrap();
        assert_eq!(config.driver.log_level, "info");
        assert!(!config.driver.service_mode);
        assert_eq!(config.usb.filters, vec![DEFAULT_FILTER.to_string()]);
        assert_eq!(config.transfer_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, FULL_CONFIG);

        let config = DriverConfig::load(Some(path)).unwrap();
        assert_eq!(config.driver.log_level, "debug");
        assert!(config.driver.service_mode);
        assert_eq!(config.usb.filters.len(), 2);
        assert_eq!(config.transfer_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_filters_allowed() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[driver]
log_level = "warn"

[usb]
filters = []
"#,
        );

        let config = DriverConfig::load(Some(path)).unwrap();
        assert!(config.usb.filters.is_empty());
    }

    #[test]
    fn test_load_from_path_string() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL_CONFIG);

        let config = DriverConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config, DriverConfig::default());
    }
}

mod validation {
    use super::*;

    fn load_str(content: &str) -> anyhow::Result<DriverConfig> {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, content);
        DriverConfig::load(Some(path))
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let result = DriverConfig::load(Some(dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let result = load_str(
            r#"
[driver]
log_level = "verbose"

[usb]
"#,
        );
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Invalid log level"));
    }

    #[test]
    fn test_invalid_filter() {
        let result = load_str(
            r#"
[driver]
log_level = "info"

[usb]
filters = ["1209:0001"]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let result = load_str(
            r#"
[driver]
log_level = "info"

[usb]
transfer_timeout_secs = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let result = load_str("[driver\nlog_level = ");
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_driver_section() {
        assert!(load_str("[usb]\n").is_err());
    }
}

mod persistence {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("driver.toml");

        let mut config = DriverConfig::default();
        config.driver.log_level = "trace".to_string();
        config.usb.filters.push("0xABCD:*".to_string());
        config.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(DriverConfig::load(Some(path)).unwrap(), config);
    }

    #[test]
    fn test_default_path_location() {
        let path = DriverConfig::default_path();
        assert!(path.ends_with("hp-gadget/driver.toml"));
    }
}
