use amflash_lib::SerialTransport;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Default values shared by the config file and the command line.
pub struct Defaults;

impl Defaults {
    pub const BAUD: u32 = SerialTransport::DEFAULT_BAUD;
    pub const PACING_MS: u64 = 50;
    pub const QUIET: bool = false;
}

/// Root of the JSON configuration file.
///
/// ```json
/// { "port": "/dev/ttyACM0", "baud": 115200, "pacing_ms": 50, "quiet": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmflashConfig {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub quiet: bool,
}

fn default_baud() -> u32 {
    Defaults::BAUD
}
fn default_pacing_ms() -> u64 {
    Defaults::PACING_MS
}

impl AmflashConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid config file '{}'", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AmflashConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_defaults() -> Self {
        Self {
            port: None,
            baud: Defaults::BAUD,
            pacing_ms: Defaults::PACING_MS,
            quiet: Defaults::QUIET,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud == 0 {
            bail!("baud must be greater than zero");
        }
        if self.port.as_deref().is_some_and(|port| port.trim().is_empty()) {
            bail!("port must not be empty; leave it out to select a port interactively");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = AmflashConfig::from_json(r#"{ "port": "COM4" }"#).unwrap();
        assert_eq!(config.port.as_deref(), Some("COM4"));
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.pacing_ms, 50);
        assert!(!config.quiet);
    }

    #[test]
    fn empty_object_equals_defaults() {
        let config = AmflashConfig::from_json("{}").unwrap();
        assert_eq!(config, AmflashConfig::with_defaults());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AmflashConfig::from_json(r#"{ "baud": 0 }"#).is_err());
        assert!(AmflashConfig::from_json(r#"{ "port": "  " }"#).is_err());
        assert!(AmflashConfig::from_json(r#"{ "chip": "AM29F400BT" }"#).is_err());
        assert!(AmflashConfig::from_json(r#"{ "pacing_ms": -1 }"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": "/dev/ttyUSB1", "pacing_ms": 10, "quiet": true }}"#).unwrap();

        let config = AmflashConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.pacing_ms, 10);
        assert!(config.quiet);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AmflashConfig::from_file("/nonexistent/amflash.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/amflash.json"));
    }
}
