//! Configuration management for the panel service
//!
//! Handles loading, parsing and validation of the YAML deployment file.
//! The configuration is read once at startup and never changes afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// One panel bus segment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PanelConfig {
    pub name: String,
    /// Bus device node, e.g. `/dev/i2c-3`
    pub device: PathBuf,
    /// 7-bit peripheral address
    pub address: u16,
    #[serde(default = "default_variant")]
    pub variant: PanelVariant,
    #[serde(default)]
    pub backend: BackendKind,
    /// evdev node delivering this panel's button presses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<PathBuf>,
    /// Mark the panel present at startup instead of waiting for a presence signal
    #[serde(default = "default_true")]
    pub assume_present: bool,
}

/// Panel hardware variant
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PanelVariant {
    /// Panel with an LCD; needs the bring-up sequence
    Lcd,
    /// Buttons and indicators only
    Base,
}

/// Bus backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    I2c,
    /// In-memory bus that records frames (bench setups without hardware)
    Simulated,
}

/// Host forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Datagram socket of the MCTP demultiplexer
    #[serde(default = "default_host_socket")]
    pub socket: PathBuf,
    /// MCTP endpoint id of the host
    #[serde(default = "default_host_eid")]
    pub eid: u8,
    /// Entity type the panel effecter is attached to
    #[serde(default = "default_entity_type")]
    pub entity_type: u16,
    /// State set carrying the selected panel function
    #[serde(default = "default_state_set_id")]
    pub state_set_id: u16,
    /// Hex-encoded state effecter PDRs published by the host
    #[serde(default)]
    pub effecter_pdrs: Vec<String>,
}

/// HTTP control surface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Static system information shown by display functions
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket: default_host_socket(),
            eid: default_host_eid(),
            entity_type: default_entity_type(),
            state_set_id: default_state_set_id(),
            effecter_pdrs: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate a YAML document
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.panels.is_empty() {
            anyhow::bail!("At least one panel must be defined");
        }

        let mut names = HashSet::new();
        for (idx, panel) in self.panels.iter().enumerate() {
            if panel.name.is_empty() {
                anyhow::bail!("Panel {} name cannot be empty", idx);
            }
            if !names.insert(panel.name.as_str()) {
                anyhow::bail!("Panel name '{}' is defined more than once", panel.name);
            }
            if panel.device.as_os_str().is_empty() {
                anyhow::bail!("Panel '{}' device cannot be empty", panel.name);
            }
            if panel.address > 0x7F {
                anyhow::bail!(
                    "Panel '{}' address {:#x} is invalid (must be 7-bit)",
                    panel.name,
                    panel.address
                );
            }
        }

        if self.host.enabled {
            for (idx, pdr) in self.host.effecter_pdrs.iter().enumerate() {
                hex::decode(pdr.trim())
                    .with_context(|| format!("Host effecter PDR {} is not valid hex", idx))?;
            }
        }

        if self.api.enabled && self.api.port == 0 {
            anyhow::bail!("API port cannot be 0");
        }

        Ok(())
    }

    /// Panels with an LCD
    pub fn lcd_panels(&self) -> impl Iterator<Item = &PanelConfig> {
        self.panels.iter().filter(|p| p.variant == PanelVariant::Lcd)
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_variant() -> PanelVariant { PanelVariant::Lcd }
fn default_host_socket() -> PathBuf { PathBuf::from("/run/op-panel/mctp.sock") }
fn default_host_eid() -> u8 { 9 }
fn default_entity_type() -> u16 { 69 }
fn default_state_set_id() -> u16 { 0x800A }
fn default_api_bind() -> String { "127.0.0.1".to_string() }
fn default_api_port() -> u16 { 8126 }

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
panels:
  - name: lcd
    device: /dev/i2c-3
    address: 90
    variant: lcd
    input_device: /dev/input/event0
  - name: base
    device: /dev/i2c-7
    address: 81
    variant: base
    backend: simulated
    assume_present: false
host:
  enabled: true
  eid: 10
  effecter_pdrs:
    - "0100000001000b00"
system:
  machine_type_model: "9105-42A"
  serial_number: "13ABCDE"
  interfaces:
    - "eth0 10.0.0.2"
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.panels.len(), 2);
        assert_eq!(config.panels[0].variant, PanelVariant::Lcd);
        assert_eq!(config.panels[0].backend, BackendKind::I2c);
        assert!(config.panels[0].assume_present);
        assert_eq!(config.panels[1].backend, BackendKind::Simulated);
        assert!(!config.panels[1].assume_present);
        assert_eq!(config.host.eid, 10);
        assert_eq!(config.host.state_set_id, 0x800A);
        assert_eq!(config.api.port, 8126);
        assert_eq!(config.lcd_panels().count(), 1);
    }

    #[test]
    fn test_rejects_empty_panels() {
        let err = AppConfig::parse("panels: []").unwrap_err();
        assert!(err.to_string().contains("At least one panel"));
    }

    #[test]
    fn test_rejects_wide_address() {
        let yaml = "panels:\n  - name: lcd\n    device: /dev/i2c-3\n    address: 300\n";
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = r#"
panels:
  - { name: lcd, device: /dev/i2c-3, address: 90 }
  - { name: lcd, device: /dev/i2c-4, address: 90 }
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_rejects_bad_pdr_hex() {
        let yaml = r#"
panels:
  - { name: lcd, device: /dev/i2c-3, address: 90 }
host:
  enabled: true
  effecter_pdrs: ["zz"]
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.system.serial_number.as_deref(), Some("13ABCDE"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(AppConfig::load("/nonexistent/panel.yaml").await.is_err());
    }
}
