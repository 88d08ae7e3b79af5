use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Byte returned for reads nothing is mapped at.
    pub open_bus: u8,
    /// Cartridge work RAM at `$6000`; zero means the board has none.
    pub prg_ram_size: usize,
    /// How long the idle video thread parks between budget checks.
    pub idle_park_micros: u64,
    pub log_filter: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            open_bus: 0xFF,
            prg_ram_size: 0x2000,
            idle_park_micros: 200,
            log_filter: "famicore=info".to_string(),
        }
    }
}

impl MachineConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid machine configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration from {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn idle_park(&self) -> Duration {
        Duration::from_micros(self.idle_park_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MachineConfig::from_json(r#"{ "open_bus": 0 }"#).unwrap();

        assert_eq!(config.open_bus, 0);
        assert_eq!(config.prg_ram_size, 0x2000);
        assert_eq!(config.idle_park(), Duration::from_micros(200));
    }

    #[test]
    fn test_invalid_json() {
        assert!(MachineConfig::from_json("{ open_bus: }").is_err());
        assert!(MachineConfig::load("/nonexistent/famicore.json").is_err());
    }
}
