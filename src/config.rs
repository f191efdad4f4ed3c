use std::fs;
use std::num::NonZeroU32;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Longest strand the service accepts; matches what one serial frame can carry
pub const MAX_PIXEL_COUNT: u32 = 65_536;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gatt: GattConfig,
    pub strand: StrandConfig,
    /// Serial LED hardware; without it the service runs with no sinks
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GattConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_local_name")]
    pub local_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrandConfig {
    pub pixel_count: NonZeroU32,
    /// Channel/bit-width spec, e.g. "R8G8B8"
    pub color_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub port: String,
    /// "awa" or "adalight"
    pub protocol: String,
    pub baud_rate: u32,
    /// Hardware channel order: RGB, GRB, BGR, RGBW or GRBW
    pub pixel_format: Option<String>,
    #[serde(default = "default_animation_interval_ms")]
    pub animation_interval_ms: u64,
}

fn default_local_name() -> String {
    "Fishy".to_string()
}

fn default_animation_interval_ms() -> u64 {
    50
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .context(format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .context(format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let pixel_count = self.strand.pixel_count.get();
        if pixel_count > MAX_PIXEL_COUNT {
            bail!(
                "pixel_count {} exceeds the maximum of {}",
                pixel_count,
                MAX_PIXEL_COUNT
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "gatt": {{ "host": "127.0.0.1", "port": 7890 }},
                "strand": {{ "pixel_count": 3, "color_format": "R8G8B8" }}
            }}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gatt.local_name, "Fishy");
        assert_eq!(config.strand.pixel_count.get(), 3);
        assert_eq!(config.strand.color_format, "R8G8B8");
        assert!(config.output.is_none());
    }

    #[test]
    fn test_load_with_output() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "gatt": {{ "host": "0.0.0.0", "port": 7890, "local_name": "Wall" }},
                "strand": {{ "pixel_count": 60, "color_format": "G8R8B8W8" }},
                "output": {{ "port": "/dev/ttyACM0", "protocol": "awa", "baud_rate": 2000000,
                             "pixel_format": "GRBW" }}
            }}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        let output = config.output.unwrap();
        assert_eq!(config.gatt.local_name, "Wall");
        assert_eq!(output.protocol, "awa");
        assert_eq!(output.pixel_format.as_deref(), Some("GRBW"));
        assert_eq!(output.animation_interval_ms, 50);
    }

    #[test]
    fn test_zero_pixels_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "gatt": {{ "host": "127.0.0.1", "port": 7890 }},
                "strand": {{ "pixel_count": 0, "color_format": "R8G8B8" }}
            }}"#
        )
        .unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_pixel_count_capped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "gatt": {{ "host": "127.0.0.1", "port": 7890 }},
                "strand": {{ "pixel_count": 4294967295, "color_format": "R8G8B8" }}
            }}"#
        )
        .unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/pixel_strand.json")).is_err());
    }
}
