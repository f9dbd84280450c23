//! Per-device settings, loadable from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration and a file
//! only needs the keys it changes:
//!
//! ```json
//! { "reset_on_change": true, "georam": { "size_kb": 1024 } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Reset the port after every successful attach or detach.
    #[serde(alias = "reset_on_attach")]
    pub reset_on_change: bool,
    pub dqbb: DqbbConfig,
    pub ramcart: RamCartConfig,
    pub georam: GeoRamConfig,
    pub reu: ReuConfig,
    pub isepic: IsepicConfig,
    pub expert: ExpertConfig,
    pub easyflash: EasyFlashConfig,
    pub megabyter: MegabyterConfig,
    pub mmc64: Mmc64Config,
    pub ide64: Ide64Config,
}

impl ExpansionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Double Quick Brown Box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqbbConfig {
    /// 16, 32, 64, 128 or 256.
    pub size_kb: u32,
    /// Mode switch in the C64 position (pulls EXROM).
    pub c64_mode: bool,
    pub image: Option<PathBuf>,
    pub write_back: bool,
}

impl Default for DqbbConfig {
    fn default() -> Self {
        Self {
            size_kb: 16,
            c64_mode: true,
            image: None,
            write_back: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamCartConfig {
    /// 64 or 128.
    pub size_kb: u32,
    pub read_only: bool,
    pub image: Option<PathBuf>,
    pub write_back: bool,
}

impl Default for RamCartConfig {
    fn default() -> Self {
        Self {
            size_kb: 128,
            read_only: false,
            image: None,
            write_back: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoRamConfig {
    /// 64 to 4096, a power of two.
    pub size_kb: u32,
    pub image: Option<PathBuf>,
    pub write_back: bool,
}

impl Default for GeoRamConfig {
    fn default() -> Self {
        Self {
            size_kb: 512,
            image: None,
            write_back: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReuConfig {
    /// 128 to 16384, a power of two.
    pub size_kb: u32,
}

impl Default for ReuConfig {
    fn default() -> Self {
        Self { size_kb: 512 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsepicConfig {
    /// Position of the freeze switch at attach time.
    pub switch_on: bool,
}

/// Expert Cartridge three-position switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertMode {
    Off,
    /// RAM visible at $8000 for loading the software.
    Prg,
    /// Armed: invisible until reset or freeze.
    #[default]
    On,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpertConfig {
    pub mode: ExpertMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EasyFlashConfig {
    /// Boot jumper set: GAME comes from the register instead of the jumper.
    pub jumper: bool,
    /// Rewrite the CRT file on detach if the flash was programmed.
    pub write_back: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MegabyterConfig {
    /// Rewrite the image file on detach if the flash was programmed.
    pub write_back: bool,
    /// Leave fully erased banks out of a written-back CRT.
    pub optimize_crt: bool,
}

impl Default for MegabyterConfig {
    fn default() -> Self {
        Self {
            write_back: false,
            optimize_crt: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mmc64Config {
    /// SD card image.
    pub card_image: Option<PathBuf>,
    pub card_read_only: bool,
    /// BIOS flash write jumper.
    pub flash_jumper: bool,
    /// Hardware revision, 0 or 1.
    pub revision: u8,
    /// Rewrite the BIOS file on detach if it was reflashed.
    pub bios_write_back: bool,
}

impl Default for Mmc64Config {
    fn default() -> Self {
        Self {
            card_image: None,
            card_read_only: true,
            flash_jumper: false,
            revision: 0,
            bios_write_back: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ide64Config {
    pub disk_image: Option<PathBuf>,
    /// Override the geometry derived from the image size.
    pub geometry: Option<Geometry>,
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = ExpansionConfig::from_json_str("{}").expect("empty object");
        assert_eq!(config, ExpansionConfig::default());
        assert_eq!(config.georam.size_kb, 512);
        assert_eq!(config.expert.mode, ExpertMode::On);
        assert!(config.megabyter.optimize_crt);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = ExpansionConfig::from_json_str(
            r#"{ "reset_on_change": true, "dqbb": { "size_kb": 64 }, "expert": { "mode": "prg" } }"#,
        )
        .expect("valid json");
        assert!(config.reset_on_change);
        assert_eq!(config.dqbb.size_kb, 64);
        assert!(config.dqbb.c64_mode);
        assert_eq!(config.expert.mode, ExpertMode::Prg);
    }

    #[test]
    fn old_reset_key_still_accepted() {
        let config = ExpansionConfig::from_json_str(r#"{ "reset_on_attach": true }"#)
            .expect("valid json");
        assert!(config.reset_on_change);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            ExpansionConfig::from_json_str("{ reset_on_change: }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = ExpansionConfig::default();
        config.ide64.geometry = Some(Geometry {
            cylinders: 100,
            heads: 4,
            sectors: 32,
        });
        let json = config.to_json_string().expect("serialises");
        assert_eq!(ExpansionConfig::from_json_str(&json).expect("parses"), config);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("expansion.json");
        std::fs::write(&path, r#"{ "reu": { "size_kb": 2048 } }"#).expect("write config");
        let config = ExpansionConfig::from_file(&path).expect("load");
        assert_eq!(config.reu.size_kb, 2048);
        assert!(matches!(
            ExpansionConfig::from_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
