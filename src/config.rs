//! Configuration for the grid and zone overlay

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::geo::LatLng;
use crate::grid::{CellPitch, GridEngine, ReferencePoint};
use crate::pattern::{MonthOffsets, ZonePattern, ZoneTile};
use crate::zone::{ZoneCatalog, ZoneDefinition, ZoneId};

/// Main configuration for a map overlay deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub reference: LatLng,
    pub cell_distance_km: CellDistanceConfig,
    pub zones: Vec<ZoneDefinition>,
    pub pattern: ZonePattern,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Spacing between grid lines in kilometres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDistanceConfig {
    /// Between parallels (north-south step)
    pub parallel: f64,
    /// Between meridians (east-west step)
    pub meridian: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "default_label_min_zoom")]
    pub label_min_zoom: u8,
    #[serde(default = "default_update_delay_ms")]
    pub update_delay_ms: u64,
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: i64,
}

fn default_max_cells() -> usize {
    1000
}

fn default_min_zoom() -> u8 {
    11
}

fn default_label_min_zoom() -> u8 {
    13
}

fn default_update_delay_ms() -> u64 {
    100
}

fn default_highlight_ms() -> i64 {
    5000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cells: default_max_cells(),
            min_zoom: default_min_zoom(),
            label_min_zoom: default_label_min_zoom(),
            update_delay_ms: default_update_delay_ms(),
            highlight_ms: default_highlight_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("reference point must be finite with |lat| < 90, got {0:?}")]
    Reference(LatLng),
    #[error("grid distances must be positive, got parallel {parallel} km, meridian {meridian} km")]
    Pitch { parallel: f64, meridian: f64 },
    #[error("exactly 4 zones with ids 1..=4 must be defined, got {0:?}")]
    Zones(Vec<u8>),
    #[error("month offsets must be in 0..=3, got {0:?}")]
    MonthOffsets([u8; 12]),
    #[error("max_cells must be greater than zero")]
    MaxCells,
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reference = self.reference;
        if !reference.is_finite() || reference.lat.abs() >= 90.0 {
            return Err(ConfigError::Reference(reference));
        }

        let CellDistanceConfig { parallel, meridian } = self.cell_distance_km;
        if !(parallel > 0.0 && meridian > 0.0 && parallel.is_finite() && meridian.is_finite())
            || !self.cell_pitch().is_valid()
        {
            return Err(ConfigError::Pitch { parallel, meridian });
        }

        self.zone_catalog()?;

        if let ZonePattern::Custom { month_offsets, .. } = &self.pattern {
            if !month_offsets.is_valid() {
                return Err(ConfigError::MonthOffsets(month_offsets.0));
            }
        }

        if self.limits.max_cells == 0 {
            return Err(ConfigError::MaxCells);
        }

        Ok(())
    }

    pub fn reference_point(&self) -> ReferencePoint {
        ReferencePoint::new(self.reference.lat, self.reference.lng)
    }

    pub fn cell_pitch(&self) -> CellPitch {
        CellPitch::from_km(
            self.cell_distance_km.parallel,
            self.cell_distance_km.meridian,
            self.reference.lat,
        )
    }

    pub fn grid_engine(&self) -> GridEngine {
        GridEngine::new(
            self.reference_point(),
            self.cell_pitch(),
            self.limits.max_cells,
        )
    }

    pub fn zone_catalog(&self) -> Result<ZoneCatalog, ConfigError> {
        ZoneCatalog::from_definitions(&self.zones)
            .ok_or_else(|| ConfigError::Zones(self.zones.iter().map(|z| z.id.get()).collect()))
    }

    /// The deployed map: Bandung reference lines, 3 mile cells and a rotating 4x4 tile
    pub fn jwa_default() -> Self {
        let zone = |id: u8, color: &str| ZoneDefinition {
            id: ZoneId::clamped(id as i64),
            name: format!("Zone {id}"),
            color: color.to_string(),
            opacity: 0.4,
        };
        let [z1, z2, z3, z4] = ZoneId::ALL;
        let tile = ZoneTile::from_grid([
            [z1, z3, z1, z3],
            [z2, z4, z2, z4],
            [z3, z1, z3, z1],
            [z4, z2, z4, z2],
        ]);

        Self {
            name: "jwa_bandung".to_string(),
            reference: LatLng::new(-6.970723, 107.57757),
            cell_distance_km: CellDistanceConfig {
                parallel: 4.82803,
                meridian: 4.82803,
            },
            zones: vec![
                zone(1, "#FF6B6B"),
                zone(2, "#4ECDC4"),
                zone(3, "#45B7D1"),
                zone(4, "#96CEB4"),
            ],
            pattern: ZonePattern::Custom {
                tile,
                month_offsets: MonthOffsets::default(),
            },
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
