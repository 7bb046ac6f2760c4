//! Survey configuration: every processing parameter as operator-tunable TOML.
//!
//! Load with `SurveyConfig::load()` which searches:
//! 1. `$ECHOQC_CONFIG` env var
//! 2. `./echoqc.toml`
//! 3. Built-in defaults
//!
//! Every section implements `Default`, so a partial file only overrides the
//! keys it names.

pub mod validation;

pub use validation::ValidationWarning;

use crate::filters::{
    polygon_from_csv, BottomMode, DaylightTable, FilterEngine, Polarity, StageConfig, TimeSource,
};
use crate::intervals::RemovalPolicy;
use crate::pipeline::{SegmentProcessor, SubsampleRun};
use crate::subsample::Subsampler;
use crate::triwave::TriwaveCorrector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error ({path}): {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("bad config value: {0}")]
    Invalid(String),
}

/// Root configuration for one survey processing run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SurveyConfig {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub subsample: SubsampleConfig,

    #[serde(default)]
    pub triwave: TriwaveConfig,

    #[serde(default)]
    pub removal: RemovalConfig,

    /// Enabled filter stages, applied in file order.
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Cycles keeping fewer pings than this are flagged not worth writing.
    pub minimum_pings_to_write: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            minimum_pings_to_write: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsampleConfig {
    pub enabled: bool,
    /// Percentage of pings to select, in (0, 100].
    pub percent: f64,
    /// Contiguous pings per selected chunk.
    pub chunk_size: usize,
    /// 1-based chunk index where the first cycle starts.
    pub chunk_start: usize,
    /// Number of subsample cycles per segment.
    pub iterations: usize,
}

impl Default for SubsampleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percent: 5.0,
            chunk_size: 50,
            chunk_start: 1,
            iterations: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriwaveConfig {
    pub enabled: bool,
    /// Sample window (half-open) the per-ping level is averaged over.
    pub start_sample: usize,
    pub end_sample: usize,
}

impl Default for TriwaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_sample: 0,
            end_sample: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    pub enabled: bool,
    /// Block length in selected pings.
    pub statistic_interval: usize,
    /// Remove a block when at least this percentage was flagged.
    pub threshold_percent: f64,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            statistic_interval: 50,
            threshold_percent: 15.0,
        }
    }
}

/// One filter stage as written in TOML, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    TimeLimit {
        #[serde(default)]
        source: TimeSourceSpec,
        #[serde(default)]
        hour_shift: f64,
    },
    SpeedLimit {
        min_knots: f64,
    },
    LatlonLimit {
        polygon_path: PathBuf,
        #[serde(default)]
        polarity: PolaritySpec,
    },
    Bottom {
        #[serde(default)]
        mode: BottomModeSpec,
        /// Running-median window in pings, used in relative mode.
        #[serde(default = "default_bottom_window")]
        window: usize,
        range_min: f64,
        range_max: f64,
        env_upper: f64,
        env_lower: f64,
        threshold_db: f64,
        #[serde(default)]
        use_transducer_offset: bool,
    },
    Ringdown {
        window: usize,
        tolerance_db: f64,
        range_start: f64,
        range_end: f64,
    },
}

fn default_bottom_window() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeSourceSpec {
    Solar {
        #[serde(default = "default_depression")]
        depression_deg: f64,
    },
    Table {
        table_path: PathBuf,
    },
}

fn default_depression() -> f64 {
    2.0
}

impl Default for TimeSourceSpec {
    fn default() -> Self {
        TimeSourceSpec::Solar {
            depression_deg: default_depression(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolaritySpec {
    #[default]
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BottomModeSpec {
    #[default]
    Fixed,
    Relative,
}

impl SurveyConfig {
    /// Load configuration using the standard search order:
    /// 1. `$ECHOQC_CONFIG` environment variable
    /// 2. `./echoqc.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("ECHOQC_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded survey config from ECHOQC_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ECHOQC_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ECHOQC_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("echoqc.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded survey config from ./echoqc.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./echoqc.toml, using defaults");
                }
            }
        }

        info!("No echoqc.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path. Range warnings are logged but
    /// never reject the file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        for w in config.validate() {
            warn!("{w}");
        }
        Ok(config)
    }

    /// Non-fatal range checks over every section.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        validation::validate(self)
    }

    /// Convert the filter section into runnable stage configurations,
    /// loading any referenced CSV files.
    pub fn to_stages(&self) -> Result<Vec<StageConfig>, ConfigError> {
        self.filters
            .iter()
            .map(|spec| {
                Ok(match spec {
                    FilterSpec::TimeLimit { source, hour_shift } => StageConfig::TimeOfDay {
                        source: match source {
                            TimeSourceSpec::Solar { depression_deg } => TimeSource::Solar {
                                depression_deg: *depression_deg,
                            },
                            TimeSourceSpec::Table { table_path } => TimeSource::Table(
                                DaylightTable::from_csv(table_path).map_err(|e| {
                                    ConfigError::Invalid(format!(
                                        "daylight table {}: {e}",
                                        table_path.display()
                                    ))
                                })?,
                            ),
                        },
                        hour_shift: *hour_shift,
                    },
                    FilterSpec::SpeedLimit { min_knots } => StageConfig::Speed {
                        min_knots: *min_knots,
                    },
                    FilterSpec::LatlonLimit {
                        polygon_path,
                        polarity,
                    } => StageConfig::GeoBounds {
                        polygon: polygon_from_csv(polygon_path).map_err(|e| {
                            ConfigError::Invalid(format!(
                                "polygon {}: {e}",
                                polygon_path.display()
                            ))
                        })?,
                        polarity: match polarity {
                            PolaritySpec::In => Polarity::In,
                            PolaritySpec::Out => Polarity::Out,
                        },
                    },
                    FilterSpec::Bottom {
                        mode,
                        window,
                        range_min,
                        range_max,
                        env_upper,
                        env_lower,
                        threshold_db,
                        use_transducer_offset,
                    } => StageConfig::Bottom {
                        mode: match mode {
                            BottomModeSpec::Fixed => BottomMode::Fixed,
                            BottomModeSpec::Relative => BottomMode::Relative { window: *window },
                        },
                        range_min: *range_min,
                        range_max: *range_max,
                        env_upper: *env_upper,
                        env_lower: *env_lower,
                        threshold_db: *threshold_db,
                        use_transducer_offset: *use_transducer_offset,
                    },
                    FilterSpec::Ringdown {
                        window,
                        tolerance_db,
                        range_start,
                        range_end,
                    } => StageConfig::Ringdown {
                        window: *window,
                        tolerance_db: *tolerance_db,
                        range_start: *range_start,
                        range_end: *range_end,
                    },
                })
            })
            .collect()
    }

    /// Build the segment processor this configuration describes.
    pub fn build_processor(&self) -> Result<SegmentProcessor, ConfigError> {
        let triwave = self
            .triwave
            .enabled
            .then(|| TriwaveCorrector::new(self.triwave.start_sample, self.triwave.end_sample));
        let subsample = if self.subsample.enabled {
            let sampler = Subsampler::new(self.subsample.chunk_size, self.subsample.percent)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Some(SubsampleRun {
                sampler,
                chunk_start: self.subsample.chunk_start,
                iterations: self.subsample.iterations,
            })
        } else {
            None
        };
        let removal = if self.removal.enabled {
            Some(
                RemovalPolicy::new(self.removal.statistic_interval, self.removal.threshold_percent)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(SegmentProcessor::new(
            triwave,
            subsample,
            FilterEngine::new(self.to_stages()?),
            removal,
            self.output.minimum_pings_to_write,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(f).expect("write");
        let config = SurveyConfig::load_from_file(f.path()).expect("parses");
        assert_eq!(config.subsample.percent, 5.0);
        assert_eq!(config.subsample.chunk_size, 50);
        assert_eq!(config.output.minimum_pings_to_write, 100);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(f, "[subsample]\npercent = 10.0").expect("write");
        let config = SurveyConfig::load_from_file(f.path()).expect("parses");
        assert_eq!(config.subsample.percent, 10.0);
        assert_eq!(config.subsample.chunk_size, 50);
    }

    #[test]
    fn filter_stages_parse_by_kind_tag() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            f,
            r#"
[[filters]]
kind = "speed_limit"
min_knots = 5.0

[[filters]]
kind = "ringdown"
window = 5
tolerance_db = 3.0
range_start = 0.0
range_end = 2.0

[[filters]]
kind = "bottom"
mode = "relative"
window = 7
range_min = 5.0
range_max = 500.0
env_upper = 2.0
env_lower = 2.0
threshold_db = 10.0
"#
        )
        .expect("write");
        let config = SurveyConfig::load_from_file(f.path()).expect("parses");
        assert_eq!(config.filters.len(), 3);
        let stages = config.to_stages().expect("stages build");
        assert!(matches!(stages[0], StageConfig::Speed { min_knots } if min_knots == 5.0));
        assert!(matches!(
            stages[2],
            StageConfig::Bottom {
                mode: BottomMode::Relative { window: 7 },
                ..
            }
        ));
    }

    #[test]
    fn time_limit_defaults_to_solar() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(f, "[[filters]]\nkind = \"time_limit\"").expect("write");
        let config = SurveyConfig::load_from_file(f.path()).expect("parses");
        let stages = config.to_stages().expect("stages build");
        assert!(matches!(
            stages[0],
            StageConfig::TimeOfDay {
                source: TimeSource::Solar { depression_deg },
                ..
            } if depression_deg == 2.0
        ));
    }

    #[test]
    fn missing_polygon_file_is_a_config_error() {
        let config = SurveyConfig {
            filters: vec![FilterSpec::LatlonLimit {
                polygon_path: PathBuf::from("/nonexistent/area.csv"),
                polarity: PolaritySpec::In,
            }],
            ..SurveyConfig::default()
        };
        assert!(matches!(
            config.to_stages(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_subsample_percent_fails_processor_build() {
        let config = SurveyConfig {
            subsample: SubsampleConfig {
                percent: 0.0,
                ..SubsampleConfig::default()
            },
            ..SurveyConfig::default()
        };
        assert!(matches!(
            config.build_processor(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = SurveyConfig::default();
        let text = toml::to_string_pretty(&config).expect("serializes");
        let back: SurveyConfig = toml::from_str(&text).expect("parses");
        assert_eq!(back.subsample.chunk_size, config.subsample.chunk_size);
        assert_eq!(
            back.removal.threshold_percent,
            config.removal.threshold_percent
        );
    }
}
