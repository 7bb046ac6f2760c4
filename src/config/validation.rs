//! Config range checks. Warnings never reject a file; the hard failures
//! live in the constructors the values eventually feed.

use super::{BottomModeSpec, FilterSpec, SurveyConfig};

/// A non-fatal config warning (out-of-range or suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn warning(field: &str, message: impl Into<String>) -> ValidationWarning {
    ValidationWarning {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Range-check every section of the config.
pub fn validate(config: &SurveyConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let s = &config.subsample;
    if s.enabled {
        if !(s.percent > 0.0 && s.percent <= 100.0) {
            warnings.push(warning(
                "subsample.percent",
                format!("{} is outside (0, 100]", s.percent),
            ));
        }
        if s.chunk_size == 0 {
            warnings.push(warning("subsample.chunk_size", "must be at least 1 ping"));
        }
        if s.chunk_start == 0 {
            warnings.push(warning(
                "subsample.chunk_start",
                "chunk indices are 1-based; 0 selects the chunk before the first",
            ));
        }
        if s.iterations == 0 {
            warnings.push(warning(
                "subsample.iterations",
                "0 iterations produce no output cycles",
            ));
        }
    }

    let t = &config.triwave;
    if t.enabled && t.start_sample >= t.end_sample {
        warnings.push(warning(
            "triwave",
            format!(
                "sample window [{}, {}) is empty",
                t.start_sample, t.end_sample
            ),
        ));
    }

    let r = &config.removal;
    if r.enabled {
        if r.statistic_interval == 0 {
            warnings.push(warning(
                "removal.statistic_interval",
                "must be at least 1 ping",
            ));
        }
        if !(0.0..=100.0).contains(&r.threshold_percent) {
            warnings.push(warning(
                "removal.threshold_percent",
                format!("{} is outside [0, 100]", r.threshold_percent),
            ));
        }
    }

    for (i, filter) in config.filters.iter().enumerate() {
        let at = |name: &str| format!("filters[{i}].{name}");
        match filter {
            FilterSpec::TimeLimit { hour_shift, .. } => {
                if hour_shift.abs() > 24.0 {
                    warnings.push(warning(
                        &at("hour_shift"),
                        format!("{hour_shift} hours shifts past a full day"),
                    ));
                }
            }
            FilterSpec::SpeedLimit { min_knots } => {
                if *min_knots < 0.0 {
                    warnings.push(warning(
                        &at("min_knots"),
                        "negative speed floor keeps every ping",
                    ));
                }
            }
            FilterSpec::LatlonLimit { .. } => {}
            FilterSpec::Bottom {
                mode,
                window,
                range_min,
                range_max,
                env_upper,
                env_lower,
                ..
            } => {
                if range_min >= range_max {
                    warnings.push(warning(
                        &at("range_min"),
                        format!("search gate ({range_min}, {range_max}) is inverted"),
                    ));
                }
                if *env_upper < 0.0 || *env_lower < 0.0 {
                    warnings.push(warning(
                        &at("env_upper"),
                        "envelope bounds must be non-negative",
                    ));
                }
                if matches!(mode, BottomModeSpec::Relative) && window % 2 == 0 {
                    warnings.push(warning(
                        &at("window"),
                        format!("running-median window {window} must be odd"),
                    ));
                }
            }
            FilterSpec::Ringdown {
                window,
                tolerance_db,
                range_start,
                range_end,
            } => {
                if window % 2 == 0 {
                    warnings.push(warning(
                        &at("window"),
                        format!("running-median window {window} must be odd"),
                    ));
                }
                if *tolerance_db <= 0.0 {
                    warnings.push(warning(
                        &at("tolerance_db"),
                        "tolerance must be positive",
                    ));
                }
                if range_start >= range_end {
                    warnings.push(warning(
                        &at("range_start"),
                        format!("range span ({range_start}, {range_end}) is inverted"),
                    ));
                }
            }
        }
    }

    warnings
}
