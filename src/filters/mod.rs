//! Ping filter stages and the engine that composes them.
//!
//! Each stage turns ping metadata or signal into a boolean keep-mask. A
//! stage that cannot run (missing input, malformed parameters) fails softly:
//! the engine logs it, excludes it from the AND-combination, and carries on.
//!
//! Stage parameters are tagged-variant records with named fields; every
//! variant validates its own parameters when applied.

pub mod bottom;
pub mod engine;
pub mod geo_bounds;
pub mod ringdown;
pub mod solar;
pub mod speed;
pub mod time_of_day;

pub use engine::{EngineReport, FilterEngine, StageOutcome};
pub use geo_bounds::{polygon_from_csv, Polarity, Polygon};
pub use time_of_day::{DaylightRow, DaylightTable, TimeSource};

use crate::series::{NavTrack, PingSeries};
use crate::types::{PingMask, StageKind};
use thiserror::Error;

/// Soft failure of a single filter stage. The engine never aborts on these.
#[derive(Error, Debug)]
pub enum StageError {
    /// Malformed or inconsistent stage parameters.
    #[error("bad parameter: {0}")]
    Config(String),
    /// A required metadata/signal input is absent or entirely non-finite.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
}

impl From<crate::signal::MedianError> for StageError {
    fn from(e: crate::signal::MedianError) -> Self {
        match e {
            crate::signal::MedianError::EvenWindow(_) => StageError::Config(e.to_string()),
            crate::signal::MedianError::InsufficientSamples { .. } => {
                StageError::DataUnavailable(e.to_string())
            }
        }
    }
}

/// How the bottom dropout stage compares each ping's near-bottom level to
/// its reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BottomMode {
    /// Keep pings whose level exceeds a fixed dB threshold.
    Fixed,
    /// Keep pings whose level stays within `threshold_db` below the running
    /// median of levels across pings.
    Relative { window: usize },
}

/// Configuration of one enabled filter stage.
#[derive(Debug, Clone)]
pub enum StageConfig {
    TimeOfDay {
        source: TimeSource,
        /// Hours added to ping times before the time-of-day comparison.
        hour_shift: f64,
    },
    Speed {
        min_knots: f64,
    },
    GeoBounds {
        polygon: Polygon,
        polarity: Polarity,
    },
    Bottom {
        mode: BottomMode,
        /// Search gate (metres): the ping must have finite signal in
        /// (range_min, range_max) for a level to be computed at all.
        range_min: f64,
        range_max: f64,
        /// Envelope bounds relative to the detected bottom (metres above /
        /// below).
        env_upper: f64,
        env_lower: f64,
        threshold_db: f64,
        /// Reduce the bottom depth by the transducer mounting depth so the
        /// bottom (in depth) lines up with sample ranges.
        use_transducer_offset: bool,
    },
    Ringdown {
        /// Running-median window in pings; must be odd.
        window: usize,
        tolerance_db: f64,
        /// Near-transducer range window (metres), inclusive.
        range_start: f64,
        range_end: f64,
    },
}

impl StageConfig {
    pub fn kind(&self) -> StageKind {
        match self {
            StageConfig::TimeOfDay { .. } => StageKind::TimeOfDay,
            StageConfig::Speed { .. } => StageKind::Speed,
            StageConfig::GeoBounds { .. } => StageKind::GeoBounds,
            StageConfig::Bottom { .. } => StageKind::Bottom,
            StageConfig::Ringdown { .. } => StageKind::Ringdown,
        }
    }

    /// Run this stage over one segment.
    pub fn apply(
        &self,
        series: &PingSeries,
        nav: &NavTrack,
        bottom_range: Option<&[f64]>,
    ) -> Result<PingMask, StageError> {
        match self {
            StageConfig::TimeOfDay { source, hour_shift } => {
                time_of_day::apply(series, nav, source, *hour_shift)
            }
            StageConfig::Speed { min_knots } => speed::apply(series, nav, *min_knots),
            StageConfig::GeoBounds { polygon, polarity } => {
                geo_bounds::apply(series, nav, polygon, *polarity)
            }
            StageConfig::Bottom {
                mode,
                range_min,
                range_max,
                env_upper,
                env_lower,
                threshold_db,
                use_transducer_offset,
            } => bottom::apply(
                series,
                bottom_range,
                *mode,
                (*range_min, *range_max),
                (*env_upper, *env_lower),
                *threshold_db,
                *use_transducer_offset,
            ),
            StageConfig::Ringdown {
                window,
                tolerance_db,
                range_start,
                range_end,
            } => ringdown::apply(series, *window, *tolerance_db, (*range_start, *range_end)),
        }
    }
}
