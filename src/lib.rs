//! EchoQC: Echosounder Ping Quality Control
//!
//! Batch quality-control core for single-frequency echosounder survey data.
//!
//! ## Architecture
//!
//! - **Signal**: running median and triangle-wave fitting primitives
//! - **Triwave Corrector**: removes the periodic triangle-wave gain artifact
//! - **Subsample Selector**: deterministic chunked ping selection per cycle
//! - **Filter Engine**: composable keep-mask stages (daylight, speed,
//!   geographic bounds, bottom echo, ringdown stability)
//! - **Intervals**: block statistics and threshold-driven mask refinement
//! - **Pipeline**: per-segment orchestration of the above

pub mod config;
pub mod filters;
pub mod intervals;
pub mod pipeline;
pub mod series;
pub mod signal;
pub mod subsample;
pub mod triwave;
pub mod types;

// Re-export survey configuration
pub use config::{ConfigError, SurveyConfig};

// Re-export commonly used types
pub use types::{
    FileRemovalReason, IntervalRemovalReason, PingMask, StageKind, StatisticInterval,
    TrackerRecord, TriwaveFit,
};

// Re-export the segment data model
pub use series::{NavTrack, PingSeries, SeriesError};

// Re-export processing components
pub use filters::{EngineReport, FilterEngine, StageConfig, StageError};
pub use intervals::{refine, Refinement, RemovalPolicy, StageStats};
pub use pipeline::{CycleOutcome, SegmentError, SegmentProcessor, SegmentReport, SubsampleRun};
pub use subsample::{Selection, SubsampleError, Subsampler};
pub use triwave::{TriwaveCorrector, TriwaveError};
