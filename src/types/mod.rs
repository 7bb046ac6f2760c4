//! Core domain types shared across the quality-control pipeline.
//!
//! Everything here is a plain value type: boolean keep-masks aligned to the
//! ping index range, the triangle-wave fit result, and the statistic-interval
//! bookkeeping records consumed by external reporting.

use serde::{Deserialize, Serialize};

/// Boolean keep-mask, one entry per ping in the current segment.
///
/// Masks are only ever combined with logical AND across stages; a stage mask
/// is never mutated after it is produced.
pub type PingMask = Vec<bool>;

/// AND two masks of equal length into a fresh mask.
pub fn and_masks(a: &[bool], b: &[bool]) -> PingMask {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| *x && *y).collect()
}

/// The five filter stage kinds.
///
/// `Bottom` and `Ringdown` are interval-capable (evaluated per fixed-length
/// block of selected pings); the other three are file-scope (one statistic
/// over the whole segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    TimeOfDay,
    Speed,
    GeoBounds,
    Bottom,
    Ringdown,
}

impl StageKind {
    /// Stage name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::TimeOfDay => "time_limit",
            StageKind::Speed => "speed_limit",
            StageKind::GeoBounds => "latlon_limit",
            StageKind::Bottom => "bottom",
            StageKind::Ringdown => "ringdown",
        }
    }

    /// Whether this stage participates in block-level interval removal.
    pub fn is_interval_stage(&self) -> bool {
        matches!(self, StageKind::Bottom | StageKind::Ringdown)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of fitting the periodic triangle-wave artifact to the per-ping
/// ringdown levels. The period itself is a fixed instrument constant and is
/// not fitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriwaveFit {
    /// Half peak-to-peak amplitude (dB), normalised to be non-negative.
    pub amplitude: f64,
    /// Sample offset of the first ping along the wave period, in [0, period).
    pub period_offset: f64,
    /// Mean offset of the wave (dB).
    pub amplitude_offset: f64,
    /// Coefficient of determination of the fit.
    pub r_squared: f64,
}

/// Bad-ping statistics over one fixed-length block of selected pings, or over
/// the whole segment for a file-scope stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticInterval {
    /// First ping index of the block (raw segment index).
    pub start_ping: usize,
    /// Last ping index of the block, inclusive.
    pub end_ping: usize,
    /// Number of pings the stage flagged bad within the block.
    pub removed_pings: usize,
    /// Number of selected pings evaluated in the block.
    pub total_pings: usize,
    /// 100 * removed / total.
    pub percent_removed: f64,
    /// Whether this block crossed the removal threshold.
    pub removed: bool,
}

/// Why a whole file was marked removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileRemovalReason {
    /// A single file-scope stage dropped every ping.
    Stage(StageKind),
    /// More than one file-scope stage independently dropped every ping.
    Combination,
}

/// Why a statistic interval was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalRemovalReason {
    /// Exactly one interval-capable stage crossed the threshold.
    Stage(StageKind),
    /// Bottom and ringdown both crossed the threshold for the same block.
    Both,
}

/// Aggregate removal decision record for one subsample cycle, consumed by
/// external reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerRecord {
    /// True when a file-scope stage (or a combination) dropped 100% of pings.
    pub file_removed: bool,
    pub file_reason: Option<FileRemovalReason>,
    /// One entry per statistic interval, aligned with the interval bounds.
    pub interval_removed: Vec<bool>,
    /// Reason per interval; `None` where the interval was kept.
    pub interval_reason: Vec<Option<IntervalRemovalReason>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_masks_requires_both_true() {
        let a = vec![true, true, false, false];
        let b = vec![true, false, true, false];
        assert_eq!(and_masks(&a, &b), vec![true, false, false, false]);
    }

    #[test]
    fn interval_stages_are_bottom_and_ringdown() {
        assert!(StageKind::Bottom.is_interval_stage());
        assert!(StageKind::Ringdown.is_interval_stage());
        assert!(!StageKind::TimeOfDay.is_interval_stage());
        assert!(!StageKind::Speed.is_interval_stage());
        assert!(!StageKind::GeoBounds.is_interval_stage());
    }

    #[test]
    fn stage_names_match_report_vocabulary() {
        assert_eq!(StageKind::TimeOfDay.name(), "time_limit");
        assert_eq!(StageKind::Ringdown.to_string(), "ringdown");
    }
}
