//! Interval statistics and threshold-driven mask refinement.
//!
//! After the filter engine runs, per-stage masks are summarised over
//! fixed-length blocks of the selected pings. A block where an
//! interval-capable stage flagged too high a fraction of pings is removed
//! wholesale, including the unselected pings its raw span covers. File-scope
//! stages are summarised over the whole segment regardless of the selection,
//! and remove the entire cycle when they flagged every ping in it.

use crate::filters::EngineReport;
use crate::types::{
    FileRemovalReason, IntervalRemovalReason, PingMask, StageKind, StatisticInterval,
    TrackerRecord,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    #[error("statistic interval must be at least 1 ping")]
    ZeroInterval,
    #[error("removal threshold {0}% is outside [0, 100]")]
    ThresholdOutOfRange(f64),
}

/// How aggressively flagged blocks are removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemovalPolicy {
    /// Block length in selected pings.
    pub statistic_interval: usize,
    /// Remove a block when at least this percentage of it was flagged.
    pub threshold_percent: f64,
}

impl RemovalPolicy {
    pub fn new(statistic_interval: usize, threshold_percent: f64) -> Result<Self, PolicyError> {
        if statistic_interval == 0 {
            return Err(PolicyError::ZeroInterval);
        }
        if !(0.0..=100.0).contains(&threshold_percent) {
            return Err(PolicyError::ThresholdOutOfRange(threshold_percent));
        }
        Ok(Self {
            statistic_interval,
            threshold_percent,
        })
    }
}

/// Block statistics for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStats {
    pub kind: StageKind,
    pub intervals: Vec<StatisticInterval>,
}

/// Outcome of refining one cycle's selection against an engine report.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// The selection mask with removed spans cleared. The input mask is
    /// never mutated.
    pub mask: PingMask,
    /// One entry per successful stage, in engine order.
    pub stages: Vec<StageStats>,
    pub tracker: TrackerRecord,
}

/// Summarise the engine report over blocks of selected pings and clear the
/// spans that crossed the removal threshold.
pub fn refine(
    subsample_mask: &PingMask,
    report: &EngineReport,
    policy: &RemovalPolicy,
) -> Refinement {
    let selected: Vec<usize> = subsample_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &b)| b.then_some(i))
        .collect();
    let block_len = policy.statistic_interval;
    let n_blocks = selected.len() / block_len;

    let mut mask = subsample_mask.clone();
    let mut stages = Vec::new();
    let mut tracker = TrackerRecord {
        interval_removed: vec![false; n_blocks],
        interval_reason: vec![None; n_blocks],
        ..TrackerRecord::default()
    };
    // Which interval stage removed each block, for reason attribution.
    let mut removed_by: Vec<Vec<StageKind>> = vec![Vec::new(); n_blocks];
    let mut file_removers: Vec<StageKind> = Vec::new();

    for outcome in &report.stages {
        let Some(stage_mask) = &outcome.mask else {
            continue;
        };
        let kind = outcome.kind;
        if kind.is_interval_stage() {
            let mut intervals = Vec::with_capacity(n_blocks);
            for (b, block) in selected.chunks_exact(block_len).enumerate() {
                let removed_pings = block.iter().filter(|&&i| !stage_mask[i]).count();
                let percent_removed = 100.0 * removed_pings as f64 / block_len as f64;
                let removed = percent_removed >= policy.threshold_percent;
                let (start_ping, end_ping) = (block[0], block[block_len - 1]);
                intervals.push(StatisticInterval {
                    start_ping,
                    end_ping,
                    removed_pings,
                    total_pings: block_len,
                    percent_removed,
                    removed,
                });
                if removed {
                    debug!(
                        stage = %kind,
                        start_ping,
                        end_ping,
                        percent_removed,
                        "Removing statistic interval"
                    );
                    for m in &mut mask[start_ping..=end_ping] {
                        *m = false;
                    }
                    removed_by[b].push(kind);
                }
            }
            stages.push(StageStats { kind, intervals });
        } else if !stage_mask.is_empty() {
            // File-scope statistics cover the whole segment, not just the
            // selected pings.
            let n = stage_mask.len();
            let removed_pings = stage_mask.iter().filter(|&&keep| !keep).count();
            let percent_removed = 100.0 * removed_pings as f64 / n as f64;
            let removed = percent_removed >= 100.0;
            let interval = StatisticInterval {
                start_ping: 0,
                end_ping: n - 1,
                removed_pings,
                total_pings: n,
                percent_removed,
                removed,
            };
            stages.push(StageStats {
                kind,
                intervals: vec![interval],
            });
            if removed {
                file_removers.push(kind);
            }
        } else {
            stages.push(StageStats {
                kind,
                intervals: Vec::new(),
            });
        }
    }

    for (b, kinds) in removed_by.iter().enumerate() {
        tracker.interval_removed[b] = !kinds.is_empty();
        tracker.interval_reason[b] = match kinds.as_slice() {
            [] => None,
            [one] => Some(IntervalRemovalReason::Stage(*one)),
            _ => Some(IntervalRemovalReason::Both),
        };
    }
    match file_removers.as_slice() {
        [] => {}
        [one] => {
            tracker.file_removed = true;
            tracker.file_reason = Some(FileRemovalReason::Stage(*one));
        }
        _ => {
            tracker.file_removed = true;
            tracker.file_reason = Some(FileRemovalReason::Combination);
        }
    }
    if tracker.file_removed {
        info!(reason = ?tracker.file_reason, "Whole cycle removed by file-scope stage");
        mask.iter_mut().for_each(|m| *m = false);
    }

    Refinement {
        mask,
        stages,
        tracker,
    }
}
