//! Filter engine: runs every configured stage and ANDs the survivors.

use super::StageConfig;
use crate::series::{NavTrack, PingSeries};
use crate::types::{and_masks, PingMask, StageKind};
use tracing::{info, warn};

/// What one stage produced: its keep-mask, or `None` when it failed softly.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub kind: StageKind,
    pub mask: Option<PingMask>,
}

/// Everything one engine run produced, kept so later refinement passes can
/// reuse per-stage masks without re-running the stages.
#[derive(Debug, Clone)]
pub struct EngineReport {
    /// AND of every successful stage mask. All-true when no stage succeeded.
    pub combined: PingMask,
    /// One outcome per configured stage, in configuration order.
    pub stages: Vec<StageOutcome>,
    /// Number of stages that produced a mask.
    pub successes: usize,
}

impl EngineReport {
    /// Mask of the first configured stage of the given kind, if it ran.
    pub fn stage_mask(&self, kind: StageKind) -> Option<&PingMask> {
        self.stages
            .iter()
            .find(|s| s.kind == kind)
            .and_then(|s| s.mask.as_ref())
    }
}

/// Runs a fixed list of stages over segments.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    stages: Vec<StageConfig>,
}

impl FilterEngine {
    pub fn new(stages: Vec<StageConfig>) -> Self {
        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply every stage to the segment. A stage failure is logged and
    /// skipped; if every stage fails the combined mask keeps all pings.
    pub fn run(
        &self,
        series: &PingSeries,
        nav: &NavTrack,
        bottom_range: Option<&[f64]>,
    ) -> EngineReport {
        let n = series.n_pings();
        let mut combined = vec![true; n];
        let mut outcomes = Vec::with_capacity(self.stages.len());
        let mut successes = 0usize;
        for stage in &self.stages {
            let kind = stage.kind();
            match stage.apply(series, nav, bottom_range) {
                Ok(mask) => {
                    combined = and_masks(&combined, &mask);
                    outcomes.push(StageOutcome {
                        kind,
                        mask: Some(mask),
                    });
                    successes += 1;
                }
                Err(e) => {
                    warn!(stage = %kind, error = %e, "Filter stage skipped");
                    outcomes.push(StageOutcome { kind, mask: None });
                }
            }
        }
        info!(
            successes,
            configured = self.stages.len(),
            kept = combined.iter().filter(|&&b| b).count(),
            total = n,
            "Filter engine pass complete"
        );
        EngineReport {
            combined,
            stages: outcomes,
            successes,
        }
    }
}
