//! Segment processor: orchestrates correction, subsampling, filtering and
//! interval refinement for one raw-data segment.
//!
//! Control flow per segment: clean the navigation track, forward-fill the
//! bottom detections, apply the triangle-wave correction once, then walk the
//! configured subsample cycles. The filter engine runs once on the first
//! cycle and its report is reused for every cycle, since stage masks are
//! indexed by raw ping and do not depend on the selection.

use crate::filters::{EngineReport, FilterEngine};
use crate::intervals::{refine, Refinement, RemovalPolicy};
use crate::series::{forward_fill_non_finite, NavTrack, PingSeries};
use crate::subsample::{Selection, SubsampleError, Subsampler};
use crate::triwave::{TriwaveCorrector, TriwaveError};
use crate::types::{and_masks, PingMask, TriwaveFit};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SegmentError {
    /// The configured cycle start lies past the end of the segment. No
    /// selection is possible, so the segment cannot be processed.
    #[error(transparent)]
    Subsample(#[from] SubsampleError),
    #[error("segment has no pings")]
    EmptySegment,
}

/// Everything one subsample cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// 1-based cycle line label, `phase + 1`.
    pub line: usize,
    /// Raw index of the first ping the cycle's selection may cover.
    pub start_ping: usize,
    /// Selected chunks, inclusive bounds.
    pub chunks: Vec<(usize, usize)>,
    /// Final keep-mask: refined selection AND the engine's combined mask.
    pub keep: PingMask,
    /// Interval statistics and tracker record, present when a removal
    /// policy is configured.
    pub refinement: Option<Refinement>,
    /// Number of pings kept.
    pub kept: usize,
    /// Whether this cycle keeps enough pings to be worth writing out.
    pub writeable: bool,
}

/// Report for one fully processed segment.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    /// Fit parameters when the triangle-wave correction was applied.
    pub triwave: Option<TriwaveFit>,
    pub engine: EngineReport,
    pub cycles: Vec<CycleOutcome>,
}

/// Per-segment orchestrator, built once from the survey configuration.
#[derive(Debug, Clone)]
pub struct SegmentProcessor {
    pub(crate) triwave: Option<TriwaveCorrector>,
    pub(crate) subsample: Option<SubsampleRun>,
    pub(crate) engine: FilterEngine,
    pub(crate) removal: Option<RemovalPolicy>,
    pub(crate) minimum_pings_to_write: usize,
}

/// Subsampler plus the cycle schedule it is driven with.
#[derive(Debug, Clone)]
pub struct SubsampleRun {
    pub sampler: Subsampler,
    /// 1-based chunk index where the first cycle starts.
    pub chunk_start: usize,
    /// Number of cycles to walk.
    pub iterations: usize,
}

impl SegmentProcessor {
    pub fn new(
        triwave: Option<TriwaveCorrector>,
        subsample: Option<SubsampleRun>,
        engine: FilterEngine,
        removal: Option<RemovalPolicy>,
        minimum_pings_to_write: usize,
    ) -> Self {
        Self {
            triwave,
            subsample,
            engine,
            removal,
            minimum_pings_to_write,
        }
    }

    /// Process one segment. Mutates the power matrix (triwave correction),
    /// the navigation track (bad-fix marking, speed fill) and the bottom
    /// track (forward fill).
    pub fn process(
        &self,
        series: &mut PingSeries,
        nav: &mut NavTrack,
        bottom_range: Option<&mut Vec<f64>>,
    ) -> Result<SegmentReport, SegmentError> {
        let n = series.n_pings();
        if n == 0 {
            return Err(SegmentError::EmptySegment);
        }

        nav.mark_bad_fixes();
        if nav.fill_speed_from_positions(&series.ping_time) {
            info!("Filled missing speeds from position fixes");
        }
        let bottom_range = bottom_range.map(|b| {
            forward_fill_non_finite(b);
            &b[..]
        });

        let triwave = match &self.triwave {
            Some(corrector) => match corrector.correct(series) {
                Ok(fit) => Some(fit),
                Err(e @ TriwaveError::Undersampled { .. }) => {
                    warn!(error = %e, "Skipping triangle-wave correction");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Triangle-wave correction failed");
                    None
                }
            },
            None => None,
        };

        let engine = self.engine.run(series, nav, bottom_range);

        let mut cycles = Vec::new();
        match &self.subsample {
            Some(run) => {
                for iteration in 0..run.iterations {
                    let phase = run.sampler.cycle_phase(iteration, run.chunk_start);
                    let start_ping = run.sampler.cycle_start_ping(phase);
                    let selection = run.sampler.select(n, start_ping)?;
                    cycles.push(self.finish_cycle(phase + 1, start_ping, selection, &engine));
                }
            }
            None => {
                // No subsampling: a single cycle selecting every ping.
                let selection = Selection {
                    mask: vec![true; n],
                    chunks: vec![(0, n - 1)],
                };
                cycles.push(self.finish_cycle(1, 0, selection, &engine));
            }
        }

        Ok(SegmentReport {
            triwave,
            engine,
            cycles,
        })
    }

    fn finish_cycle(
        &self,
        line: usize,
        start_ping: usize,
        selection: Selection,
        engine: &EngineReport,
    ) -> CycleOutcome {
        let (refined, refinement) = match &self.removal {
            Some(policy) => {
                let r = refine(&selection.mask, engine, policy);
                (r.mask.clone(), Some(r))
            }
            None => (selection.mask.clone(), None),
        };
        let keep = and_masks(&refined, &engine.combined);
        let kept = keep.iter().filter(|&&b| b).count();
        let writeable = kept >= self.minimum_pings_to_write;
        info!(line, start_ping, kept, writeable, "Cycle complete");
        CycleOutcome {
            line,
            start_ping,
            chunks: selection.chunks,
            keep,
            refinement,
            kept,
            writeable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Polarity, Polygon, StageConfig};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn series(n: usize) -> PingSeries {
        let t0 = Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        PingSeries::new(
            Array2::zeros((n, 4)),
            None,
            vec![0.0, 1.0, 2.0, 3.0],
            (0..n).map(|i| t0 + chrono::Duration::seconds(i as i64)).collect(),
            vec![0.0; n],
        )
        .expect("consistent axes")
    }

    fn nav(n: usize, speed: f64) -> NavTrack {
        NavTrack {
            latitude: vec![0.5; n],
            longitude: vec![0.5; n],
            speed_knots: vec![speed; n],
        }
    }

    fn processor(subsample: Option<SubsampleRun>, stages: Vec<StageConfig>) -> SegmentProcessor {
        SegmentProcessor::new(
            None,
            subsample,
            FilterEngine::new(stages),
            Some(RemovalPolicy::new(50, 15.0).expect("valid policy")),
            1,
        )
    }

    fn run_of(chunk_size: usize, percent: f64, iterations: usize) -> SubsampleRun {
        SubsampleRun {
            sampler: Subsampler::new(chunk_size, percent).expect("valid subsampler"),
            chunk_start: 1,
            iterations,
        }
    }

    #[test]
    fn single_cycle_selects_one_chunk_per_skip() {
        let mut s = series(1000);
        let mut nav = nav(1000, 10.0);
        let report = processor(Some(run_of(50, 5.0, 1)), vec![])
            .process(&mut s, &mut nav, None)
            .expect("segment processes");
        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.line, 1);
        assert_eq!(cycle.chunks, vec![(0, 49)]);
        assert_eq!(cycle.kept, 50);
        assert!(cycle.writeable);
    }

    #[test]
    fn cycles_advance_by_one_chunk_and_wrap() {
        let mut s = series(1000);
        let mut nav = nav(1000, 10.0);
        let report = processor(Some(run_of(50, 5.0, 21)), vec![])
            .process(&mut s, &mut nav, None)
            .expect("segment processes");
        let starts: Vec<usize> = report.cycles.iter().map(|c| c.start_ping).collect();
        // 100/5 = 20 phases; the 21st cycle wraps back to the first chunk.
        assert_eq!(starts[0], 0);
        assert_eq!(starts[1], 50);
        assert_eq!(starts[19], 950);
        assert_eq!(starts[20], 0);
        assert_eq!(report.cycles[20].line, 1);
    }

    #[test]
    fn final_mask_combines_selection_and_filters() {
        let mut s = series(1000);
        // Second half of the segment too slow.
        let mut nav = nav(1000, 10.0);
        for v in nav.speed_knots.iter_mut().skip(500) {
            *v = 1.0;
        }
        let report = processor(
            Some(run_of(50, 10.0, 2)),
            vec![StageConfig::Speed { min_knots: 5.0 }],
        )
        .process(&mut s, &mut nav, None)
        .expect("segment processes");
        // Cycle 1 selects chunks starting at 0, 500; the 500 chunk is slow.
        let c = &report.cycles[0];
        assert_eq!(c.chunks, vec![(0, 49), (500, 549)]);
        assert_eq!(c.kept, 50);
        assert!(c.keep[0] && !c.keep[500]);
    }

    #[test]
    fn start_beyond_segment_is_fatal() {
        let mut s = series(30);
        let mut nav = nav(30, 10.0);
        let run = SubsampleRun {
            sampler: Subsampler::new(50, 5.0).expect("valid subsampler"),
            chunk_start: 2,
            iterations: 1,
        };
        let err = processor(Some(run), vec![]).process(&mut s, &mut nav, None);
        assert!(matches!(
            err,
            Err(SegmentError::Subsample(
                SubsampleError::StartBeyondSegment { .. }
            ))
        ));
    }

    #[test]
    fn no_subsampler_processes_the_whole_segment() {
        let mut s = series(120);
        let mut nav = nav(120, 10.0);
        let report = processor(None, vec![])
            .process(&mut s, &mut nav, None)
            .expect("segment processes");
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].chunks, vec![(0, 119)]);
        assert_eq!(report.cycles[0].kept, 120);
    }

    #[test]
    fn empty_segment_is_rejected() {
        let mut s = series(0);
        let mut nav = nav(0, 10.0);
        let err = processor(None, vec![]).process(&mut s, &mut nav, None);
        assert!(matches!(err, Err(SegmentError::EmptySegment)));
    }

    #[test]
    fn unwriteable_cycle_is_flagged() {
        let mut s = series(100);
        let mut nav = nav(100, 1.0);
        let mut p = processor(
            None,
            vec![StageConfig::Speed { min_knots: 5.0 }],
        );
        p.minimum_pings_to_write = 10;
        let report = p
            .process(&mut s, &mut nav, None)
            .expect("segment processes");
        assert_eq!(report.cycles[0].kept, 0);
        assert!(!report.cycles[0].writeable);
    }

    #[test]
    fn bottom_track_is_forward_filled() {
        let mut s = series(10);
        let mut nav = nav(10, 10.0);
        let mut bottom = vec![5.0, f64::NAN, f64::NAN, 6.0, f64::NAN];
        bottom.extend_from_slice(&[7.0; 5]);
        let _ = processor(None, vec![])
            .process(&mut s, &mut nav, Some(&mut bottom))
            .expect("segment processes");
        assert_eq!(bottom[1], 5.0);
        assert_eq!(bottom[2], 5.0);
        assert_eq!(bottom[4], 6.0);
    }

    #[test]
    fn polarity_inverts_keep_for_known_positions() {
        let mut s = series(4);
        let mut nav = nav(4, 10.0);
        nav.latitude = vec![0.5, 5.0, 0.5, 5.0];
        nav.longitude = vec![0.5, 5.0, 0.5, 5.0];
        let square =
            Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]).expect("polygon");
        let keep_in = processor(
            None,
            vec![StageConfig::GeoBounds {
                polygon: square.clone(),
                polarity: Polarity::In,
            }],
        )
        .process(&mut s.clone(), &mut nav.clone(), None)
        .expect("segment processes");
        let keep_out = processor(
            None,
            vec![StageConfig::GeoBounds {
                polygon: square,
                polarity: Polarity::Out,
            }],
        )
        .process(&mut s, &mut nav, None)
        .expect("segment processes");
        assert_eq!(keep_in.cycles[0].keep, vec![true, false, true, false]);
        assert_eq!(keep_out.cycles[0].keep, vec![false, true, false, true]);
    }
}
