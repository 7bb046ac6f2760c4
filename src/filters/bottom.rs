//! Bottom echo filter: keep pings whose bottom-echo strength clears a floor.
//!
//! A weak or missing bottom return usually means the sounder lost the bottom
//! or the detection locked onto something else, so the ping's bottom-locked
//! quantities cannot be trusted. For each ping the stage averages Sv inside
//! an envelope around the detected bottom range and compares that level
//! against either a fixed floor or a floor relative to the running median of
//! neighbouring pings. A search gate bounds the range samples that must be
//! present: a ping with no finite Sv inside the gate has no usable echo and
//! is dropped.

use super::{BottomMode, StageError};
use crate::series::{mean_db_linear, PingSeries};
use crate::signal::running_median;
use crate::types::PingMask;
use tracing::debug;

#[allow(clippy::too_many_arguments)]
pub fn apply(
    series: &PingSeries,
    bottom_range: Option<&[f64]>,
    mode: BottomMode,
    search_gate: (f64, f64),
    envelope: (f64, f64),
    threshold_db: f64,
    use_transducer_offset: bool,
) -> Result<PingMask, StageError> {
    let (gate_min, gate_max) = search_gate;
    let (env_upper, env_lower) = envelope;
    if gate_min >= gate_max {
        return Err(StageError::Config(format!(
            "bottom search gate ({gate_min}, {gate_max}) is inverted"
        )));
    }
    if env_upper < 0.0 || env_lower < 0.0 {
        return Err(StageError::Config(format!(
            "bottom envelope ({env_upper}, {env_lower}) must be non-negative"
        )));
    }
    let sv = series.sv.as_ref().ok_or_else(|| {
        StageError::DataUnavailable("segment has no Sv matrix for bottom echo".into())
    })?;
    let bottom_range = bottom_range.ok_or_else(|| {
        StageError::DataUnavailable("segment has no bottom detection track".into())
    })?;
    if bottom_range.len() != series.n_pings() {
        return Err(StageError::DataUnavailable(format!(
            "bottom track has {} entries for {} pings",
            bottom_range.len(),
            series.n_pings()
        )));
    }
    if bottom_range.iter().all(|b| b.is_nan()) {
        return Err(StageError::DataUnavailable(
            "no bottom detections in segment".into(),
        ));
    }

    let levels: Vec<f64> = (0..series.n_pings())
        .map(|i| {
            let mut bot = bottom_range[i];
            if use_transducer_offset {
                bot -= series.transducer_offset[i];
            }
            // The gate selects range samples, not the detection itself. A
            // ping with no finite Sv strictly inside the gate has nothing to
            // average and scores NaN.
            let gated = series
                .range
                .iter()
                .zip(sv.row(i))
                .any(|(&r, &v)| r > gate_min && r < gate_max && v.is_finite());
            if !gated {
                return f64::NAN;
            }
            let (lo, hi) = (bot - env_upper, bot + env_lower);
            mean_db_linear(
                series
                    .range
                    .iter()
                    .zip(sv.row(i))
                    .filter(|(&r, _)| r >= lo && r <= hi)
                    .map(|(_, &v)| v),
            )
        })
        .collect();

    let mask: PingMask = match mode {
        BottomMode::Fixed => levels.iter().map(|&l| l > threshold_db).collect(),
        BottomMode::Relative { window } => {
            let median = running_median(&levels, window)?;
            levels
                .iter()
                .zip(&median)
                .map(|(&l, &m)| l > m - threshold_db)
                .collect()
        }
    };
    debug!(
        ?mode,
        threshold_db,
        kept = mask.iter().filter(|&&b| b).count(),
        total = mask.len(),
        "Applied bottom echo floor"
    );
    Ok(mask)
}
