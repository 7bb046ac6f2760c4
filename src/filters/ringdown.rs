//! Ringdown filter: keep pings whose near-transducer level tracks the
//! running median.
//!
//! The first few metres of every ping record the transducer's own ringdown.
//! That level is stable on a healthy channel; a ping whose ringdown jumps
//! away from the local median points to interference or a transmit fault.

use super::StageError;
use crate::series::{mean_db_linear, PingSeries};
use crate::signal::running_median;
use crate::types::PingMask;
use tracing::debug;

pub fn apply(
    series: &PingSeries,
    window: usize,
    tolerance_db: f64,
    range_span: (f64, f64),
) -> Result<PingMask, StageError> {
    let (range_start, range_end) = range_span;
    if range_start >= range_end {
        return Err(StageError::Config(format!(
            "ringdown range span ({range_start}, {range_end}) is inverted"
        )));
    }
    if tolerance_db <= 0.0 {
        return Err(StageError::Config(format!(
            "ringdown tolerance {tolerance_db} dB must be positive"
        )));
    }
    let levels: Vec<f64> = (0..series.n_pings())
        .map(|i| {
            mean_db_linear(
                series
                    .range
                    .iter()
                    .zip(series.power.row(i))
                    .filter(|(&r, _)| r >= range_start && r <= range_end)
                    .map(|(_, &v)| v),
            )
        })
        .collect();
    if levels.iter().all(|l| l.is_nan()) {
        return Err(StageError::DataUnavailable(
            "no samples inside the ringdown range span".into(),
        ));
    }
    let median = running_median(&levels, window)?;
    let mask: PingMask = levels
        .iter()
        .zip(&median)
        .map(|(&l, &m)| l > m - tolerance_db && l < m + tolerance_db)
        .collect();
    debug!(
        window,
        tolerance_db,
        kept = mask.iter().filter(|&&b| b).count(),
        total = mask.len(),
        "Applied ringdown stability check"
    );
    Ok(mask)
}
