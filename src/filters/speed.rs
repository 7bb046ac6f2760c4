//! Vessel speed filter: keep pings logged at or above a minimum speed.
//!
//! Slow or stopped vessels oversample the same patch of water and bias the
//! acoustic record, so survey processing drops pings below a speed floor.

use super::StageError;
use crate::series::{NavTrack, PingSeries};
use crate::types::PingMask;
use tracing::debug;

pub fn apply(series: &PingSeries, nav: &NavTrack, min_knots: f64) -> Result<PingMask, StageError> {
    if nav.speed_knots.len() != series.n_pings() {
        return Err(StageError::DataUnavailable(format!(
            "speed track has {} entries for {} pings",
            nav.speed_knots.len(),
            series.n_pings()
        )));
    }
    if nav.speed_knots.iter().all(|s| s.is_nan()) {
        return Err(StageError::DataUnavailable(
            "no speed data in segment".into(),
        ));
    }
    // NaN compares false, so unknown speeds are dropped.
    let mask: PingMask = nav.speed_knots.iter().map(|&s| s >= min_knots).collect();
    debug!(
        min_knots,
        kept = mask.iter().filter(|&&b| b).count(),
        total = mask.len(),
        "Applied speed floor"
    );
    Ok(mask)
}
