//! Triangle-wave (calibration oscillator) correction of raw power.
//!
//! Certain sounders modulate every transmitted ping with a slow triangular
//! wave from their calibration oscillator. The artifact is visible in the
//! transducer ringdown, which is otherwise stable ping to ping, so the
//! corrector estimates the wave from per-ping ringdown levels and subtracts
//! it from every range sample.

use crate::series::{forward_fill_non_finite, mean_db_linear, PingSeries};
use crate::signal::{fit_triangle, general_triangle, FitError};
use crate::types::TriwaveFit;
use thiserror::Error;
use tracing::{info, warn};

/// Triangle-wave period in pings, intrinsic to the instrument's calibration
/// oscillator.
pub const TRIWAVE_PERIOD: f64 = 2721.0;

/// Fits shallower than this coefficient of determination are logged as
/// suspect, but the correction is still applied.
pub const FIT_QUALITY_FLOOR: f64 = 0.9;

#[derive(Error, Debug, PartialEq)]
pub enum TriwaveError {
    #[error("ringdown sample window [{start}, {end}) is empty or outside the {samples}-sample matrix")]
    InvalidWindow {
        start: usize,
        end: usize,
        samples: usize,
    },
    #[error("{pings} pings cannot resolve the wave, need at least {needed} (half a period)")]
    Undersampled { pings: usize, needed: usize },
    #[error("triangle fit failed: {0}")]
    Fit(#[from] FitError),
}

/// Removes the periodic triangle-wave artifact from a segment's raw power.
#[derive(Debug, Clone)]
pub struct TriwaveCorrector {
    start_sample: usize,
    end_sample: usize,
}

impl TriwaveCorrector {
    /// `start_sample..end_sample` is the ringdown sample-index window used to
    /// compute the per-ping level the wave is fitted to.
    pub fn new(start_sample: usize, end_sample: usize) -> Self {
        Self {
            start_sample,
            end_sample,
        }
    }

    /// Fit the wave to the segment's ringdown levels and subtract it from
    /// every sample of every ping, in place.
    ///
    /// On error the power matrix is left unmodified. Fewer pings than half a
    /// wave period cannot anchor the fit and fail up front; a fit with
    /// r-squared below [`FIT_QUALITY_FLOOR`] is logged and still applied.
    pub fn correct(&self, series: &mut PingSeries) -> Result<TriwaveFit, TriwaveError> {
        let pings = series.n_pings();
        let needed = (TRIWAVE_PERIOD / 2.0) as usize;
        if pings < needed {
            return Err(TriwaveError::Undersampled { pings, needed });
        }
        let samples = series.n_samples();
        if self.start_sample >= self.end_sample || self.start_sample >= samples {
            return Err(TriwaveError::InvalidWindow {
                start: self.start_sample,
                end: self.end_sample,
                samples,
            });
        }
        let end = self.end_sample.min(samples);

        let mut levels: Vec<f64> = series
            .power
            .rows()
            .into_iter()
            .map(|row| mean_db_linear(row.iter().copied().skip(self.start_sample).take(end - self.start_sample)))
            .collect();
        forward_fill_non_finite(&mut levels);

        let fit = fit_triangle(&levels, TRIWAVE_PERIOD)?;
        if fit.r_squared < FIT_QUALITY_FLOOR {
            warn!(
                r_squared = fit.r_squared,
                amplitude = fit.amplitude,
                "Suspect triangle fit, applying correction anyway"
            );
        } else {
            info!(r_squared = fit.r_squared, "Triangle fit accepted");
        }

        for (i, mut row) in series.power.rows_mut().into_iter().enumerate() {
            let offset = general_triangle(i as f64, fit.amplitude, TRIWAVE_PERIOD, fit.period_offset, 0.0);
            row.mapv_inplace(|v| v - offset);
        }
        info!("Corrected triangle wave noise in raw power");
        Ok(fit)
    }
}
