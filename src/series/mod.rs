//! Ping-series and navigation collaborator data.
//!
//! The core never reads raw files itself; callers hand it one raw-data
//! segment at a time as a [`PingSeries`] (signal matrices plus per-ping
//! metadata) and a [`NavTrack`] (interpolated position and speed). Both are
//! plain owned values so per-segment state is never shared across segments.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use thiserror::Error;
use tracing::info;

/// Kilometres travelled per hour expressed in knots.
const KM_PER_HOUR_TO_KNOTS: f64 = 0.539957;

/// Consecutive GPS fixes further apart than this are treated as glitches.
const MAX_FIX_JUMP_KM: f64 = 0.1;

#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("matrix has {rows} rows but segment has {pings} pings")]
    RowPingMismatch { rows: usize, pings: usize },
    #[error("matrix has {cols} columns but range axis has {bins} bins")]
    ColumnRangeMismatch { cols: usize, bins: usize },
    #[error("per-ping array '{name}' has length {len}, expected {pings}")]
    MetadataLengthMismatch {
        name: &'static str,
        len: usize,
        pings: usize,
    },
}

/// One raw-data segment: signal matrices indexed `[ping, sample]` plus the
/// per-ping metadata the filter stages consume.
#[derive(Debug, Clone)]
pub struct PingSeries {
    /// Raw power (dB). The triwave corrector subtracts its fitted wave from
    /// every sample column of this matrix in place.
    pub power: Array2<f64>,
    /// Volume backscattering strength (dB), computed upstream. Absent when
    /// the caller only needs triwave correction and subsampling.
    pub sv: Option<Array2<f64>>,
    /// Range (metres) of each sample column.
    pub range: Vec<f64>,
    /// Timestamp of each ping.
    pub ping_time: Vec<DateTime<Utc>>,
    /// Transducer mounting depth (metres) per ping.
    pub transducer_offset: Vec<f64>,
}

impl PingSeries {
    /// Build a segment, checking that every array lines up with the ping and
    /// range axes.
    pub fn new(
        power: Array2<f64>,
        sv: Option<Array2<f64>>,
        range: Vec<f64>,
        ping_time: Vec<DateTime<Utc>>,
        transducer_offset: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        let pings = power.nrows();
        if ping_time.len() != pings {
            return Err(SeriesError::MetadataLengthMismatch {
                name: "ping_time",
                len: ping_time.len(),
                pings,
            });
        }
        if transducer_offset.len() != pings {
            return Err(SeriesError::MetadataLengthMismatch {
                name: "transducer_offset",
                len: transducer_offset.len(),
                pings,
            });
        }
        if power.ncols() != range.len() {
            return Err(SeriesError::ColumnRangeMismatch {
                cols: power.ncols(),
                bins: range.len(),
            });
        }
        if let Some(sv) = &sv {
            if sv.nrows() != pings {
                return Err(SeriesError::RowPingMismatch {
                    rows: sv.nrows(),
                    pings,
                });
            }
            if sv.ncols() != range.len() {
                return Err(SeriesError::ColumnRangeMismatch {
                    cols: sv.ncols(),
                    bins: range.len(),
                });
            }
        }
        Ok(Self {
            power,
            sv,
            range,
            ping_time,
            transducer_offset,
        })
    }

    /// Number of pings in the segment.
    pub fn n_pings(&self) -> usize {
        self.power.nrows()
    }

    /// Number of range samples per ping.
    pub fn n_samples(&self) -> usize {
        self.power.ncols()
    }
}

/// Interpolated vessel navigation, one entry per ping. NaN marks unknown.
#[derive(Debug, Clone, Default)]
pub struct NavTrack {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub speed_knots: Vec<f64>,
}

impl NavTrack {
    /// NaN out position fixes that jump implausibly far from their
    /// predecessor. Interpolation across a bad receiver fix otherwise drags
    /// the whole track off course.
    pub fn mark_bad_fixes(&mut self) {
        let mut flagged = 0usize;
        for i in 1..self.latitude.len().min(self.longitude.len()) {
            let (lat1, lon1) = (self.latitude[i - 1], self.longitude[i - 1]);
            let (lat2, lon2) = (self.latitude[i], self.longitude[i]);
            if lat1.is_nan() || lon1.is_nan() || lat2.is_nan() || lon2.is_nan() {
                continue;
            }
            if haversine_km(lat1, lon1, lat2, lon2) > MAX_FIX_JUMP_KM {
                self.latitude[i - 1] = f64::NAN;
                self.longitude[i - 1] = f64::NAN;
                flagged += 1;
            }
        }
        if flagged > 0 {
            info!(flagged, "Marked implausible GPS fixes as unknown");
        }
    }

    /// Fill missing speeds from the distance between consecutive position
    /// fixes. Only NaN entries are substituted; a zero-duration interval
    /// yields a speed of 0 rather than an error.
    ///
    /// Returns true when at least one speed was filled.
    pub fn fill_speed_from_positions(&mut self, ping_time: &[DateTime<Utc>]) -> bool {
        let n = self
            .speed_knots
            .len()
            .min(self.latitude.len())
            .min(ping_time.len());
        let mut filled = false;
        for i in 1..n {
            if !self.speed_knots[i].is_nan() {
                continue;
            }
            let (lat1, lon1) = (self.latitude[i - 1], self.longitude[i - 1]);
            let (lat2, lon2) = (self.latitude[i], self.longitude[i]);
            if lat1.is_nan() || lon1.is_nan() || lat2.is_nan() || lon2.is_nan() {
                continue;
            }
            let seconds = (ping_time[i] - ping_time[i - 1]).num_milliseconds() as f64 / 1000.0;
            let km = haversine_km(lat1, lon1, lat2, lon2);
            self.speed_knots[i] = if seconds > 0.0 {
                3600.0 * KM_PER_HOUR_TO_KNOTS * km / seconds
            } else {
                0.0
            };
            filled = true;
        }
        filled
    }
}

/// Great-circle distance between two lat/lon points in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Mean of dB values in the linear domain, returned in dB:
/// `10 * log10(mean(10^(v/10)))`.
///
/// An empty iterator or all-NaN input yields NaN, which downstream keep-mask
/// comparisons treat as bad.
pub fn mean_db_linear<I: IntoIterator<Item = f64>>(values_db: I) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values_db {
        sum += 10f64.powf(v / 10.0);
        count += 1;
    }
    if count == 0 {
        return f64::NAN;
    }
    10.0 * (sum / count as f64).log10()
}

/// Forward-fill non-finite entries from the closest earlier finite entry.
/// Leading non-finite entries (no earlier neighbour) are left untouched.
pub fn forward_fill_non_finite(values: &mut [f64]) {
    for i in 1..values.len() {
        if !values[i].is_finite() && values[i - 1].is_finite() {
            values[i] = values[i - 1];
        }
    }
}
