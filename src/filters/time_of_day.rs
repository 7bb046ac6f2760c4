//! Daytime filter: keep pings between sunrise and sunset.
//!
//! Sunrise/sunset come either from solar geometry at the segment's mean
//! position (see [`super::solar`]) or from an externally supplied table of
//! date ranges. The comparison handles day windows that wrap midnight, which
//! happens routinely for western longitudes expressed in UTC.

use super::solar::sun_rise_set;
use super::StageError;
use crate::series::{NavTrack, PingSeries};
use crate::types::PingMask;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Where sunrise/sunset times come from.
#[derive(Debug, Clone)]
pub enum TimeSource {
    /// Compute from solar position at the segment's mean lat/lon.
    Solar { depression_deg: f64 },
    /// Fixed times per date range, typically loaded from a CSV file.
    Table(DaylightTable),
}

/// One date range with its fixed sunrise/sunset times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaylightRow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

/// Table mapping date ranges to sunrise/sunset times.
#[derive(Debug, Clone, Default)]
pub struct DaylightTable {
    rows: Vec<DaylightRow>,
}

impl DaylightTable {
    pub fn new(rows: Vec<DaylightRow>) -> Self {
        Self { rows }
    }

    /// Load from a CSV file with a header row and columns
    /// `start_date, end_date, sunrise, sunset`.
    pub fn from_csv(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let parse = |i: usize| record.get(i).unwrap_or("").trim().to_string();
            let (Some(start_date), Some(end_date)) =
                (parse_date(&parse(0)), parse_date(&parse(1)))
            else {
                warn!(row = ?record, "Skipping daylight row with unparseable dates");
                continue;
            };
            let (Some(sunrise), Some(sunset)) = (parse_time(&parse(2)), parse_time(&parse(3)))
            else {
                warn!(row = ?record, "Skipping daylight row with unparseable times");
                continue;
            };
            rows.push(DaylightRow {
                start_date,
                end_date,
                sunrise,
                sunset,
            });
        }
        Ok(Self { rows })
    }

    /// Find the row whose date range contains `at`. Both bounds are
    /// exclusive at the range's midnights.
    pub fn lookup(&self, at: DateTime<Utc>) -> Option<&DaylightRow> {
        let t = at.naive_utc();
        self.rows.iter().find(|row| {
            t > row.start_date.and_time(NaiveTime::MIN) && t < row.end_date.and_time(NaiveTime::MIN)
        })
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }
    None
}

/// Keep when the time-of-day lies between sunrise and sunset, wrapping
/// midnight when sunset precedes sunrise.
fn daytime(t: NaiveTime, sunrise: NaiveTime, sunset: NaiveTime) -> bool {
    if sunrise < sunset {
        t > sunrise && t < sunset
    } else {
        t > sunrise || t < sunset
    }
}

fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

pub fn apply(
    series: &PingSeries,
    nav: &NavTrack,
    source: &TimeSource,
    hour_shift: f64,
) -> Result<PingMask, StageError> {
    let first = series
        .ping_time
        .first()
        .ok_or_else(|| StageError::DataUnavailable("segment has no pings".into()))?;
    let shift = Duration::milliseconds((hour_shift * 3_600_000.0) as i64);

    let (sunrise, sunset) = match source {
        TimeSource::Solar { depression_deg } => {
            let lat = nan_mean(&nav.latitude);
            let lon = nan_mean(&nav.longitude);
            if lat.is_nan() || lon.is_nan() {
                return Err(StageError::DataUnavailable(
                    "no latitude/longitude for solar angle".into(),
                ));
            }
            // The date of the first ping anchors the whole segment; the
            // drift in sunrise/sunset across one segment is negligible.
            let date = (*first + shift).date_naive();
            match sun_rise_set(date, lat, lon, *depression_deg) {
                Some(sun) => (sun.sunrise, sun.sunset),
                None => {
                    warn!(
                        lat,
                        lon,
                        depression_deg,
                        "Sun never crosses the configured depression, keeping all pings"
                    );
                    return Ok(vec![true; series.n_pings()]);
                }
            }
        }
        TimeSource::Table(table) => {
            // Row selection anchors on the recorded first ping; the hour
            // shift only moves the kept-or-dropped comparison below.
            let row = table.lookup(*first).ok_or_else(|| {
                StageError::DataUnavailable("no daylight table row covers the segment".into())
            })?;
            (row.sunrise, row.sunset)
        }
    };
    info!(%sunrise, %sunset, "Applying daytime window");

    Ok(series
        .ping_time
        .iter()
        .map(|t| daytime((*t + shift).time(), sunrise, sunset))
        .collect())
}
