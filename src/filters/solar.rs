//! Sunrise/sunset times from solar geometry.
//!
//! NOAA low-accuracy solar position equations: fractional year, equation of
//! time, and solar declination give the hour angle at which the sun crosses
//! a configurable depression below the horizon. Accuracy is a couple of
//! minutes, which is far below the ping-level granularity the time-of-day
//! filter works at.

use chrono::{Datelike, NaiveDate, NaiveTime};

/// UTC sunrise/sunset pair for one date and location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

/// UTC sunrise and sunset at `depression_deg` below the horizon.
///
/// Returns `None` when the sun never crosses that depression on the given
/// date at the given latitude (midnight sun / polar night).
pub fn sun_rise_set(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    depression_deg: f64,
) -> Option<SunTimes> {
    let doy = date.ordinal() as f64;
    // Fractional year at solar noon, radians.
    let gamma = 2.0 * std::f64::consts::PI / 365.0 * (doy - 1.0 + 0.5);

    // Equation of time (minutes) and solar declination (radians).
    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let zenith = (90.0 + depression_deg).to_radians();
    let lat = latitude.to_radians();
    let cos_ha = (zenith.cos() - lat.sin() * decl.sin()) / (lat.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_ha) || cos_ha.is_nan() {
        return None;
    }
    let ha_deg = cos_ha.acos().to_degrees();

    let sunrise_min = 720.0 - 4.0 * (longitude + ha_deg) - eqtime;
    let sunset_min = 720.0 - 4.0 * (longitude - ha_deg) - eqtime;
    Some(SunTimes {
        sunrise: minutes_to_time(sunrise_min),
        sunset: minutes_to_time(sunset_min),
    })
}

fn minutes_to_time(minutes_utc: f64) -> NaiveTime {
    let wrapped = minutes_utc.rem_euclid(24.0 * 60.0);
    let secs = (wrapped * 60.0) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs.min(86_399), 0)
        .unwrap_or(NaiveTime::MIN)
}
