//! Geographic bounds filter: keep pings inside (or outside) a polygon.

use super::StageError;
use crate::series::{NavTrack, PingSeries};
use crate::types::PingMask;
use std::path::Path;
use tracing::debug;

/// Whether pings inside the polygon are kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Keep pings inside the polygon.
    In,
    /// Keep pings outside the polygon.
    Out,
}

/// A simple closed polygon in (longitude, latitude) order.
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(vertices: Vec<(f64, f64)>) -> Result<Self, StageError> {
        if vertices.len() < 3 {
            return Err(StageError::Config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        Ok(Self { vertices })
    }

    /// Ray-casting point-in-polygon test. Points with a NaN coordinate are
    /// never inside.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lon.is_nan() || lat.is_nan() {
            return false;
        }
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Load polygon vertices from a CSV file with a header row and columns
/// `lat, lon`.
pub fn polygon_from_csv(path: &Path) -> Result<Polygon, StageError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| StageError::Config(format!("cannot read polygon file: {e}")))?;
    let mut vertices = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StageError::Config(format!("bad polygon row: {e}")))?;
        let field = |i: usize| -> Result<f64, StageError> {
            record
                .get(i)
                .map(str::trim)
                .ok_or_else(|| StageError::Config("polygon row missing a column".into()))?
                .parse::<f64>()
                .map_err(|e| StageError::Config(format!("bad polygon coordinate: {e}")))
        };
        let lat = field(0)?;
        let lon = field(1)?;
        vertices.push((lon, lat));
    }
    Polygon::new(vertices)
}

pub fn apply(
    series: &PingSeries,
    nav: &NavTrack,
    polygon: &Polygon,
    polarity: Polarity,
) -> Result<PingMask, StageError> {
    if nav.latitude.len() != series.n_pings() || nav.longitude.len() != series.n_pings() {
        return Err(StageError::DataUnavailable(format!(
            "position track has {} entries for {} pings",
            nav.latitude.len().min(nav.longitude.len()),
            series.n_pings()
        )));
    }
    if nav.latitude.iter().all(|v| v.is_nan()) {
        return Err(StageError::DataUnavailable(
            "no position data in segment".into(),
        ));
    }
    let mask: PingMask = nav
        .latitude
        .iter()
        .zip(&nav.longitude)
        .map(|(&lat, &lon)| match polarity {
            Polarity::In => polygon.contains(lon, lat),
            Polarity::Out => !polygon.contains(lon, lat),
        })
        .collect();
    debug!(
        ?polarity,
        kept = mask.iter().filter(|&&b| b).count(),
        total = mask.len(),
        "Applied geographic bounds"
    );
    Ok(mask)
}
