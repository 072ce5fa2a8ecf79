//! Fixed-point coordinates and the circular working-zone membership test.
//!
//! Coordinates are degrees scaled by 10⁶ and stored as `i64`. Distances use a
//! planar (equirectangular) approximation with a constant 111 000 metres per
//! degree on both axes and no longitude-cosine correction. Everything is
//! integer arithmetic, so the ledger and any client agree bit-for-bit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Scale factor of fixed-point degrees.
pub const MICRODEGREES: i64 = 1_000_000;

/// Metres per degree used on both axes.
pub const METERS_PER_DEGREE: u128 = 111_000;

/// A coordinate in fixed-point degrees (× 10⁶).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub lat: i64,
    pub lon: i64,
}

impl Position {
    pub const fn new(lat: i64, lon: i64) -> Self {
        Self { lat, lon }
    }

    /// Convert from floating-point degrees, validating the ranges.
    pub fn from_degrees(lat: f64, lon: f64) -> Result<Self, TypeError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::CoordinateOutOfRange(format!("latitude {lat}")));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(TypeError::CoordinateOutOfRange(format!("longitude {lon}")));
        }
        Ok(Self {
            lat: (lat * MICRODEGREES as f64).round() as i64,
            lon: (lon * MICRODEGREES as f64).round() as i64,
        })
    }

    /// Shift by a number of metres north and east (negative for south/west).
    pub fn offset_meters(&self, north_m: i64, east_m: i64) -> Self {
        Self {
            lat: self.lat.saturating_add(meters_to_microdegrees(north_m)),
            lon: self.lon.saturating_add(meters_to_microdegrees(east_m)),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6})",
            self.lat as f64 / MICRODEGREES as f64,
            self.lon as f64 / MICRODEGREES as f64
        )
    }
}

/// A circular zone: a fixed-point center and an integer radius in metres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoZone {
    pub center: Position,
    pub radius_m: u64,
}

impl GeoZone {
    pub const fn new(center: Position, radius_m: u64) -> Self {
        Self { center, radius_m }
    }

    /// Membership test; see [`within_zone`].
    pub fn contains(&self, position: &Position) -> bool {
        within_zone(position, self)
    }

    /// Planar distance from the center in whole metres.
    pub fn distance_m(&self, position: &Position) -> u64 {
        let squared = squared_offset_m(position, &self.center);
        (squared as f64).sqrt() as u64
    }

    /// The informational restricted zone shown next to the working zone.
    ///
    /// Same radius, centered two radii north of this zone's center. It never
    /// gates a ledger transition.
    pub fn restricted(&self) -> GeoZone {
        let shift = i64::try_from(self.radius_m.saturating_mul(2)).unwrap_or(i64::MAX);
        GeoZone {
            center: self.center.offset_meters(shift, 0),
            radius_m: self.radius_m,
        }
    }
}

/// Returns `true` if `position` lies inside `zone`. The boundary is inside.
pub fn within_zone(position: &Position, zone: &GeoZone) -> bool {
    let radius = u128::from(zone.radius_m);
    squared_offset_m(position, &zone.center) <= radius * radius
}

/// `Δlat_m² + Δlon_m²` with each delta truncated to whole metres.
fn squared_offset_m(a: &Position, b: &Position) -> u128 {
    let dlat = axis_meters(a.lat, b.lat);
    let dlon = axis_meters(a.lon, b.lon);
    dlat.saturating_mul(dlat).saturating_add(dlon.saturating_mul(dlon))
}

fn axis_meters(a: i64, b: i64) -> u128 {
    let delta = (i128::from(a) - i128::from(b)).unsigned_abs();
    delta * METERS_PER_DEGREE / MICRODEGREES as u128
}

fn meters_to_microdegrees(meters: i64) -> i64 {
    let scaled = i128::from(meters) * i128::from(MICRODEGREES) / METERS_PER_DEGREE as i128;
    i64::try_from(scaled).unwrap_or(if meters < 0 { i64::MIN } else { i64::MAX })
}
