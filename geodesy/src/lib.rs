//! Conversions between WGS84 coordinates and a local Cartesian frame anchored
//! at a reference point.
//!
//! The local frame has its x axis pointing north and its y axis pointing west,
//! so yaw is measured counter-clockwise from north and relates to a geodesic
//! azimuth (clockwise from north) by `azimuth = -yaw`.

extern crate geographiclib_rs;
extern crate prelude;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate thiserror;

use geographiclib_rs::{DirectGeodesic, Geodesic, InverseGeodesic};
use thiserror::Error;

use prelude::*;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeodeticError {
    #[error("invalid geodetic point: lat={lat} lon={lon}")]
    InvalidPoint { lat: float, lon: float },

    #[error("no reference point has been set")]
    ReferenceUnset,
}

pub type Result<T> = std::result::Result<T, GeodeticError>;

/// Latitude and longitude in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: float,
    pub lon: float,
}

impl GeoPoint {
    pub fn new(lat: float, lon: float) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() || self.lat.abs() > 90.0 {
            return Err(GeodeticError::InvalidPoint {
                lat: self.lat,
                lon: self.lon,
            });
        }
        Ok(())
    }

    /// Local coordinates of this point relative to `reference`.
    pub fn cartesian(&self, reference: &GeoPoint) -> Result<(float, float)> {
        to_local(reference, self)
    }

    pub fn from_cartesian(reference: &GeoPoint, x: float, y: float) -> Result<GeoPoint> {
        to_wgs84(reference, (x, y))
    }

    pub fn advance(&self, distance: float, yaw: float) -> Result<GeoPoint> {
        advance(self, distance, yaw)
    }
}

fn wgs84() -> Geodesic {
    Geodesic::wgs84()
}

/// Solves the inverse geodesic problem from `reference` to `point` and
/// returns the displacement in the local frame.
pub fn to_local(reference: &GeoPoint, point: &GeoPoint) -> Result<(float, float)> {
    reference.validate()?;
    point.validate()?;

    let (s12, azi1, _azi2, _a12): (float, float, float, float) =
        wgs84().inverse(reference.lat, reference.lon, point.lat, point.lon);
    let a = -azi1.to_radians();
    Ok((s12 * a.cos(), s12 * a.sin()))
}

/// Inverse of `to_local` by two sequential direct solves: `x` metres along the
/// local x axis, then `y` metres along the local y axis from the intermediate
/// point.
///
/// This is not an orthogonal projection. The error relative to `to_local`
/// grows with the size of the displacement and how far it is off either axis.
///
/// The steps go north then west to match the frame of `to_local`. Stepping
/// east then north instead would map `(x, y)` onto the wrong axes and the
/// round trip through `to_local` would no longer hold.
pub fn to_wgs84(reference: &GeoPoint, (x, y): (float, float)) -> Result<GeoPoint> {
    let intermediate = advance(reference, x, 0.0)?;
    advance(&intermediate, y, PI / 2.0)
}

/// Moves `distance` metres from `reference` heading along local `yaw`.
pub fn advance(reference: &GeoPoint, distance: float, yaw: float) -> Result<GeoPoint> {
    reference.validate()?;

    let azimuth = (-yaw).to_degrees();
    let (lat, lon): (float, float) = wgs84().direct(reference.lat, reference.lon, azimuth, distance);
    Ok(GeoPoint { lat, lon })
}
