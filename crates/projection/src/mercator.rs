//! Spherical (pseudo) Mercator projection, EPSG:3857.
//!
//! Coordinates are (longitude, latitude) in degrees on the geographic side and
//! (easting, northing) in meters on the projected side.

use std::f64::consts::PI;

/// WGS84 semi-major axis used as the sphere radius (meters).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which the projected square world ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Half the width of the projected world (meters).
pub const MAX_EXTENT: f64 = 20_037_508.342_789_244;

/// Project longitude/latitude (degrees) to Web Mercator meters.
///
/// Latitudes beyond [`MAX_LATITUDE`] are clamped to the edge of the world.
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Unproject Web Mercator meters to longitude/latitude (degrees).
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    #[test]
    fn test_origin() {
        let (x, y) = lon_lat_to_mercator(0.0, 0.0);
        assert!(approx_eq(x, 0.0, 1e-9));
        assert!(approx_eq(y, 0.0, 1e-9));
    }

    #[test]
    fn test_world_edge() {
        let (x, y) = lon_lat_to_mercator(180.0, MAX_LATITUDE);
        assert!(approx_eq(x, MAX_EXTENT, 1e-6));
        assert!(approx_eq(y, MAX_EXTENT, 1e-3));
    }

    #[test]
    fn test_roundtrip() {
        for (lon, lat) in [(-122.4, 37.8), (2.35, 48.85), (151.2, -33.9)] {
            let (x, y) = lon_lat_to_mercator(lon, lat);
            let (lon2, lat2) = mercator_to_lon_lat(x, y);
            assert!(approx_eq(lon, lon2, 1e-9));
            assert!(approx_eq(lat, lat2, 1e-9));
        }
    }

    #[test]
    fn test_polar_latitudes_are_clamped() {
        let (_, y) = lon_lat_to_mercator(0.0, 90.0);
        assert!(y.is_finite());
        assert!(approx_eq(y, MAX_EXTENT, 1e-3));
    }
}
