//! Small-scale geo math for the nearby view: a bounding box narrows the SQL
//! scan, haversine refines and orders the survivors.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const MAX_RADIUS_M: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

pub fn valid_coords(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Box enclosing the radius around a point. Longitude span widens with
/// latitude; near the poles it degenerates to the full range.
pub fn bounding_box(lat: f64, lng: f64, radius_m: f64) -> BoundingBox {
    let lat_delta = (radius_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = lat.to_radians().cos();
    let lng_delta = if cos_lat.abs() < 1e-6 {
        180.0
    } else {
        (radius_m / (EARTH_RADIUS_M * cos_lat.abs())).to_degrees()
    };
    BoundingBox {
        min_lat: (lat - lat_delta).max(-90.0),
        max_lat: (lat + lat_delta).min(90.0),
        min_lng: (lng - lng_delta).max(-180.0),
        max_lng: (lng + lng_delta).min(180.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine_m(52.52, 13.405, 52.52, 13.405), 0.0);
    }

    #[test]
    fn haversine_known_distance() {
        // Berlin -> Potsdam city centers, roughly 26 km.
        let d = haversine_m(52.5200, 13.4050, 52.3906, 13.0645);
        assert!((20_000.0..32_000.0).contains(&d), "got {}", d);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_m(40.0, -74.0, 41.0, -73.0);
        let b = haversine_m(41.0, -73.0, 40.0, -74.0);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn bbox_contains_points_within_radius() {
        let bbox = bounding_box(52.52, 13.405, 2_000.0);
        // ~1.4 km north-east
        let (lat, lng) = (52.529, 13.420);
        assert!(haversine_m(52.52, 13.405, lat, lng) < 2_000.0);
        assert!(lat >= bbox.min_lat && lat <= bbox.max_lat);
        assert!(lng >= bbox.min_lng && lng <= bbox.max_lng);
    }

    #[test]
    fn bbox_clamps_at_the_poles() {
        let bbox = bounding_box(89.9999, 0.0, 10_000.0);
        assert!(bbox.max_lat <= 90.0);
        assert!(bbox.min_lng >= -180.0 && bbox.max_lng <= 180.0);
    }

    #[test]
    fn coordinate_validation() {
        assert!(valid_coords(0.0, 0.0));
        assert!(valid_coords(-90.0, 180.0));
        assert!(!valid_coords(90.01, 0.0));
        assert!(!valid_coords(0.0, -180.5));
        assert!(!valid_coords(f64::NAN, 0.0));
    }
}
