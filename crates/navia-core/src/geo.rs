//! Geodesic helpers: Haversine distance, forward azimuth and spoken-friendly formatting.
//!
//! All coordinates are WGS84 degrees. Inputs are not validated; non-finite values
//! propagate as NaN.

/// Earth radius in meters used by the Haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (Haversine).
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from point 1 to point 2 in degrees, normalized into [0, 360).
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap any angle into [0, 360).
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap a signed angle difference into (-180, 180]. Negative = left, positive = right.
pub fn signed_rotation(target_bearing: f64, heading: f64) -> f64 {
    let r = normalize_degrees(target_bearing - heading);
    if r > 180.0 {
        r - 360.0
    } else {
        r
    }
}

/// "850 m" below one kilometer, "1.2 km" above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// "12 min" below one hour, "1h 5min" above.
pub fn format_duration(seconds: f64) -> String {
    let minutes = (seconds / 60.0).round() as i64;
    if minutes < 60 {
        format!("{} min", minutes)
    } else {
        format!("{}h {}min", minutes / 60, minutes % 60)
    }
}
