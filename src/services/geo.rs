/// Mean Earth radius in kilometers, as used by the ranking expression.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinate pairs using the spherical
/// law of cosines. The intermediate cosine is clamped to [-1, 1] so that
/// rounding near identical or antipodal points cannot leave the domain of
/// `acos`.
pub fn distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let lat_a = lat_a.to_radians();
    let lat_b = lat_b.to_radians();
    let delta_lon = (lon_b - lon_a).to_radians();

    let cosine = lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * delta_lon.cos();
    cosine.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM
}
