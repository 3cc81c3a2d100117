/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two (lat, lng) points given in degrees.
///
/// Returns `f64::INFINITY` if any coordinate is not a finite number, so a
/// malformed record never lands inside a distance threshold.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
	if ![lat1, lng1, lat2, lng2].iter().all(|v| v.is_finite()) {
		return f64::INFINITY;
	}

	let phi1 = lat1.to_radians();
	let phi2 = lat2.to_radians();
	let dphi = (lat2 - lat1).to_radians();
	let dlambda = (lng2 - lng1).to_radians();

	let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
	let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

	EARTH_RADIUS_M * c
}
