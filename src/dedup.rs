use crate::common::{Cctv, CctvList, Source};
use crate::geo::haversine_m;



pub const DEFAULT_DUPLICATE_RADIUS_M: f64 = 100.0;

#[derive(Debug)]
pub struct MergeOutcome {
	pub records: CctvList,
	pub added: usize,
	pub skipped: usize,
}

/// Merges `secondary` into `primary`, dropping any secondary camera that sits
/// closer than `radius_m` to some primary camera.
///
/// Primary records are kept in order and retagged `primary_source`; surviving
/// secondary records follow, retagged `secondary_source`. This is a plain
/// nearest-neighbour scan over every pair, which is fine for a few thousand
/// cameras.
pub fn merge_by_proximity(
	primary: CctvList,
	primary_source: Source,
	secondary: CctvList,
	secondary_source: Source,
	radius_m: f64,
) -> MergeOutcome {
	let mut records: CctvList = primary.into_iter()
		.map(|mut cctv| {
			cctv.source = primary_source;
			cctv
		})
		.collect();
	let primary_len = records.len();

	let mut added = 0;
	let mut skipped = 0;
	for mut candidate in secondary {
		let nearest = records[..primary_len].iter()
			.map(|p| haversine_m(candidate.lat, candidate.lng, p.lat, p.lng))
			.fold(f64::INFINITY, f64::min);

		if nearest < radius_m {
			skipped += 1;
		} else {
			candidate.source = secondary_source;
			records.push(candidate);
			added += 1;
		}
	}

	MergeOutcome { records, added, skipped }
}

/// Finds the camera nearest to the given point, with its distance in meters.
/// Cameras without usable coordinates are ignored.
pub fn closest(records: &[Cctv], lat: f64, lng: f64) -> Option<(&Cctv, f64)> {
	records.iter()
		.filter(|cctv| cctv.has_coords())
		.map(|cctv| (cctv, haversine_m(lat, lng, cctv.lat, cctv.lng)))
		.min_by(|a, b| a.1.total_cmp(&b.1))
}
