//! Folds freshly fetched per-source camera lists into the previous snapshot.
//!
//! Each source is replaced wholesale when its fetch came back with records,
//! and carried over untouched from the previous snapshot when it came back
//! empty. Before anything is handed back for writing, the combined result is
//! checked against the previous snapshot: losing more than `max_drop_rate`
//! of the cameras aborts the update.

use std::collections::{HashMap, HashSet};

use crate::common::{Cctv, CctvList, Source};



/// Coordinate change (degrees) below which a camera is not counted as updated.
const COORD_EPSILON: f64 = 0.00001;

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum ReconcileError {
	#[error(
		"update would drop {:.1}% of records ({previous} -> {candidate}), above the {:.1}% limit; snapshot left untouched",
		.drop_rate * 100.0,
		.max_drop_rate * 100.0
	)]
	DropRateExceeded {
		previous: usize,
		candidate: usize,
		drop_rate: f64,
		max_drop_rate: f64,
	},
}

#[derive(Debug)]
pub struct Reconciliation {
	pub records: CctvList,
	pub added: usize,
	pub removed: usize,
	/// Cameras present before and after whose url, name or position changed.
	/// Informational only.
	pub updated: usize,
	/// Sources whose fetch came back empty and were carried over from the previous snapshot.
	pub carried_over: Vec<Source>,
}

/// Share of the previous records missing from the candidate list. Zero when
/// there was nothing before, negative when the list grew.
pub fn drop_rate(previous: usize, candidate: usize) -> f64 {
	if previous == 0 {
		return 0.0;
	}
	(previous as f64 - candidate as f64) / previous as f64
}

/// Fails when going from `previous` to `candidate` records loses more than
/// `max_drop_rate` of them. Exactly the limit still passes.
pub fn check_drop_rate(previous: usize, candidate: usize, max_drop_rate: f64) -> Result<(), ReconcileError> {
	let rate = drop_rate(previous, candidate);
	if rate > max_drop_rate {
		return Err(ReconcileError::DropRateExceeded { previous, candidate, drop_rate: rate, max_drop_rate });
	}
	Ok(())
}

pub fn reconcile(
	previous: &[Cctv],
	fresh: Vec<(Source, CctvList)>,
	max_drop_rate: f64,
) -> Result<Reconciliation, ReconcileError> {
	let mut previous_by_source: HashMap<Source, Vec<&Cctv>> = HashMap::new();
	for cctv in previous {
		previous_by_source.entry(cctv.source).or_default().push(cctv);
	}

	let mut candidate = CandidateList::default();
	let mut carried_over = Vec::new();
	let mut handled: HashSet<Source> = HashSet::new();

	for (source, records) in fresh {
		handled.insert(source);
		if records.is_empty() {
			carried_over.push(source);
			candidate.extend_from_previous(previous_by_source.get(&source));
		} else {
			candidate.extend(records);
		}
	}
	// Sources nobody asked about this run keep what they had.
	for source in Source::ALL {
		if !handled.contains(&source) {
			candidate.extend_from_previous(previous_by_source.get(&source));
		}
	}

	let records = candidate.into_records();

	check_drop_rate(previous.len(), records.len(), max_drop_rate)?;

	let previous_by_id: HashMap<&str, &Cctv> = previous.iter().map(|c| (c.id.as_str(), c)).collect();
	let new_ids: HashSet<&str> = records.iter().map(|c| c.id.as_str()).collect();

	let added = new_ids.iter().filter(|id| !previous_by_id.contains_key(*id)).count();
	let removed = previous_by_id.keys().filter(|id| !new_ids.contains(*id)).count();
	let updated = records.iter()
		.filter(|new| previous_by_id.get(new.id.as_str()).is_some_and(|old| has_changed(old, new)))
		.count();

	Ok(Reconciliation { records, added, removed, updated, carried_over })
}

fn has_changed(old: &Cctv, new: &Cctv) -> bool {
	old.url != new.url
		|| old.name != new.name
		|| coord_moved(old.lat, new.lat)
		|| coord_moved(old.lng, new.lng)
}

fn coord_moved(old: f64, new: f64) -> bool {
	match (old.is_finite(), new.is_finite()) {
		(true, true) => (old - new).abs() > COORD_EPSILON,
		(false, false) => false,
		_ => true,
	}
}

/// Insertion-ordered list where a later record with the same id replaces the
/// earlier one in place.
#[derive(Default)]
struct CandidateList {
	records: CctvList,
	index: HashMap<String, usize>,
}

impl CandidateList {
	fn push(&mut self, cctv: Cctv) {
		match self.index.get(&cctv.id) {
			Some(&pos) => self.records[pos] = cctv,
			None => {
				self.index.insert(cctv.id.clone(), self.records.len());
				self.records.push(cctv);
			}
		}
	}

	fn extend(&mut self, records: CctvList) {
		for cctv in records {
			self.push(cctv);
		}
	}

	fn extend_from_previous(&mut self, records: Option<&Vec<&Cctv>>) {
		for cctv in records.into_iter().flatten() {
			self.push((*cctv).clone());
		}
	}

	fn into_records(self) -> CctvList {
		self.records
	}
}
