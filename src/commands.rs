use std::path::Path;

use anyhow::Context;
use log::{error, info, warn};

use crate::common::{CctvList, Source};
use crate::config::Config;
use crate::dedup;
use crate::reconcile::{check_drop_rate, reconcile, Reconciliation};
use crate::snapshot;
use crate::sources::its::{GridCollector, ItsSource, REGIONS};
use crate::sources::utic::UticSource;



/// Fetches both sources and folds them into the main snapshot.
/// Fails without touching the snapshot when the drop-rate guard trips.
pub async fn update(config: &Config) -> anyhow::Result<()> {
	info!("Starting CCTV data update");

	let its = ItsSource::new(&config.its)?;
	let utic = UticSource::new(&config.utic)?;

	let ntic_records = records_or_empty(Source::Ntic, its.fetch_nationwide().await);
	let utic_records = records_or_empty(Source::Utic, utic.fetch_feed().await);

	if ntic_records.is_empty() && utic_records.is_empty() {
		warn!("Failed to fetch data from both sources; leaving {} as it is", config.paths.snapshot.display());
		return Ok(());
	}

	let fresh = vec![(Source::Ntic, ntic_records), (Source::Utic, utic_records)];
	let result = update_snapshot(&config.paths.snapshot, fresh, config.update.max_drop_rate).await?;

	println!("Summary:");
	println!("  Total entries: {}", result.records.len());
	println!("  Added: {}", result.added);
	println!("  Updated: {}", result.updated);
	println!("  Removed: {}", result.removed);
	for source in &result.carried_over {
		println!("  {}: fetch failed, previous entries kept", source);
	}
	Ok(())
}

/// Reconciles `fresh` against the snapshot at `path` and writes the result back.
/// A snapshot that exists but can't be read is never overwritten, and entries
/// that had to be skipped still count as previous records for the guard.
pub async fn update_snapshot(path: &Path, fresh: Vec<(Source, CctvList)>, max_drop_rate: f64) -> anyhow::Result<Reconciliation> {
	let previous = snapshot::read(path).await
		.with_context(|| format!("refusing to update {}", path.display()))?;
	info!("Loaded {} existing records from {}", previous.records.len(), path.display());
	if previous.skipped > 0 {
		warn!("{} entries in {} could not be read", previous.skipped, path.display());
	}

	let checked = reconcile(&previous.records, fresh, max_drop_rate)
		.and_then(|result| {
			check_drop_rate(previous.entries(), result.records.len(), max_drop_rate)?;
			Ok(result)
		});
	let result = match checked {
		Ok(result) => result,
		Err(err) => {
			error!("{}", err);
			return Err(err.into());
		}
	};

	snapshot::write(path, &result.records).await?;
	Ok(result)
}

fn records_or_empty(source: Source, fetched: anyhow::Result<CctvList>) -> CctvList {
	match fetched {
		Ok(records) => records,
		Err(err) => {
			error!("Error fetching {} data: {:#}", source, err);
			CctvList::new()
		}
	}
}

/// Folds the main snapshot into the NTIC scan, skipping cameras the scan already covers.
pub async fn merge(config: &Config) -> anyhow::Result<()> {
	let utic = snapshot::load(&config.paths.snapshot).await;
	let ntic = snapshot::load(&config.paths.ntic_snapshot).await;
	println!("UTIC: {}, NTIC: {}", utic.len(), ntic.len());

	let outcome = dedup::merge_by_proximity(ntic, Source::Ntic, utic, Source::Utic, config.merge.duplicate_radius_m);

	println!("Merged Total: {}", outcome.records.len());
	println!("Added UTIC: {}, Skipped UTIC (Duplicate): {}", outcome.added, outcome.skipped);

	snapshot::write(&config.paths.snapshot, &outcome.records).await
}

/// Scans the country cell by cell into the NTIC snapshot.
pub async fn collect_ntic(config: &Config) -> anyhow::Result<()> {
	let its = ItsSource::new(&config.its)?;
	let path = &config.paths.ntic_snapshot;

	let (records, summary) = GridCollector::new(&its).run(&REGIONS, Some(path.as_path())).await?;

	println!("Collection finished");
	println!("  Cells scanned: {}", summary.cells_scanned);
	println!("  Total CCTV: {}", records.len());
	println!("  Errors: {}", summary.errors);

	snapshot::write(path, &records).await
}

/// Rebuilds the main snapshot from the UTIC guide page, checking each viewer link.
pub async fn collect_utic(config: &Config) -> anyhow::Result<()> {
	let utic = UticSource::new(&config.utic)?;
	let (records, summary) = utic.collect_by_ids().await?;

	println!("Summary: {} active, {} error/unreachable", summary.active, summary.error);
	println!("  Ids found: {}, lookups failed: {}", summary.ids_found, summary.failed_lookups);

	snapshot::write(&config.paths.snapshot, &records).await
}

/// Prints the NTIC camera nearest to a point.
pub async fn closest(config: &Config, lat: f64, lng: f64) -> anyhow::Result<()> {
	let records = snapshot::load(&config.paths.ntic_snapshot).await;

	match dedup::closest(&records, lat, lng) {
		Some((cctv, dist)) => {
			println!("Closest CCTV to ({}, {}):", lat, lng);
			println!("Name: {}", cctv.name);
			println!("Distance: {:.2} meters", dist);
			println!("URL: {}", cctv.url);
		},
		None => println!("No CCTVs found."),
	}
	Ok(())
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::common::{Cctv, Status};
	use crate::reconcile::ReconcileError;

	fn many(prefix: &str, n: usize, source: Source) -> CctvList {
		(0..n).map(|i| Cctv {
			id: format!("{}{}", prefix, i),
			name: String::new(),
			lat: 37.0 + i as f64 * 0.001,
			lng: 127.0,
			url: String::new(),
			source,
			status: Status::Active,
		}).collect()
	}

	#[tokio::test]
	async fn tripped_guard_leaves_the_file_alone() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		snapshot::write(&path, &many("n", 1000, Source::Ntic)).await.unwrap();
		let before = std::fs::read(&path).unwrap();

		let err = update_snapshot(&path, vec![(Source::Ntic, many("n", 750, Source::Ntic))], 0.2)
			.await
			.unwrap_err();

		assert!(err.downcast_ref::<ReconcileError>().is_some());
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[tokio::test]
	async fn untagged_legacy_record_keeps_the_guard_armed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		let mut on_disk = serde_json::to_value(many("n", 1000, Source::Ntic)).unwrap();
		on_disk.as_array_mut().unwrap().push(serde_json::json!({
			"id": "L1",
			"name": "legacy",
			"lat": 37.5,
			"lng": 127.0,
			"url": "http://legacy",
			"status": "active",
		}));
		std::fs::write(&path, serde_json::to_vec_pretty(&on_disk).unwrap()).unwrap();
		let before = std::fs::read(&path).unwrap();

		let err = update_snapshot(&path, vec![(Source::Ntic, many("n", 10, Source::Ntic))], 0.2)
			.await
			.unwrap_err();

		assert!(err.downcast_ref::<ReconcileError>().is_some());
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[tokio::test]
	async fn unparseable_snapshot_is_never_overwritten() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		std::fs::write(&path, "[{ \"id\": \"n0\", truncated").unwrap();
		let before = std::fs::read(&path).unwrap();

		let result = update_snapshot(&path, vec![(Source::Ntic, many("n", 10, Source::Ntic))], 0.2).await;

		assert!(result.is_err());
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[tokio::test]
	async fn skipped_entries_count_towards_the_guard() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		let mut on_disk = serde_json::to_value(many("n", 700, Source::Ntic)).unwrap();
		for i in 0..300 {
			on_disk.as_array_mut().unwrap().push(serde_json::json!({ "id": format!("k{}", i), "source": "KMA" }));
		}
		std::fs::write(&path, serde_json::to_vec(&on_disk).unwrap()).unwrap();
		let before = std::fs::read(&path).unwrap();

		let err = update_snapshot(&path, vec![(Source::Ntic, many("n", 700, Source::Ntic))], 0.2)
			.await
			.unwrap_err();

		assert!(err.downcast_ref::<ReconcileError>().is_some());
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[tokio::test]
	async fn acceptable_drop_overwrites_the_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		snapshot::write(&path, &many("n", 1000, Source::Ntic)).await.unwrap();

		let result = update_snapshot(&path, vec![(Source::Ntic, many("n", 850, Source::Ntic))], 0.2)
			.await
			.unwrap();

		assert_eq!(result.removed, 150);
		assert_eq!(snapshot::load(&path).await.len(), 850);
	}

	#[tokio::test]
	async fn first_run_writes_whatever_was_fetched() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");

		let fresh = vec![(Source::Ntic, many("n", 2, Source::Ntic)), (Source::Utic, CctvList::new())];
		let result = update_snapshot(&path, fresh, 0.2).await.unwrap();

		assert_eq!(result.added, 2);
		assert_eq!(snapshot::load(&path).await.len(), 2);
	}

	#[tokio::test]
	async fn merge_writes_deduplicated_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = Config::default();
		config.paths.snapshot = dir.path().join("cctv_data.json");
		config.paths.ntic_snapshot = dir.path().join("ntic_data.json");

		let ntic = many("n", 2, Source::Ntic);
		let mut utic = many("u", 2, Source::Utic);
		// u0 sits on top of n0; u1 is far away.
		utic[1].lat = 35.0;
		snapshot::write(&config.paths.ntic_snapshot, &ntic).await.unwrap();
		snapshot::write(&config.paths.snapshot, &utic).await.unwrap();

		merge(&config).await.unwrap();

		let merged = snapshot::load(&config.paths.snapshot).await;
		let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
		assert_eq!(ids, vec!["n0", "n1", "u1"]);
	}
}
