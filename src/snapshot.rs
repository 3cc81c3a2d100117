use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use log::{error, info, warn};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::common::{Cctv, CctvList};



/// A snapshot as found on disk.
#[derive(Debug, Default)]
pub struct Snapshot {
	pub records: CctvList,
	/// Entries that could not be read as cameras and were left out of `records`.
	pub skipped: usize,
}

impl Snapshot {
	/// Entries in the file, whether they could be read or not.
	pub fn entries(&self) -> usize {
		self.records.len() + self.skipped
	}
}

/// Reads a snapshot strictly. A missing file is an empty snapshot (first run).
/// A file that can't be read, or isn't a JSON array, is an error. Single
/// entries that don't parse are skipped and counted.
pub async fn read(path: &Path) -> anyhow::Result<Snapshot> {
	let bytes = match tokio::fs::read(path).await {
		Ok(bytes) => bytes,
		Err(err) if err.kind() == ErrorKind::NotFound => {
			info!("No snapshot at {} yet", path.display());
			return Ok(Snapshot::default());
		},
		Err(err) => {
			return Err(err).with_context(|| format!("reading {}", path.display()));
		}
	};

	let entries: Vec<Value> = serde_json::from_slice(&bytes)
		.with_context(|| format!("parsing {}", path.display()))?;

	let mut snapshot = Snapshot::default();
	for (i, entry) in entries.into_iter().enumerate() {
		match serde_json::from_value::<Cctv>(entry) {
			Ok(cctv) => snapshot.records.push(cctv),
			Err(err) => {
				warn!("Skipping entry {} of {}: {}", i, path.display(), err);
				snapshot.skipped += 1;
			}
		}
	}
	Ok(snapshot)
}

/// Reads a snapshot for display. Anything [`read`] rejects is logged and
/// yields an empty list.
pub async fn load(path: &Path) -> CctvList {
	match read(path).await {
		Ok(snapshot) => snapshot.records,
		Err(err) => {
			error!("Failed to load snapshot; error was {:#}", err);
			CctvList::new()
		}
	}
}

/// Replaces the snapshot with `records`: indented JSON, UTF-8, non-ASCII kept as-is.
pub async fn write(path: &Path, records: &CctvList) -> anyhow::Result<()> {
	let json = serde_json::to_vec_pretty(records)?;

	let file = tokio::fs::File::create(path).await
		.with_context(|| format!("creating {}", path.display()))?;
	let mut writer = tokio::io::BufWriter::new(file);
	writer.write_all(&json).await?;
	writer.flush().await?;

	info!("Wrote {} records to {}", records.len(), path.display());
	Ok(())
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::common::{Source, Status};

	fn sample() -> CctvList {
		vec![Cctv {
			id: "NTIC_강남역_127.0276".to_string(),
			name: "강남역".to_string(),
			lat: 37.4979,
			lng: 127.0276,
			url: "http://cctv/1.m3u8".to_string(),
			source: Source::Ntic,
			status: Status::Active,
		}]
	}

	#[tokio::test]
	async fn missing_file_loads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		assert!(load(&dir.path().join("nope.json")).await.is_empty());
	}

	#[tokio::test]
	async fn missing_file_reads_as_an_empty_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let snapshot = read(&dir.path().join("nope.json")).await.unwrap();
		assert_eq!(snapshot.entries(), 0);
	}

	#[tokio::test]
	async fn corrupt_file_is_an_error_but_loads_as_empty() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		std::fs::write(&path, "{ not json").unwrap();

		assert!(read(&path).await.is_err());
		assert!(load(&path).await.is_empty());
	}

	#[tokio::test]
	async fn unreadable_entries_are_skipped_one_by_one() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");
		std::fs::write(&path, r#"[
			{ "id": "n1", "lat": 37.0, "lng": 127.0, "source": "NTIC", "status": "active" },
			{ "id": "L1", "name": "untagged", "lat": 37.1, "lng": 127.1, "url": "", "status": "active" },
			{ "name": "no id", "source": "NTIC" },
			{ "id": "x", "source": "KMA" }
		]"#).unwrap();

		let snapshot = read(&path).await.unwrap();

		let ids: Vec<&str> = snapshot.records.iter().map(|c| c.id.as_str()).collect();
		assert_eq!(ids, vec!["n1", "L1"]);
		assert_eq!(snapshot.records[1].source, Source::Utic);
		assert_eq!(snapshot.skipped, 2);
		assert_eq!(snapshot.entries(), 4);
	}

	#[tokio::test]
	async fn written_file_is_indented_and_keeps_hangul() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cctv_data.json");

		write(&path, &sample()).await.unwrap();

		let text = std::fs::read_to_string(&path).unwrap();
		assert!(text.starts_with("[\n  {\n    \"id\""), "{}", text);
		assert!(text.contains("\"name\": \"강남역\""));
		assert!(text.contains("\"source\": \"NTIC\""));
		assert!(text.contains("\"status\": \"active\""));
		assert_eq!(load(&path).await, sample());
	}
}
