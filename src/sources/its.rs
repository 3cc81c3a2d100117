//! National ITS open API (tagged NTIC in snapshots).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::common::{coord_from_value, Cctv, CctvList, Source, Status};
use crate::config::ItsConfig;
use crate::http::FetchClient;
use crate::snapshot;
use crate::sources::{extract_items, field_text};



const RESPONSE_PATHS: &[&[&str]] = &[&["response", "data"], &["data"]];

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq)]
pub struct BoundingBox {
	pub min_lng: f64,
	pub max_lng: f64,
	pub min_lat: f64,
	pub max_lat: f64,
}

/// Covers all of South Korea, sea included.
pub const NATIONWIDE: BoundingBox = BoundingBox { min_lng: 124.0, max_lng: 132.0, min_lat: 33.0, max_lat: 43.0 };

#[derive(Debug)]
pub struct Region {
	pub name: &'static str,
	pub bounds: BoundingBox,
}

/// Mainland regions scanned by the grid collector, drawn tight to skip open sea.
pub const REGIONS: [Region; 6] = [
	Region { name: "수도권", bounds: BoundingBox { min_lat: 37.0, max_lat: 38.0, min_lng: 126.5, max_lng: 127.5 } },
	Region { name: "강원도", bounds: BoundingBox { min_lat: 37.0, max_lat: 38.5, min_lng: 127.5, max_lng: 129.5 } },
	Region { name: "충청도", bounds: BoundingBox { min_lat: 36.0, max_lat: 37.0, min_lng: 126.5, max_lng: 128.0 } },
	Region { name: "경상도", bounds: BoundingBox { min_lat: 35.0, max_lat: 37.0, min_lng: 128.0, max_lng: 130.0 } },
	Region { name: "전라도", bounds: BoundingBox { min_lat: 34.5, max_lat: 36.0, min_lng: 126.0, max_lng: 128.0 } },
	Region { name: "제주도", bounds: BoundingBox { min_lat: 33.0, max_lat: 34.0, min_lng: 126.0, max_lng: 127.0 } },
];

impl BoundingBox {
	/// Splits the box into `step`-degree cells, row by row from the south-west corner.
	pub fn cells(&self, step: f64) -> Vec<BoundingBox> {
		let lat_steps = ((self.max_lat - self.min_lat) / step).round() as usize;
		let lng_steps = ((self.max_lng - self.min_lng) / step).round() as usize;

		let mut cells = Vec::with_capacity(lat_steps * lng_steps);
		for i in 0..lat_steps {
			let lat = self.min_lat + i as f64 * step;
			for j in 0..lng_steps {
				let lng = self.min_lng + j as f64 * step;
				cells.push(BoundingBox { min_lng: lng, max_lng: lng + step, min_lat: lat, max_lat: lat + step });
			}
		}
		cells
	}
}

pub struct ItsSource {
	client: FetchClient,
	config: ItsConfig,
}

impl ItsSource {
	pub fn new(config: &ItsConfig) -> anyhow::Result<Self> {
		Ok(ItsSource {
			client: FetchClient::new(Source::Ntic.tag(), config.timeout())?,
			config: config.clone(),
		})
	}

	#[cfg(test)]
	fn with_client(config: &ItsConfig, client: FetchClient) -> Self {
		ItsSource { client, config: config.clone() }
	}

	/// Raw camera items inside one bounding box (live video only).
	pub async fn query(&self, bbox: &BoundingBox) -> anyhow::Result<Vec<Value>> {
		let query = [
			("apiKey", self.config.api_key.clone()),
			("type", "all".to_string()),
			("cctvType", "1".to_string()),
			("minX", format!("{:.6}", bbox.min_lng)),
			("maxX", format!("{:.6}", bbox.max_lng)),
			("minY", format!("{:.6}", bbox.min_lat)),
			("maxY", format!("{:.6}", bbox.max_lat)),
			("getType", "json".to_string()),
		];

		let body = self.client.get_json(|http| http.get(&self.config.api_url).query(&query)).await?;
		Ok(extract_items(&body, RESPONSE_PATHS).to_vec())
	}

	/// Every live camera in the country in a single request.
	pub async fn fetch_nationwide(&self) -> anyhow::Result<CctvList> {
		let items = self.query(&NATIONWIDE).await?;
		let records: CctvList = items.iter().filter_map(normalize_feed_item).collect();
		info!("Fetched {} entries from ITS ({} raw)", records.len(), items.len());
		Ok(records)
	}
}

/// Maps an item from a nationwide query. Items without a stream URL or
/// coordinates are dropped. Ids follow `NTIC_<name>_<lng>`.
pub fn normalize_feed_item(item: &Value) -> Option<Cctv> {
	let url = field_text(item, "cctvurl")?;
	let lng = item.get("coordx").and_then(coord_from_value).filter(|v| *v != 0.0)?;
	let lat = item.get("coordy").and_then(coord_from_value).filter(|v| *v != 0.0)?;
	let name = field_text(item, "cctvname").unwrap_or_else(|| "Unknown".to_string());

	Some(Cctv {
		id: format!("NTIC_{}_{:?}", name, lng),
		name,
		lat,
		lng,
		url,
		source: Source::Ntic,
		status: Status::Active,
	})
}

/// Maps an item from a grid-cell query. Prefers the upstream id, falling back
/// to one derived from name and raw longitude; only positive coordinates pass.
pub fn normalize_grid_item(item: &Value) -> Option<Cctv> {
	let id = field_text(item, "cctvid")
		.or_else(|| field_text(item, "id"))
		.or_else(|| {
			let name = field_text(item, "cctvname")?;
			let lng = field_text(item, "coordx").unwrap_or_else(|| "None".to_string());
			Some(format!("NTIC_{}_{}", name, lng))
		})?;

	let lat = item.get("coordy").map_or(Some(0.0), coord_from_value)?;
	let lng = item.get("coordx").map_or(Some(0.0), coord_from_value)?;
	if lat <= 0.0 || lng <= 0.0 {
		return None;
	}

	Some(Cctv {
		id,
		name: field_text(item, "cctvname").unwrap_or_else(|| "Unknown".to_string()),
		lat,
		lng,
		url: field_text(item, "cctvurl").unwrap_or_default(),
		source: Source::Ntic,
		status: Status::Active,
	})
}



/// Accumulates one nationwide grid scan. Owns the seen-id set and results for
/// the lifetime of a single run.
pub struct GridCollector<'a> {
	source: &'a ItsSource,
	seen: HashSet<String>,
	records: CctvList,
	cells_scanned: usize,
	errors: usize,
	last_saved: usize,
}

#[derive(Debug)]
pub struct GridSummary {
	pub cells_scanned: usize,
	pub errors: usize,
}

impl<'a> GridCollector<'a> {
	pub fn new(source: &'a ItsSource) -> Self {
		GridCollector {
			source,
			seen: HashSet::new(),
			records: CctvList::new(),
			cells_scanned: 0,
			errors: 0,
			last_saved: 0,
		}
	}

	/// Adds the not-yet-seen cameras among `items`, returning how many were new.
	pub fn absorb(&mut self, items: &[Value]) -> usize {
		let before = self.records.len();
		for cctv in items.iter().filter_map(normalize_grid_item) {
			if self.seen.insert(cctv.id.clone()) {
				self.records.push(cctv);
			}
		}
		self.records.len() - before
	}

	async fn scan_cell(&mut self, cell: &BoundingBox) {
		self.cells_scanned += 1;
		match self.source.query(cell).await {
			Ok(items) => {
				self.absorb(&items);
			},
			Err(err) => {
				self.errors += 1;
				warn!("Cell {:.1},{:.1} failed: {:#}", cell.min_lat, cell.min_lng, err);
			}
		}
	}

	/// Scans every cell of every region, pausing between requests. When
	/// `autosave` is given, the results so far are written there each time
	/// enough new cameras have been found.
	pub async fn run(mut self, regions: &[Region], autosave: Option<&Path>) -> anyhow::Result<(CctvList, GridSummary)> {
		let step = self.source.config.grid_step;
		let delay = Duration::from_millis(self.source.config.cell_delay_ms);
		let autosave_every = self.source.config.autosave_every.max(1);

		let total: usize = regions.iter().map(|r| r.bounds.cells(step).len()).sum();
		info!("Scanning {} grid cells across {} regions", total, regions.len());

		for region in regions {
			info!("[{}] scanning", region.name);
			for cell in region.bounds.cells(step) {
				self.scan_cell(&cell).await;

				if self.cells_scanned % 50 == 0 {
					info!(
						"{:5.1}% | cameras: {} | errors: {}",
						self.cells_scanned as f64 * 100.0 / total as f64,
						self.records.len(),
						self.errors,
					);
				}

				if let Some(path) = autosave {
					if self.records.len() - self.last_saved >= autosave_every {
						snapshot::write(path, &self.records).await?;
						self.last_saved = self.records.len();
					}
				}

				if !delay.is_zero() {
					tokio::time::sleep(delay).await;
				}
			}
		}

		let summary = GridSummary { cells_scanned: self.cells_scanned, errors: self.errors };
		Ok((self.records, summary))
	}
}



#[cfg(test)]
mod tests {
	use super::*;
	use httpmock::prelude::*;
	use serde_json::json;

	fn test_config(api_url: String) -> ItsConfig {
		ItsConfig {
			api_url,
			api_key: "test-key".to_string(),
			cell_delay_ms: 0,
			grid_step: 0.5,
			autosave_every: 2,
			..ItsConfig::default()
		}
	}

	fn test_source(config: &ItsConfig) -> ItsSource {
		let client = FetchClient::builder("NTIC", config.timeout())
			.retry_backoff(Duration::ZERO)
			.build()
			.unwrap();
		ItsSource::with_client(config, client)
	}

	#[test]
	fn feed_items_need_url_and_coordinates() {
		let ok = json!({ "cctvname": "[경부선] 서울", "cctvurl": "http://cctv/1.m3u8", "coordx": 127.02, "coordy": "37.49" });
		let cctv = normalize_feed_item(&ok).unwrap();
		assert_eq!(cctv.id, "NTIC_[경부선] 서울_127.02");
		assert_eq!(cctv.lat, 37.49);
		assert_eq!(cctv.source, Source::Ntic);
		assert_eq!(cctv.status, Status::Active);

		assert!(normalize_feed_item(&json!({ "cctvname": "a", "coordx": 127.0, "coordy": 37.0 })).is_none());
		assert!(normalize_feed_item(&json!({ "cctvurl": "u", "coordx": 0, "coordy": 37.0 })).is_none());
		assert!(normalize_feed_item(&json!({ "cctvurl": "u", "coordx": "x", "coordy": 37.0 })).is_none());

		let unnamed = normalize_feed_item(&json!({ "cctvurl": "u", "coordx": 127.0, "coordy": 37.0 })).unwrap();
		assert_eq!(unnamed.name, "Unknown");
		assert_eq!(unnamed.id, "NTIC_Unknown_127.0");
	}

	#[test]
	fn grid_items_prefer_upstream_ids_and_positive_coordinates() {
		let with_id = json!({ "cctvid": "C1", "cctvname": "a", "coordx": "127.1", "coordy": "37.1" });
		assert_eq!(normalize_grid_item(&with_id).unwrap().id, "C1");

		let derived = json!({ "cctvname": "a", "coordx": "127.1", "coordy": "37.1" });
		assert_eq!(normalize_grid_item(&derived).unwrap().id, "NTIC_a_127.1");

		assert!(normalize_grid_item(&json!({ "cctvid": "C2", "coordy": 37.0 })).is_none());
		assert!(normalize_grid_item(&json!({ "coordx": 127.0, "coordy": 37.0 })).is_none());
	}

	#[test]
	fn cells_tile_the_box() {
		let region = &REGIONS[5];
		let cells = region.bounds.cells(0.1);
		assert_eq!(cells.len(), 10 * 10);
		assert_eq!(cells[0].min_lat, 33.0);
		assert_eq!(cells[0].min_lng, 126.0);
		assert!((cells[99].max_lat - 34.0).abs() < 1e-9);
		assert!((cells[99].max_lng - 127.0).abs() < 1e-9);
	}

	#[test]
	fn absorb_skips_ids_already_seen() {
		let config = test_config("http://unused".to_string());
		let source = test_source(&config);
		let mut collector = GridCollector::new(&source);

		let items = vec![
			json!({ "cctvid": "A", "coordx": 127.0, "coordy": 37.0 }),
			json!({ "cctvid": "B", "coordx": 127.1, "coordy": 37.1 }),
		];
		assert_eq!(collector.absorb(&items), 2);
		assert_eq!(collector.absorb(&items[..1]), 0);
		assert_eq!(collector.records.len(), 2);
	}

	#[tokio::test]
	async fn fetch_nationwide_sends_the_bounding_box() {
		let server = MockServer::start_async().await;
		let mock = server.mock_async(|when, then| {
			when.method(GET)
				.path("/cctvInfo")
				.query_param("apiKey", "test-key")
				.query_param("cctvType", "1")
				.query_param("minX", "124.000000")
				.query_param("maxY", "43.000000");
			then.status(200).json_body(json!({
				"response": {
					"data": [
						{ "cctvname": "a", "cctvurl": "http://a", "coordx": 127.0, "coordy": 37.0 },
						{ "cctvname": "b", "coordx": 128.0, "coordy": 36.0 },
					]
				}
			}));
		}).await;

		let config = test_config(server.url("/cctvInfo"));
		let records = test_source(&config).fetch_nationwide().await.unwrap();

		mock.assert_async().await;
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].url, "http://a");
	}

	#[tokio::test]
	async fn grid_run_collects_deduplicates_and_autosaves() {
		let server = MockServer::start_async().await;
		server.mock_async(|when, then| {
			when.method(GET).path("/cctvInfo");
			then.status(200).json_body(json!({
				"data": [
					{ "cctvid": "A", "cctvname": "a", "cctvurl": "http://a", "coordx": 126.2, "coordy": 33.2 },
					{ "cctvid": "B", "cctvname": "b", "cctvurl": "http://b", "coordx": 126.7, "coordy": 33.7 },
				]
			}));
		}).await;

		let dir = tempfile::tempdir().unwrap();
		let autosave = dir.path().join("ntic_data.json");
		let config = test_config(server.url("/cctvInfo"));
		let source = test_source(&config);

		let (records, summary) = GridCollector::new(&source)
			.run(&REGIONS[5..], Some(autosave.as_path()))
			.await
			.unwrap();

		assert_eq!(summary.cells_scanned, 4);
		assert_eq!(summary.errors, 0);
		assert_eq!(records.len(), 2);
		assert_eq!(snapshot::load(&autosave).await.len(), 2);
	}

	#[tokio::test]
	async fn grid_run_counts_failed_cells() {
		let server = MockServer::start_async().await;
		server.mock_async(|when, then| {
			when.method(GET).path("/cctvInfo");
			then.status(500);
		}).await;

		let config = test_config(server.url("/cctvInfo"));
		let source = test_source(&config);
		let (records, summary) = GridCollector::new(&source).run(&REGIONS[5..], None).await.unwrap();

		assert!(records.is_empty());
		assert_eq!(summary.errors, 4);
	}
}
