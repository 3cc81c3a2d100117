//! Municipal UTIC traffic centre. Two ways in: the bulk map feed, and a
//! per-camera detail lookup driven by ids scraped off the open-data guide page.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::common::{coord_from_value, Cctv, CctvList, Source, Status};
use crate::config::UticConfig;
use crate::http::FetchClient;
use crate::sources::{extract_items, field_text};
use crate::viewer_url::{viewer_url, StreamParams};



const FEED_PATHS: &[&[&str]] = &[&["result"], &["data"]];
const SEOUL_KIND: &str = "Seoul";

pub struct UticSource {
	client: FetchClient,
	config: UticConfig,
}

#[derive(Debug, Default)]
pub struct CollectSummary {
	pub ids_found: usize,
	pub active: usize,
	pub error: usize,
	pub failed_lookups: usize,
}

impl UticSource {
	pub fn new(config: &UticConfig) -> anyhow::Result<Self> {
		let client = FetchClient::builder(Source::Utic.tag(), config.timeout())
			.referer(config.referer()?)
			.accept_invalid_certs(config.accept_invalid_certs)
			.build()?;
		Ok(UticSource { client, config: config.clone() })
	}

	#[cfg(test)]
	fn with_client(config: &UticConfig, client: FetchClient) -> Self {
		UticSource { client, config: config.clone() }
	}

	/// The whole camera feed in one request.
	pub async fn fetch_feed(&self) -> anyhow::Result<CctvList> {
		let body = self.client.get_json(|http| http.get(&self.config.feed_url)).await?;
		let items = extract_items(&body, FEED_PATHS);
		if items.is_empty() {
			info!("No data found in UTIC response");
			return Ok(CctvList::new());
		}

		let records: CctvList = items.iter()
			.filter_map(|item| normalize_feed_item(item, &self.config))
			.collect();
		info!("Fetched {} entries from UTIC ({} raw)", records.len(), items.len());
		Ok(records)
	}

	/// Camera ids linked from the open-data guide page, first occurrence order.
	pub async fn scrape_ids(&self) -> anyhow::Result<Vec<String>> {
		let referer = self.config.referer()?;
		let page = self.client.get_text(|http| http.get(&referer)).await
			.context("fetching UTIC guide page")?;
		let ids = extract_ids(&page);
		info!("Found {} CCTV ids", ids.len());
		Ok(ids)
	}

	pub async fn fetch_details(&self, cctv_id: &str) -> anyhow::Result<Value> {
		self.client.get_json(|http| http.get(&self.config.details_url).query(&[("cctvId", cctv_id)])).await
	}

	/// Looks up every id on the guide page, builds its viewer link and checks
	/// whether the link answers. Ids whose lookup fails are skipped.
	pub async fn collect_by_ids(&self) -> anyhow::Result<(CctvList, CollectSummary)> {
		let ids = self.scrape_ids().await?;
		let delay = Duration::from_millis(self.config.request_delay_ms);
		let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);

		let mut summary = CollectSummary { ids_found: ids.len(), ..CollectSummary::default() };
		let mut records = CctvList::new();

		for (i, cctv_id) in ids.iter().enumerate() {
			match self.fetch_details(cctv_id).await {
				Ok(details) if details.is_object() => {
					let mut cctv = normalize_details(cctv_id, &details, &self.config);
					cctv.status = self.client.probe(&cctv.url, probe_timeout).await;
					info!("Checked {}: {}", cctv_id, cctv.status.as_str());
					match cctv.status {
						Status::Active => summary.active += 1,
						Status::Error => summary.error += 1,
						Status::Unknown => {},
					}
					records.push(cctv);
				},
				Ok(_) => {
					summary.failed_lookups += 1;
					warn!("No details returned for {}", cctv_id);
				},
				Err(err) => {
					summary.failed_lookups += 1;
					warn!("Error fetching details for {}: {:#}", cctv_id, err);
				}
			}

			if (i + 1) % 10 == 0 {
				info!("Processed {}/{}", i + 1, ids.len());
			}
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
		}

		Ok((records, summary))
	}
}

/// Pulls `javascript:test('<id>')` markers out of the guide page, without duplicates.
pub fn extract_ids(page: &str) -> Vec<String> {
	static ID_LINK: Lazy<Regex> = Lazy::new(|| {
		Regex::new(r"javascript:test\('([^']+)'\)").expect("id link regex")
	});

	let mut seen = HashSet::new();
	ID_LINK.captures_iter(page)
		.filter_map(|caps| caps.get(1))
		.map(|id| id.as_str())
		.filter(|id| seen.insert(*id))
		.map(str::to_string)
		.collect()
}

/// Maps one feed item. Items without an id, or with coordinates that are
/// present but not numeric, are dropped; absent coordinates read as zero.
pub fn normalize_feed_item(item: &Value, config: &UticConfig) -> Option<Cctv> {
	let cctv_id = field_text(item, "CCTVID")?;
	let lng = feed_coord(item, "XCOORD")?;
	let lat = feed_coord(item, "YCOORD")?;

	let mut params = StreamParams::from_record(item);
	let in_seoul = field_text(item, "CENTERNAME").is_some_and(|center| center.contains("서울"));
	if in_seoul || cctv_id.starts_with("L01") {
		params.kind = Some(SEOUL_KIND.to_string());
	}

	Some(Cctv {
		url: viewer_url(&config.stream_page_url, &config.api_key, &cctv_id, &params),
		id: cctv_id,
		name: params.name,
		lat,
		lng,
		source: Source::Utic,
		status: Status::Active,
	})
}

fn feed_coord(item: &Value, key: &str) -> Option<f64> {
	match item.get(key) {
		None => Some(0.0),
		Some(value) => coord_from_value(value),
	}
}

/// Maps a per-id detail record. Coordinates are kept as-is, so a camera
/// without them still shows up (with `null` coordinates) in the snapshot.
pub fn normalize_details(cctv_id: &str, details: &Value, config: &UticConfig) -> Cctv {
	let params = StreamParams::from_record(details);
	let coord = |key: &str| details.get(key).and_then(coord_from_value).unwrap_or(f64::NAN);

	Cctv {
		id: cctv_id.to_string(),
		url: viewer_url(&config.stream_page_url, &config.api_key, cctv_id, &params),
		name: params.name,
		lat: coord("YCOORD"),
		lng: coord("XCOORD"),
		source: Source::Utic,
		status: Status::Unknown,
	}
}
