use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::{debug, info};



const DEFAULT_CONFIG_FILES: [&str; 2] = ["/etc/cctv-scraper/config.toml", "cctv-scraper.toml"];

pub const ITS_API_KEY_ENV: &str = "CCTV_ITS_API_KEY";
pub const UTIC_API_KEY_ENV: &str = "CCTV_UTIC_API_KEY";

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
	pub its: ItsConfig,
	pub utic: UticConfig,
	pub paths: PathsConfig,
	pub update: UpdateConfig,
	pub merge: MergeConfig,
	pub server: ServerConfig,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct ItsConfig {
	pub api_url: String,
	pub api_key: String,
	pub timeout_secs: u64,
	/// Pause between grid cells during a nationwide scan.
	pub cell_delay_ms: u64,
	/// Grid cell size in degrees.
	pub grid_step: f64,
	/// Rewrite the NTIC snapshot every time this many new cameras are found during a scan.
	pub autosave_every: usize,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct UticConfig {
	pub feed_url: String,
	pub guide_url: String,
	pub details_url: String,
	/// Player page the generated viewer links point at.
	pub stream_page_url: String,
	pub api_key: String,
	pub timeout_secs: u64,
	pub accept_invalid_certs: bool,
	pub request_delay_ms: u64,
	pub probe_timeout_secs: u64,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct PathsConfig {
	/// Main snapshot, updated in place by `update`, `merge` and `collect-utic`.
	pub snapshot: PathBuf,
	/// Output of the nationwide NTIC grid scan.
	pub ntic_snapshot: PathBuf,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
	pub max_drop_rate: f64,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct MergeConfig {
	pub duplicate_radius_m: f64,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	pub address: String,
	pub port: u16,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			its: ItsConfig::default(),
			utic: UticConfig::default(),
			paths: PathsConfig::default(),
			update: UpdateConfig::default(),
			merge: MergeConfig::default(),
			server: ServerConfig::default(),
		}
	}
}

impl Default for ItsConfig {
	fn default() -> Self {
		ItsConfig {
			api_url: "https://openapi.its.go.kr:9443/cctvInfo".to_string(),
			api_key: String::new(),
			timeout_secs: 30,
			cell_delay_ms: 80,
			grid_step: 0.1,
			autosave_every: 1000,
		}
	}
}

impl Default for UticConfig {
	fn default() -> Self {
		UticConfig {
			feed_url: "https://www.utic.go.kr/map/mapcctv.do".to_string(),
			guide_url: "https://www.utic.go.kr/guide/cctvOpenData.do".to_string(),
			details_url: "https://www.utic.go.kr/map/getCctvInfoById.do".to_string(),
			stream_page_url: crate::viewer_url::UTIC_STREAM_PAGE.to_string(),
			api_key: String::new(),
			timeout_secs: 60,
			accept_invalid_certs: true,
			request_delay_ms: 200,
			probe_timeout_secs: 3,
		}
	}
}

impl Default for PathsConfig {
	fn default() -> Self {
		PathsConfig {
			snapshot: PathBuf::from("cctv_data.json"),
			ntic_snapshot: PathBuf::from("ntic_data.json"),
		}
	}
}

impl Default for UpdateConfig {
	fn default() -> Self {
		UpdateConfig { max_drop_rate: 0.2 }
	}
}

impl Default for MergeConfig {
	fn default() -> Self {
		MergeConfig { duplicate_radius_m: crate::dedup::DEFAULT_DUPLICATE_RADIUS_M }
	}
}

impl Default for ServerConfig {
	fn default() -> Self {
		ServerConfig {
			address: "127.0.0.1".to_string(),
			port: 8000,
		}
	}
}

impl ItsConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

impl UticConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// The guide page doubles as the referer the UTIC endpoints insist on.
	pub fn referer(&self) -> anyhow::Result<String> {
		let url = url::Url::parse_with_params(&self.guide_url, &[("key", &self.api_key)])
			.with_context(|| format!("invalid UTIC guide url {:?}", self.guide_url))?;
		Ok(url.into())
	}
}



/// Collects settings from one or more TOML files, later files overriding earlier ones.
#[derive(Clone)]
#[derive(Debug, Default)]
pub struct ConfigManager {
	merged: toml::Table,
}

impl ConfigManager {
	pub fn new() -> Self {
		ConfigManager::default()
	}

	/// Reads every listed file. A missing or malformed file is an error.
	pub fn read_config(&mut self, filenames: Vec<&str>) -> anyhow::Result<()> {
		for filename in filenames {
			self.read_file(Path::new(filename))?;
		}
		Ok(())
	}

	/// Reads whichever of the default config locations exist.
	pub fn read_default_config_files(&mut self) -> anyhow::Result<()> {
		for filename in DEFAULT_CONFIG_FILES {
			let path = Path::new(filename);
			if path.exists() {
				self.read_file(path)?;
			} else {
				debug!("No config file at {}", filename);
			}
		}
		Ok(())
	}

	fn read_file(&mut self, path: &Path) -> anyhow::Result<()> {
		let text = fs::read_to_string(path)
			.with_context(|| format!("reading config file {}", path.display()))?;
		let table: toml::Table = toml::from_str(&text)
			.with_context(|| format!("parsing config file {}", path.display()))?;
		merge_tables(&mut self.merged, table);
		info!("Loaded config from {}", path.display());
		Ok(())
	}

	/// Resolves the final settings: defaults, then files, then API keys from the environment.
	pub fn config(&self) -> anyhow::Result<Config> {
		let mut config: Config = toml::Value::Table(self.merged.clone())
			.try_into()
			.context("invalid configuration")?;

		if let Ok(key) = env::var(ITS_API_KEY_ENV) {
			config.its.api_key = key;
		}
		if let Ok(key) = env::var(UTIC_API_KEY_ENV) {
			config.utic.api_key = key;
		}
		Ok(config)
	}
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
	for (key, value) in overlay {
		match (base.get_mut(&key), value) {
			(Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
				merge_tables(existing, incoming);
			},
			(_, value) => {
				base.insert(key, value);
			}
		}
	}
}
