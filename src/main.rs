#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::{Request, Response};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;

mod commands;
mod common;
mod config;
mod dedup;
mod geo;
mod http;
mod reconcile;
mod rest_api;
mod snapshot;
mod sources;
mod viewer_url;

use config::{Config, ConfigManager};



// The map viewer is served from elsewhere, so it needs CORS to read from this server.
pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
	fn info(&self) -> Info {
		Info {
			name: "Let the map viewer read snapshot routes cross-origin",
			kind: Kind::Response
		}
	}

	async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
		response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
		// The snapshot is read-only over HTTP; POST is only there for /reload.
		response.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
		response.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type"));
	}
}

fn cli() -> Command {
	Command::new("cctv-scraper")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Collects Korean public CCTV camera metadata into a JSON snapshot.")
		.arg(
			Arg::new("config")
				.action(ArgAction::Append)	// Allow argument to be specified multiple times
				.short('c')
				.long("config")
				.global(true)
				.help("TOML file with scraper config")
		)
		.subcommand_required(true)
		.subcommand(Command::new("update").about("Fetch both sources and update the snapshot, guarding against mass data loss"))
		.subcommand(Command::new("merge").about("Merge the NTIC scan with the snapshot, dropping cameras within the duplicate radius"))
		.subcommand(Command::new("collect-ntic").about("Scan the country grid cell by cell into the NTIC snapshot"))
		.subcommand(Command::new("collect-utic").about("Rebuild the snapshot from the UTIC guide page, checking every viewer link"))
		.subcommand(
			Command::new("closest")
				.about("Print the NTIC camera nearest to a point")
				.arg(Arg::new("lat").required(true).allow_negative_numbers(true).value_parser(clap::value_parser!(f64)))
				.arg(Arg::new("lng").required(true).allow_negative_numbers(true).value_parser(clap::value_parser!(f64)))
		)
		.subcommand(Command::new("serve").about("Serve the snapshot over HTTP for the map viewer"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
	let mut config_manager = ConfigManager::new();
	let config_filename_matches = matches.get_many::<String>("config");
	match config_filename_matches {
		Some(filenames) => {
			config_manager.read_config(filenames.map(|v| v.as_str()).collect())?;
		},
		None => {
			// Use default file path
			config_manager.read_default_config_files()?;
		}
	};
	config_manager.config()
}

async fn serve(config: Config) -> anyhow::Result<()> {
	let figment = rocket::Config::figment()
		.merge(("address", config.server.address.clone()))
		.merge(("port", config.server.port));

	rocket::custom(figment)
		.attach(rest_api::stage(config.paths.snapshot.clone()))
		.attach(CORS)
		.launch()
		.await?;

	anyhow::Ok(())
}


#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = cli().get_matches();

	// Rocket sets up its own logger when serving.
	if !matches!(matches.subcommand_name(), Some("serve")) {
		env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	}

	let (name, sub) = matches.subcommand().ok_or_else(|| anyhow::anyhow!("no subcommand given"))?;
	// Global args are filled in on the subcommand whichever side of it they were given.
	let config = load_config(sub)?;

	match name {
		"update" => commands::update(&config).await,
		"merge" => commands::merge(&config).await,
		"collect-ntic" => commands::collect_ntic(&config).await,
		"collect-utic" => commands::collect_utic(&config).await,
		"closest" => {
			let lat = *sub.get_one::<f64>("lat").ok_or_else(|| anyhow::anyhow!("missing latitude"))?;
			let lng = *sub.get_one::<f64>("lng").ok_or_else(|| anyhow::anyhow!("missing longitude"))?;
			commands::closest(&config, lat, lng).await
		},
		"serve" => serve(config).await,
		other => anyhow::bail!("unknown subcommand {}", other),
	}
}
