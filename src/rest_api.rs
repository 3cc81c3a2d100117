use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::RwLock;

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::{json, Json, Value};
use rocket::State;

use log::{error, info};

use crate::common::Cctv;
use crate::common::CctvList;
use crate::common::CctvMap;
use crate::snapshot;



/// Cameras as last read from the snapshot, in file order, plus an id index.
pub struct CctvState {
	path: PathBuf,
	list: CctvList,
	by_id: CctvMap,
}

impl CctvState {
	pub async fn load(path: PathBuf) -> Self {
		let list = snapshot::load(&path).await;
		let by_id = index(&list);
		CctvState { path, list, by_id }
	}

	/// Swaps in the snapshot on disk. On failure the cameras already served are kept.
	async fn reload(&mut self) -> anyhow::Result<()> {
		let snapshot = snapshot::read(&self.path).await?;
		self.list = snapshot.records;
		self.by_id = index(&self.list);
		info!("Reloaded {} cameras from {}", self.list.len(), self.path.display());
		Ok(())
	}
}

fn index(list: &CctvList) -> CctvMap {
	list.iter().map(|cctv| (cctv.id.clone(), cctv.clone())).collect()
}

#[derive(Debug)]
#[derive(Serialize, Deserialize)]
pub struct Stats {
	pub total: usize,
	pub by_status: BTreeMap<String, usize>,
	pub by_source: BTreeMap<String, usize>,
}



#[get("/")]
async fn list_cctvs(state: &State<RwLock<CctvState>>) -> Json<CctvList> {
	let cctvs = state.read().await;
	Json(cctvs.list.clone())
}

#[get("/stats")]
async fn stats(state: &State<RwLock<CctvState>>) -> Json<Stats> {
	let cctvs = state.read().await;
	let mut by_status = BTreeMap::new();
	let mut by_source = BTreeMap::new();
	for cctv in &cctvs.list {
		*by_status.entry(cctv.status.as_str().to_string()).or_insert(0) += 1;
		*by_source.entry(cctv.source.tag().to_string()).or_insert(0) += 1;
	}
	Json(Stats { total: cctvs.list.len(), by_status, by_source })
}

#[get("/<id>", rank = 2)]
async fn get_cctv(id: &str, state: &State<RwLock<CctvState>>) -> Option<Json<Cctv>> {
	let cctvs = state.read().await;
	cctvs.by_id.get(id).map(|cctv| {
		Json(cctv.clone())
	})
}

#[post("/reload")]
async fn reload(state: &State<RwLock<CctvState>>) -> Result<Json<Value>, status::Custom<Json<Value>>> {
	let mut cctvs = state.write().await;
	match cctvs.reload().await {
		Ok(()) => Ok(Json(json!({
			"status": "ok",
			"count": cctvs.list.len(),
		}))),
		Err(err) => {
			error!("Reload failed, still serving {} cameras; error was {:#}", cctvs.list.len(), err);
			Err(status::Custom(Status::InternalServerError, Json(json!({
				"status": "error",
				"reason": format!("{:#}", err),
				"count": cctvs.list.len(),
			}))))
		}
	}
}

#[catch(404)]
fn not_found() -> Value {
	json!({
		"status": "error",
		"reason": "Resource was not found."
	})
}



pub fn stage(snapshot_path: PathBuf) -> rocket::fairing::AdHoc {
	rocket::fairing::AdHoc::on_ignite("CCTV snapshot", |rocket| async move {
		let cctvs = CctvState::load(snapshot_path).await;

		// tokio's RwLock so readers never block each other and a pending reload
		// is not starved by a stream of new readers.
		let cctvs_lock = RwLock::new(cctvs);

		rocket
			.manage(cctvs_lock)
			.register("/", catchers![not_found])
			.mount("/v0/cctvs", routes![list_cctvs, stats, get_cctv, reload])
	})
}
