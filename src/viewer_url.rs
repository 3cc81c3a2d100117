use serde_json::Value;

use crate::sources::field_text;



pub const UTIC_STREAM_PAGE: &str = "https://www.utic.go.kr/jsp/map/openDataCctvStream.jsp";

/// Flood-control authorities that host their own viewer, keyed by the marker
/// that appears in the camera id.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum RiverAuthority {
	Nakdong,
	Han,
	Geum,
	Yeongsan,
}

impl RiverAuthority {
	// Checked in this order.
	const MARKERS: [(&'static str, RiverAuthority); 4] = [
		("E61", RiverAuthority::Nakdong),
		("E60", RiverAuthority::Han),
		("E62", RiverAuthority::Geum),
		("E63", RiverAuthority::Yeongsan),
	];

	pub fn for_id(cctv_id: &str) -> Option<RiverAuthority> {
		Self::MARKERS.iter()
			.find(|(marker, _)| cctv_id.contains(marker))
			.map(|(_, authority)| *authority)
	}

	fn viewer_url(&self, station_id: &str, passwd: &str) -> String {
		match self {
			RiverAuthority::Nakdong => format!("https://www.nakdongriver.go.kr/sumun/popup/cctvView.do?Obscd={}", station_id),
			RiverAuthority::Han => format!("https://hrfco.go.kr/sumun/cctvPopup.do?Obscd={}", station_id),
			RiverAuthority::Geum => format!("https://www.geumriver.go.kr/html/sumun/rtmpView.jsp?wlobscd={}&cctvcd={}", passwd, station_id),
			RiverAuthority::Yeongsan => format!("https://www.yeongsanriver.go.kr/sumun/videoDetail.do?wlobscd={}", passwd),
		}
	}
}

/// Stream parameters for one UTIC camera, as reported by the upstream detail record.
#[derive(Clone)]
#[derive(Debug, Default)]
pub struct StreamParams {
	pub name: String,
	pub kind: Option<String>,
	pub ip: Option<String>,
	pub channel: Option<String>,
	pub login_id: Option<String>,
	pub passwd: Option<String>,
	pub port: Option<String>,
}

impl StreamParams {
	/// Pulls the stream fields out of a UTIC record (`CCTVNAME`, `KIND`, `CCTVIP`, `CH`, `ID`, `PASSWD`, `PORT`).
	pub fn from_record(record: &Value) -> StreamParams {
		StreamParams {
			name: field_text(record, "CCTVNAME").unwrap_or_default(),
			kind: field_text(record, "KIND"),
			ip: field_text(record, "CCTVIP"),
			channel: field_text(record, "CH"),
			login_id: field_text(record, "ID"),
			passwd: field_text(record, "PASSWD"),
			port: field_text(record, "PORT"),
		}
	}
}

/// Encodes a camera name the way the UTIC web client does before putting it in a
/// query string: percent-encode, then encode the result again. `/` stays literal
/// in both passes and a space ends up as `%2520`. The stream page decodes twice,
/// so this must not be "fixed".
pub fn double_encode(name: &str) -> String {
	encode_keeping_slash(&encode_keeping_slash(name))
}

// `%` is always escaped, so `%2F` in the output can only have come from `/`.
fn encode_keeping_slash(text: &str) -> String {
	urlencoding::encode(text).replace("%2F", "/")
}

/// Builds the viewer deep link for a UTIC camera. `stream_page` is the UTIC
/// player page used for every camera not run by a river authority.
pub fn viewer_url(stream_page: &str, api_key: &str, cctv_id: &str, params: &StreamParams) -> String {
	if let Some(authority) = RiverAuthority::for_id(cctv_id) {
		return authority.viewer_url(
			params.login_id.as_deref().unwrap_or(""),
			params.passwd.as_deref().unwrap_or(""),
		);
	}

	let or_null = |v: &Option<String>| v.clone().unwrap_or_else(|| "null".to_string());

	format!(
		"{}?key={}&cctvid={}&cctvName={}&kind={}&cctvip={}&cctvch={}&id={}&cctvpasswd={}&cctvport={}",
		stream_page,
		api_key,
		cctv_id,
		double_encode(&params.name),
		params.kind.as_deref().unwrap_or(""),
		params.ip.as_deref().unwrap_or(""),
		or_null(&params.channel),
		or_null(&params.login_id),
		or_null(&params.passwd),
		or_null(&params.port),
	)
}
