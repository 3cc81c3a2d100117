use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer};



pub type CctvId = String;
pub type CctvList = Vec<Cctv>;
pub type CctvMap = HashMap<CctvId, Cctv>;

#[derive(Clone)]
#[derive(Debug)]
#[derive(PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Cctv {
	pub id: CctvId,
	#[serde(default)]
	pub name: String,
	#[serde(default = "missing_coord", deserialize_with = "lenient_coord")]
	pub lat: f64,
	#[serde(default = "missing_coord", deserialize_with = "lenient_coord")]
	pub lng: f64,
	#[serde(default)]
	pub url: String,
	#[serde(default = "untagged_source")]
	pub source: Source,
	#[serde(default)]
	pub status: Status,
}

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum Source {
	#[serde(rename = "NTIC")]
	Ntic,
	#[serde(rename = "UTIC")]
	Utic,
}

impl Source {
	pub const ALL: [Source; 2] = [Source::Ntic, Source::Utic];

	pub fn tag(&self) -> &'static str {
		match self {
			Source::Ntic => "NTIC",
			Source::Utic => "UTIC",
		}
	}
}

impl fmt::Display for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

#[derive(Clone, Copy)]
#[derive(Debug, Default)]
#[derive(PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	Active,
	Error,
	#[default]
	#[serde(other)]
	Unknown,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Active => "active",
			Status::Error => "error",
			Status::Unknown => "unknown",
		}
	}
}

impl Cctv {
	/// True when both coordinates are usable numbers.
	pub fn has_coords(&self) -> bool {
		self.lat.is_finite() && self.lng.is_finite()
	}
}



// The id-based UTIC collector wrote its snapshots before records carried a source.
fn untagged_source() -> Source {
	Source::Utic
}

fn missing_coord() -> f64 {
	f64::NAN
}

/// Reads a coordinate from a JSON number or a numeric string.
/// Anything else (null, empty, garbage) becomes NaN and is written back as `null`.
fn lenient_coord<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
	D: Deserializer<'de>,
{
	let value = serde_json::Value::deserialize(deserializer)?;
	Ok(coord_from_value(&value).unwrap_or(f64::NAN))
}

/// Parses an upstream coordinate field, which may arrive as a number or a string.
pub fn coord_from_value(value: &serde_json::Value) -> Option<f64> {
	match value {
		serde_json::Value::Number(n) => n.as_f64(),
		serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
		_ => None,
	}.filter(|v| v.is_finite())
}
