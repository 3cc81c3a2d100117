//! Upstream camera feeds. Each source maps its own JSON shape onto [`Cctv`](crate::common::Cctv).

use serde_json::Value;

pub mod its;
pub mod utic;



/// Reads a field as text. Upstream mixes strings and numbers for the same field;
/// null, missing and empty all read as `None`.
pub fn field_text(record: &Value, key: &str) -> Option<String> {
	match record.get(key)? {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

/// Finds the record list in a response body: either the body itself is an array,
/// or the array sits under one of `paths` (each a chain of object keys), tried in order.
pub fn extract_items<'a>(body: &'a Value, paths: &[&[&str]]) -> &'a [Value] {
	if let Value::Array(items) = body {
		return items;
	}

	for path in paths {
		let found = path.iter().try_fold(body, |node, key| node.get(key));
		if let Some(Value::Array(items)) = found {
			if !items.is_empty() {
				return items;
			}
		}
	}
	&[]
}



#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn field_text_reads_strings_and_numbers() {
		let record = json!({ "CH": 2, "ID": "abc", "PORT": "", "PASSWD": null });
		assert_eq!(field_text(&record, "CH").as_deref(), Some("2"));
		assert_eq!(field_text(&record, "ID").as_deref(), Some("abc"));
		assert_eq!(field_text(&record, "PORT"), None);
		assert_eq!(field_text(&record, "PASSWD"), None);
		assert_eq!(field_text(&record, "KIND"), None);
	}

	#[test]
	fn extract_items_follows_wrappers_in_order() {
		let paths: &[&[&str]] = &[&["response", "data"], &["data"]];

		let nested = json!({ "response": { "data": [1, 2] }, "data": [3] });
		assert_eq!(extract_items(&nested, paths).len(), 2);

		let flat = json!({ "response": { "data": [] }, "data": [3] });
		assert_eq!(extract_items(&flat, paths), &[json!(3)]);

		let bare = json!([1, 2, 3]);
		assert_eq!(extract_items(&bare, paths).len(), 3);

		assert!(extract_items(&json!({ "error": "nope" }), paths).is_empty());
	}
}
