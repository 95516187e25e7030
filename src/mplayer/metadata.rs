//! Track metadata decoded from the `metadata` property.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Payload MPlayer reports when a file carries no metadata.
const NO_METADATA: &str = "(null)";

/// Track metadata. Every field is `None` when the engine reports nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  pub title: Option<String>,
  pub artist: Option<String>,
  pub album: Option<String>,
  pub year: Option<i32>,
  pub comment: Option<String>,
  pub track: Option<i32>,
  pub genre: Option<String>,
}

/// Parse alternating keys and values: `key1,value1,key2,value2`.
///
/// Keys are lowercased, values trimmed. A trailing key without a value maps
/// to an empty string.
pub fn parse_key_value_list(data: &str) -> HashMap<String, String> {
  let items: Vec<&str> = data.split(',').collect();
  items
    .chunks(2)
    .map(|pair| {
      let value = pair.get(1).map(|v| v.trim()).unwrap_or_default();
      (pair[0].to_lowercase(), value.to_string())
    })
    .collect()
}

impl Metadata {
  /// Decode the raw `ANS_metadata=` payload.
  pub fn parse(data: &str) -> Self {
    if data.trim() == NO_METADATA {
      return Self::default();
    }

    let mut raw = parse_key_value_list(data);
    let number = |value: Option<String>| value.and_then(|v| v.parse().ok());

    Self {
      title: raw.remove("title"),
      artist: raw.remove("artist"),
      album: raw.remove("album"),
      year: number(raw.remove("year")),
      comment: raw.remove("comment"),
      track: number(raw.remove("track")),
      genre: raw.remove("genre"),
    }
  }
}
