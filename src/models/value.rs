//! Cell values exchanged with the engine.
//!
//! Bind lists arrive as `serde_json` values, which is how message-passing
//! callers represent dynamic data. Result rows leave as [`Value`] cells.

use serde::Serialize;
use serde_json::Value as Json;

/// Object key marking a hex-encoded blob inside a bind list.
pub const BLOB_KEY: &str = "blob";

/// A single engine cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text (invalid sequences are replaced).
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// A column type code the engine should never report.
    Unrecognized(i32),
}

impl Value {
    /// Maps one element of a bind list onto an engine value.
    ///
    /// | JSON | Engine value |
    /// |------|--------------|
    /// | `null` | `NULL` |
    /// | `true` / `false` | `1` / `0` |
    /// | integer within `i64` | `INTEGER` |
    /// | any other number | `REAL` |
    /// | string | `TEXT` |
    /// | `{"blob": "<hex>"}` | `BLOB` |
    ///
    /// Returns `None` for any other shape, including malformed hex.
    #[must_use]
    pub fn from_bind(json: &Json) -> Option<Self> {
        match json {
            Json::Null => Some(Self::Null),
            Json::Bool(b) => Some(Self::Integer(i64::from(*b))),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Real)),
            Json::String(s) => Some(Self::Text(s.clone())),
            Json::Object(map) if map.len() == 1 => map
                .get(BLOB_KEY)
                .and_then(Json::as_str)
                .and_then(|encoded| hex::decode(encoded).ok())
                .map(Self::Blob),
            Json::Object(_) | Json::Array(_) => None,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}
