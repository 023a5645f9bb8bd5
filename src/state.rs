//! Singer state: per-stream bookmarks carried between runs.
//!
//! ```json
//! {"bookmarks": {"sales_report": {"start_date": "2023-05-02T00:00:00Z"}}}
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::config::parse_timestamp;
use crate::error::TapError;
use crate::streams::DATE_FORMAT;

const BOOKMARKS: &str = "bookmarks";
const BOOKMARK_KEY: &str = "start_date";

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    value: Map<String, Value>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        let mut value = Map::new();
        value.insert(BOOKMARKS.to_string(), json!({}));
        Self { value }
    }

    pub fn load(path: &Path) -> Result<Self, TapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TapError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(&raw)
            .map_err(|source| TapError::InvalidDocument { what: "state", source })?;
        Self::from_value(value)
    }

    /// Keys other than `bookmarks` are kept and written back unchanged.
    pub fn from_value(value: Value) -> Result<Self, TapError> {
        let mut value = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(TapError::InvalidState(format!(
                    "expected an object, got {}",
                    other
                )));
            }
        };
        match value.get(BOOKMARKS) {
            None | Some(Value::Null) => {
                value.insert(BOOKMARKS.to_string(), json!({}));
            }
            Some(Value::Object(_)) => {}
            Some(other) => {
                return Err(TapError::InvalidState(format!(
                    "`bookmarks` must be an object, got {}",
                    other
                )));
            }
        }
        Ok(Self { value })
    }

    pub fn bookmark(&self, stream: &str) -> Result<Option<DateTime<Utc>>, TapError> {
        let raw = self
            .value
            .get(BOOKMARKS)
            .and_then(|b| b.get(stream))
            .and_then(|s| s.get(BOOKMARK_KEY));
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => parse_timestamp(s).map(Some).ok_or_else(|| {
                TapError::InvalidState(format!("bookmark for `{}` is not a timestamp: {}", stream, s))
            }),
            Some(other) => Err(TapError::InvalidState(format!(
                "bookmark for `{}` is not a string: {}",
                stream, other
            ))),
        }
    }

    /// Move the stream's bookmark forward to `ts`. Earlier values are ignored.
    ///
    /// Returns whether the bookmark changed.
    pub fn advance_bookmark(&mut self, stream: &str, ts: DateTime<Utc>) -> Result<bool, TapError> {
        if let Some(current) = self.bookmark(stream)?
            && current >= ts
        {
            return Ok(false);
        }

        let bookmarks = self
            .value
            .entry(BOOKMARKS)
            .or_insert_with(|| json!({}));
        if let Value::Object(bookmarks) = bookmarks {
            let entry = bookmarks
                .entry(stream)
                .or_insert_with(|| json!({}));
            if !entry.is_object() {
                *entry = json!({});
            }
            if let Value::Object(entry) = entry {
                entry.insert(
                    BOOKMARK_KEY.to_string(),
                    Value::String(ts.format(DATE_FORMAT).to_string()),
                );
            }
        }
        Ok(true)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.value.clone())
    }
}
