//! Singer messages and the line-delimited writer that emits them.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::TapError;
use crate::streams::DATE_FORMAT;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bookmark_properties: Option<Vec<String>>,
    },
    Record {
        stream: String,
        record: Map<String, Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_extracted: Option<String>,
    },
    State {
        value: Value,
    },
}

impl Message {
    pub fn record(stream: &str, record: Map<String, Value>, time_extracted: DateTime<Utc>) -> Self {
        Self::Record {
            stream: stream.to_string(),
            record,
            time_extracted: Some(time_extracted.format(DATE_FORMAT).to_string()),
        }
    }
}

/// Writes one JSON message per line and flushes after each.
pub struct MessageWriter<W: Write> {
    out: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write(&mut self, message: &Message) -> Result<(), TapError> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
