//! Singer catalog documents.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TapError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub stream: String,
    pub tap_stream_id: String,
    pub schema: Value,
    #[serde(default)]
    pub key_properties: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataEntry {
    pub breadcrumb: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, TapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TapError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| TapError::InvalidDocument {
            what: "catalog",
            source,
        })
    }

    pub fn selected_streams(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.streams.iter().filter(|entry| entry.is_selected())
    }

    /// Mark every stream as selected.
    pub fn select_all(&mut self) {
        for entry in &mut self.streams {
            entry
                .root_metadata_mut()
                .insert("selected".to_string(), Value::Bool(true));
        }
    }
}

impl CatalogEntry {
    /// Metadata attached to the stream itself (empty breadcrumb).
    pub fn root_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .iter()
            .find(|m| m.breadcrumb.is_empty())
            .map(|m| &m.metadata)
    }

    fn root_metadata_mut(&mut self) -> &mut Map<String, Value> {
        let index = match self.metadata.iter().position(|m| m.breadcrumb.is_empty()) {
            Some(index) => index,
            None => {
                self.metadata.insert(
                    0,
                    MetadataEntry {
                        breadcrumb: Vec::new(),
                        metadata: Map::new(),
                    },
                );
                0
            }
        };
        &mut self.metadata[index].metadata
    }

    /// Selected via root metadata, or via the legacy `selected` flag on the schema.
    pub fn is_selected(&self) -> bool {
        let from_metadata = self
            .root_metadata()
            .and_then(|m| m.get("selected"))
            .and_then(Value::as_bool);
        match from_metadata {
            Some(selected) => selected,
            None => self
                .schema
                .get("selected")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}
