use serde_json::{Map, Value, json};
use tracing::info;

use crate::catalog::{Catalog, CatalogEntry, MetadataEntry};
use crate::error::TapError;
use crate::streams::{KEY_PROPERTIES, STREAMS, StreamDef};

/// Build the catalog of every report stream.
///
/// Discovery is offline: the stream list and schemas are bundled with the tap.
pub fn discover() -> Result<Catalog, TapError> {
    info!("Running discover");
    let streams = STREAMS
        .iter()
        .map(catalog_entry)
        .collect::<Result<Vec<_>, _>>()?;
    info!(streams = streams.len(), "Completed discover");
    Ok(Catalog { streams })
}

fn catalog_entry(stream: &StreamDef) -> Result<CatalogEntry, TapError> {
    let schema = stream.schema()?;
    let key_properties: Vec<String> = KEY_PROPERTIES.iter().map(|k| k.to_string()).collect();
    let metadata = standard_metadata(&schema, &key_properties);

    Ok(CatalogEntry {
        stream: stream.name.to_string(),
        tap_stream_id: stream.name.to_string(),
        schema,
        key_properties,
        metadata,
    })
}

fn standard_metadata(schema: &Value, key_properties: &[String]) -> Vec<MetadataEntry> {
    let mut root = Map::new();
    root.insert("inclusion".into(), json!("available"));
    root.insert("table-key-properties".into(), json!(key_properties));
    root.insert("forced-replication-method".into(), json!("INCREMENTAL"));
    root.insert("valid-replication-keys".into(), json!(["_api_report_date"]));

    let mut entries = vec![MetadataEntry {
        breadcrumb: Vec::new(),
        metadata: root,
    }];

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for field in properties.keys() {
            let inclusion = if key_properties.iter().any(|k| k == field) {
                "automatic"
            } else {
                "available"
            };
            let mut metadata = Map::new();
            metadata.insert("inclusion".into(), json!(inclusion));
            entries.push(MetadataEntry {
                breadcrumb: vec!["properties".to_string(), field.clone()],
                metadata,
            });
        }
    }

    entries
}
