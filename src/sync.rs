//! Incremental extraction of the selected report streams.
//!
//! A stream is read one report period at a time, from its bookmark up to the
//! last period that has fully elapsed. Every downloaded report becomes RECORD
//! messages followed by a STATE message with the advanced bookmark.

use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::client::ReportSource;
use crate::config::TapConfig;
use crate::error::TapError;
use crate::message::{Message, MessageWriter};
use crate::report::parse_report;
use crate::state::State;
use crate::streams::{self, DATE_FORMAT, Granularity, KEY_PROPERTIES, StreamDef};
use crate::transform::Transformer;
use crate::types::ReportOutcome;

/// Run-wide inputs that do not change between streams.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub vendor: String,
    pub start_date: DateTime<Utc>,
    pub lookback_days: u32,
    /// Run start. Periods ending after this are not requested.
    pub extraction_time: DateTime<Utc>,
}

impl SyncSettings {
    pub fn from_config(config: &TapConfig, extraction_time: DateTime<Utc>) -> Self {
        Self {
            vendor: config.vendor.clone(),
            start_date: config.start_date,
            lookback_days: config.lookback_days,
            extraction_time,
        }
    }
}

/// Records emitted for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub stream: String,
    pub records: u64,
    pub reports: u64,
    pub unavailable: u64,
}

/// How long after a period ends Apple may still publish its report. A report
/// still missing after this is treated as empty and the bookmark moves past it.
fn publication_delay(granularity: Granularity) -> Duration {
    match granularity {
        Granularity::Daily => Duration::days(2),
        Granularity::Monthly => Duration::days(45),
    }
}

/// Sync every selected stream in catalog order and return the final state.
pub async fn sync<S, W>(
    source: &S,
    settings: &SyncSettings,
    catalog: &Catalog,
    mut state: State,
    writer: &mut MessageWriter<W>,
) -> Result<(State, Vec<StreamSummary>), TapError>
where
    S: ReportSource + ?Sized,
    W: Write,
{
    let mut summaries = Vec::new();

    for entry in catalog.selected_streams() {
        let Some(stream) = streams::find(&entry.tap_stream_id) else {
            warn!(stream = %entry.tap_stream_id, "Skipping unknown stream");
            continue;
        };
        info!(stream = stream.name, "Starting sync");
        let summary = sync_stream(source, settings, stream, entry, &mut state, writer).await?;
        summaries.push(summary);
    }

    info!("------------------");
    for summary in &summaries {
        info!(
            "{}: {} records from {} reports ({} unavailable)",
            summary.stream, summary.records, summary.reports, summary.unavailable
        );
    }
    info!("------------------");

    Ok((state, summaries))
}

/// First period to request: the later of `start_date` and the bookmark,
/// aligned to the stream's granularity and clamped to the lookback window.
pub fn first_period(
    stream: &StreamDef,
    settings: &SyncSettings,
    bookmark: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let start = match bookmark {
        Some(bookmark) if bookmark > settings.start_date => bookmark,
        _ => settings.start_date,
    };
    let period = stream.granularity.align(start);

    if stream.granularity == Granularity::Daily {
        let floor = settings
            .extraction_time
            .checked_sub_signed(Duration::days(i64::from(settings.lookback_days)))
            .and_then(|ts| ts.date_naive().and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());
        if let Some(floor) = floor
            && period < floor
        {
            info!(
                stream = stream.name,
                requested = %period.format(DATE_FORMAT),
                floor = %floor.format(DATE_FORMAT),
                "Daily reports are only kept for {} days, starting later",
                settings.lookback_days
            );
            return floor;
        }
    }
    period
}

async fn sync_stream<S, W>(
    source: &S,
    settings: &SyncSettings,
    stream: &StreamDef,
    entry: &CatalogEntry,
    state: &mut State,
    writer: &mut MessageWriter<W>,
) -> Result<StreamSummary, TapError>
where
    S: ReportSource + ?Sized,
    W: Write,
{
    let mut summary = StreamSummary {
        stream: stream.name.to_string(),
        records: 0,
        reports: 0,
        unavailable: 0,
    };

    writer.write(&Message::Schema {
        stream: stream.name.to_string(),
        schema: entry.schema.clone(),
        key_properties: entry.key_properties.clone(),
        bookmark_properties: None,
    })?;

    let mut transformer = Transformer::new(stream.name, &entry.schema)?;
    let granularity = stream.granularity;
    let mut period = first_period(stream, settings, state.bookmark(stream.name)?);
    state.advance_bookmark(stream.name, period)?;

    while granularity.next(period) <= settings.extraction_time {
        let next = granularity.next(period);
        let report_date = granularity.report_date(period);
        info!("Requesting Appstore data for: {} on {}", stream.name, report_date);

        let request = stream.request(period, &settings.vendor);
        match source.fetch_report(&request).await? {
            ReportOutcome::Report(body) => {
                let rows = parse_report(stream.name, &body)?;
                for (index, row) in rows.into_iter().enumerate() {
                    let record = build_record(index + 1, &report_date, settings, row);
                    let record = transformer.transform(record)?;
                    writer.write(&Message::record(
                        stream.name,
                        record,
                        settings.extraction_time,
                    ))?;
                    summary.records += 1;
                }
                summary.reports += 1;
                state.advance_bookmark(stream.name, next)?;
                writer.write(&Message::State {
                    value: state.to_value(),
                })?;
            }
            ReportOutcome::Unavailable { status, message } if status != 404 => {
                return Err(TapError::Api {
                    status,
                    message: format!("{} on {}: {}", stream.name, report_date, message),
                });
            }
            ReportOutcome::Unavailable { message, .. } => {
                summary.unavailable += 1;
                info!(stream = stream.name, report_date = %report_date, "No report: {}", message);
                let settled = next
                    .checked_add_signed(publication_delay(granularity))
                    .is_some_and(|settled| settled <= settings.extraction_time);
                if settled && state.advance_bookmark(stream.name, next)? {
                    writer.write(&Message::State {
                        value: state.to_value(),
                    })?;
                }
            }
        }
        period = next;
    }

    let dropped: Vec<&str> = transformer.dropped_fields().collect();
    if !dropped.is_empty() {
        warn!(stream = stream.name, "Report columns missing from schema were dropped: {}", dropped.join(", "));
    }

    writer.write(&Message::State {
        value: state.to_value(),
    })?;
    Ok(summary)
}

/// Row cells plus the synthetic columns. Cells never override key properties.
fn build_record(
    line_id: usize,
    report_date: &str,
    settings: &SyncSettings,
    row: Map<String, Value>,
) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("_line_id".into(), Value::from(line_id as u64));
    record.insert(
        "_time_extracted".into(),
        Value::String(settings.extraction_time.format(DATE_FORMAT).to_string()),
    );
    record.insert("_api_report_date".into(), Value::String(report_date.to_string()));
    record.insert("vendor_number".into(), Value::String(settings.vendor.clone()));

    for (column, cell) in row {
        if KEY_PROPERTIES.contains(&column.as_str()) {
            continue;
        }
        record.insert(column, cell);
    }
    record
}
