//! Report streams.
//!
//! Each stream maps to one App Store Connect report type. Sales and Trends
//! reports are requested one day at a time, finance reports one fiscal month
//! at a time.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde_json::Value;

use crate::error::TapError;
use crate::types::{ReportEndpoint, ReportRequest};

/// Columns every record carries that identify its row.
pub const KEY_PROPERTIES: [&str; 3] = ["_line_id", "_time_extracted", "_api_report_date"];

/// Bookmark and `_time_extracted` format.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    /// First period that contains `ts`.
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => ts,
            Self::Monthly => Utc
                .with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(ts),
        }
    }

    pub fn next(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => ts + Duration::days(1),
            Self::Monthly => ts
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Value for `filter[reportDate]`.
    pub fn report_date(&self, ts: DateTime<Utc>) -> String {
        match self {
            Self::Daily => ts.format("%Y-%m-%d").to_string(),
            Self::Monthly => ts.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug)]
pub struct StreamDef {
    pub name: &'static str,
    pub endpoint: ReportEndpoint,
    pub report_type: &'static str,
    /// Sales and Trends only.
    pub report_sub_type: Option<&'static str>,
    /// Sales and Trends only.
    pub version: Option<&'static str>,
    pub granularity: Granularity,
    schema_json: &'static str,
}

const fn sales(
    name: &'static str,
    report_type: &'static str,
    report_sub_type: &'static str,
    version: &'static str,
    schema_json: &'static str,
) -> StreamDef {
    StreamDef {
        name,
        endpoint: ReportEndpoint::SalesReports,
        report_type,
        report_sub_type: Some(report_sub_type),
        version: Some(version),
        granularity: Granularity::Daily,
        schema_json,
    }
}

pub static STREAMS: [StreamDef; 8] = [
    sales(
        "subscription_event_report",
        "SUBSCRIPTION_EVENT",
        "SUMMARY",
        "1_3",
        include_str!("../schemas/subscription_event_report.json"),
    ),
    sales(
        "subscriber_report",
        "SUBSCRIBER",
        "DETAILED",
        "1_3",
        include_str!("../schemas/subscriber_report.json"),
    ),
    sales(
        "subscription_report",
        "SUBSCRIPTION",
        "SUMMARY",
        "1_3",
        include_str!("../schemas/subscription_report.json"),
    ),
    sales(
        "sales_report",
        "SALES",
        "SUMMARY",
        "1_0",
        include_str!("../schemas/sales_report.json"),
    ),
    sales(
        "subscription_offer_code_redemption_report",
        "SUBSCRIPTION_OFFER_CODE_REDEMPTION",
        "SUMMARY",
        "1_0",
        include_str!("../schemas/subscription_offer_code_redemption_report.json"),
    ),
    sales(
        "newsstand_report",
        "NEWSSTAND",
        "DETAILED",
        "1_0",
        include_str!("../schemas/newsstand_report.json"),
    ),
    sales(
        "pre_order_report",
        "PRE_ORDER",
        "SUMMARY",
        "1_0",
        include_str!("../schemas/pre_order_report.json"),
    ),
    StreamDef {
        name: "financial_report",
        endpoint: ReportEndpoint::FinanceReports,
        report_type: "FINANCIAL",
        report_sub_type: None,
        version: None,
        granularity: Granularity::Monthly,
        schema_json: include_str!("../schemas/financial_report.json"),
    },
];

pub fn find(name: &str) -> Option<&'static StreamDef> {
    STREAMS.iter().find(|s| s.name == name)
}

impl StreamDef {
    /// Parsed JSON schema of the stream's records.
    pub fn schema(&self) -> Result<Value, TapError> {
        serde_json::from_str(self.schema_json)
            .map_err(|e| TapError::schema(self.name, format!("bundled schema is invalid: {}", e)))
    }

    /// Request for the report covering `period`.
    pub fn request(&self, period: DateTime<Utc>, vendor: &str) -> ReportRequest {
        let report_date = self.granularity.report_date(period);
        match self.endpoint {
            ReportEndpoint::SalesReports => ReportRequest::new(self.endpoint)
                .filter("frequency", "DAILY")
                .filter("reportDate", report_date)
                .filter("reportSubType", self.report_sub_type.unwrap_or("SUMMARY"))
                .filter("reportType", self.report_type)
                .filter("vendorNumber", vendor)
                .filter("version", self.version.unwrap_or("1_0")),
            ReportEndpoint::FinanceReports => ReportRequest::new(self.endpoint)
                .filter("regionCode", "ZZ")
                .filter("reportDate", report_date)
                .filter("reportType", self.report_type)
                .filter("vendorNumber", vendor),
        }
    }
}
