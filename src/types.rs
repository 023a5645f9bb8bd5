use serde::Deserialize;
use std::fmt;

/// Report endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEndpoint {
    SalesReports,
    FinanceReports,
}

impl ReportEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::SalesReports => "/v1/salesReports",
            Self::FinanceReports => "/v1/financeReports",
        }
    }
}

impl fmt::Display for ReportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// One report download: the endpoint plus its `filter[...]` query values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub endpoint: ReportEndpoint,
    /// Filter names without the `filter[...]` wrapper, in a fixed order.
    pub filters: Vec<(&'static str, String)>,
}

impl ReportRequest {
    pub fn new(endpoint: ReportEndpoint) -> Self {
        Self {
            endpoint,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.filters.push((name, value.into()));
        self
    }

    pub fn query(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|(name, value)| (format!("filter[{}]", name), value.clone()))
            .collect()
    }

    pub fn report_date(&self) -> Option<&str> {
        self.filters
            .iter()
            .find(|(name, _)| *name == "reportDate")
            .map(|(_, value)| value.as_str())
    }
}

/// Result of a report download that did not fail the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// Decoded report body (TSV text).
    Report(String),
    /// No report for this period (404): nothing was sold, or it is not
    /// published yet.
    Unavailable { status: u16, message: String },
}

/// Error document returned by App Store Connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorResponse {
    /// Human readable summary of every error entry.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| {
                let code = e.code.as_deref().unwrap_or("UNKNOWN");
                match (e.title.as_deref(), e.detail.as_deref()) {
                    (_, Some(detail)) => format!("{}: {}", code, detail),
                    (Some(title), None) => format!("{}: {}", code, title),
                    (None, None) => code.to_string(),
                }
            })
            .collect();
        parts.join("; ")
    }
}
