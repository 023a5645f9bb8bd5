//! Tab-separated report parsing.

use serde_json::{Map, Value};

use crate::error::TapError;

pub type Row = Map<String, Value>;

/// Lowercase the header and replace spaces and dashes with underscores.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Parse a TSV report into rows keyed by normalized header.
///
/// Blank lines are skipped and cells are trimmed. A line with fewer cells
/// than the header only yields the columns it has.
pub fn parse_report(stream: &str, body: &str) -> Result<Vec<Row>, TapError> {
    if body.trim_start().starts_with('{') {
        return Err(TapError::schema(
            stream,
            format!(
                "received a JSON response instead of the report: {}",
                body.trim()
            ),
        ));
    }

    let mut lines = body.split('\n');
    let header: Vec<String> = match lines.next() {
        Some(line) if !line.trim().is_empty() => line.split('\t').map(normalize_header).collect(),
        _ => return Ok(Vec::new()),
    };

    let rows = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            header
                .iter()
                .zip(line.split('\t'))
                .map(|(column, cell)| (column.clone(), Value::String(cell.trim().to_string())))
                .collect::<Row>()
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_normalization() {
        assert_eq!(normalize_header("Provider Country"), "provider_country");
        assert_eq!(normalize_header("Marketing Opt-Ins"), "marketing_opt_ins");
        assert_eq!(normalize_header("Download Date (PST)\r"), "download_date_(pst)");
        assert_eq!(normalize_header("ISRC/ISBN"), "isrc/isbn");
    }

    #[test]
    fn test_parse_rows() {
        let body = "Provider\tUnits\tTitle\nAPPLE\t3\t My App \n\nAPPLE\t1\n";
        let rows = parse_report("sales_report", body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["provider"], "APPLE");
        assert_eq!(rows[0]["units"], "3");
        assert_eq!(rows[0]["title"], "My App");
        assert_eq!(rows[1].len(), 2);
        assert!(!rows[1].contains_key("title"));
    }

    #[test]
    fn test_crlf_lines() {
        let rows = parse_report("s", "A\tB\r\n1\t2\r\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["b"], "2");
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_report("s", "").unwrap().is_empty());
        assert!(parse_report("s", "A\tB\n").unwrap().is_empty());
    }

    #[test]
    fn test_json_body_is_schema_error() {
        let err = parse_report("sales_report", r#"{"errors": []}"#).unwrap_err();
        assert!(matches!(err, TapError::Schema { ref stream, .. } if stream == "sales_report"));
    }
}
