//! The aggregator answers with a JSON array of strings, each string being a
//! JSON encoded `{type, payload}` entry. A bare `null` means no entries.

use serde::Deserialize;

use super::LogAggregatorError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        if self.kind == "data" {
            self.payload.clone()
        } else {
            format!("{} - {}", self.kind, self.payload)
        }
    }
}

pub fn parse_response(body: &str) -> Result<Vec<String>, LogAggregatorError> {
    let raw: Option<Vec<String>> = serde_json::from_str(body)
        .map_err(|err| LogAggregatorError::InvalidResponse(err.to_string()))?;
    raw.unwrap_or_default()
        .iter()
        .map(|item| parse_entry(item).map(|entry| entry.render()))
        .collect()
}

pub fn parse_entry(raw: &str) -> Result<LogEntry, LogAggregatorError> {
    serde_json::from_str(raw)
        .map_err(|err| LogAggregatorError::InvalidResponse(format!("log entry {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_body_is_empty() {
        assert!(parse_response("null").expect("null parses").is_empty());
        assert!(parse_response("[]").expect("empty array parses").is_empty());
    }

    #[test]
    fn data_entries_render_payload_only() {
        let body = serde_json::to_string(&vec![
            r#"{"type":"data","payload":"GET / 200"}"#,
            r#"{"type":"error","payload":"pod restarted"}"#,
        ])
        .expect("encode body");

        let lines = parse_response(&body).expect("body parses");
        assert_eq!(lines, vec!["GET / 200", "error - pod restarted"]);
    }

    #[test]
    fn malformed_entry_is_invalid_response() {
        let err = parse_response(r#"["not json"]"#).expect_err("entry is not json");
        assert!(matches!(err, LogAggregatorError::InvalidResponse(_)));
    }
}
