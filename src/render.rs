use crate::history::{History, HistoryEntry};
use crate::http::{ResponseBody, ResponseRecord, TransportError};
use crate::request::Method;

use chrono::{DateTime, Utc};
use colored::*;
use serde_json::{Map, Value};

pub const ERROR_BADGE: &str = "Error";
pub const NO_HEADERS_PLACEHOLDER: &str = "No headers available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusBadge {
    Http {
        code: u16,
        text: String,
        class: u16,
        elapsed_ms: u64,
    },
    Error,
}

/// Everything the terminal needs to show for one finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub badge: StatusBadge,
    pub body: String,
    pub headers: String,
}

impl Rendered {
    pub fn is_error(&self) -> bool {
        matches!(self.badge, StatusBadge::Error)
    }
}

pub fn status_class(status: u16) -> u16 {
    status / 100 * 100
}

pub fn render_body(body: &ResponseBody) -> String {
    match body {
        ResponseBody::Text(text) => text.clone(),
        ResponseBody::Json(Value::String(s)) => s.clone(),
        ResponseBody::Json(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        ResponseBody::Json(v) => pretty(v),
    }
}

pub fn render_headers(headers: &[(String, String)]) -> String {
    let mut map = Map::new();
    for (key, value) in headers {
        match map.get_mut(key) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(key.clone(), Value::String(value.clone()));
            }
        }
    }
    pretty(&Value::Object(map))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn render_response(record: &ResponseRecord) -> Rendered {
    Rendered {
        badge: StatusBadge::Http {
            code: record.status,
            text: record.status_text.clone(),
            class: status_class(record.status),
            elapsed_ms: record.elapsed_ms,
        },
        body: render_body(&record.body),
        headers: render_headers(&record.headers),
    }
}

pub fn render_error(err: &TransportError) -> Rendered {
    Rendered {
        badge: StatusBadge::Error,
        body: format!("Connection error: {}", err.message()),
        headers: NO_HEADERS_PLACEHOLDER.to_string(),
    }
}

/// The pure core of a send: render instructions, plus the history entry to
/// record when the exchange completed.
pub fn render_outcome(
    method: Method,
    url: &str,
    outcome: &Result<ResponseRecord, TransportError>,
    now: DateTime<Utc>,
) -> (Rendered, Option<HistoryEntry>) {
    match outcome {
        Ok(record) => (
            render_response(record),
            Some(HistoryEntry::new(method, url, record.status, record.elapsed_ms, now)),
        ),
        Err(err) => (render_error(err), None),
    }
}

fn colorize_status(label: &str, class: Option<u16>) -> ColoredString {
    match class {
        Some(200) => label.green().bold(),
        Some(300) => label.cyan().bold(),
        Some(400) => label.yellow().bold(),
        Some(_) => label.red().bold(),
        None => label.red().bold(),
    }
}

pub fn status_line(rendered: &Rendered) -> String {
    match &rendered.badge {
        StatusBadge::Http {
            code,
            text,
            class,
            elapsed_ms,
        } => {
            let label = format!("{code} {text}");
            format!(
                "{} {} {}",
                "HTTP".cyan().bold(),
                colorize_status(label.trim_end(), Some(*class)),
                format!("{elapsed_ms}ms").dimmed()
            )
        }
        StatusBadge::Error => colorize_status(ERROR_BADGE, None).to_string(),
    }
}

/// Status line and headers go to stderr so stdout carries only the body.
pub fn print_rendered(rendered: &Rendered, verbose: bool) {
    eprintln!("{}", status_line(rendered));
    if verbose || rendered.is_error() {
        eprintln!("{}", rendered.headers.dimmed());
    }
    if rendered.is_error() {
        eprintln!("{}", rendered.body);
    } else if !rendered.body.is_empty() {
        println!("{}", rendered.body);
    }
}

pub fn history_lines(history: &History) -> Vec<String> {
    history
        .entries()
        .iter()
        .map(|e| {
            format!(
                "{}  {:<6} {} {:>6}  {}",
                e.timestamp.dimmed(),
                e.method,
                colorize_status(&e.status.to_string(), Some(status_class(e.status))),
                format!("{}ms", e.elapsed_ms),
                e.url
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(status: u16, body: ResponseBody) -> ResponseRecord {
        ResponseRecord {
            status,
            status_text: "Whatever".to_string(),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("date".to_string(), "Tue, 01 Jul 2025 10:00:00 GMT".to_string()),
            ],
            body,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(404), 400);
        assert_eq!(status_class(204), 200);
        assert_eq!(status_class(503), 500);
        assert_eq!(status_class(301), 300);
        assert_eq!(status_class(100), 100);
    }

    #[test]
    fn test_render_body() {
        let obj = ResponseBody::Json(json!({"id": 1, "nome": "Ana"}));
        assert_eq!(render_body(&obj), "{\n  \"id\": 1,\n  \"nome\": \"Ana\"\n}");
        assert_eq!(render_body(&ResponseBody::Json(json!([]))), "[]");
        assert_eq!(render_body(&ResponseBody::Json(Value::Null)), "null");
        assert_eq!(render_body(&ResponseBody::Json(json!("plain"))), "plain");
        assert_eq!(render_body(&ResponseBody::Json(json!(42))), "42");
        assert_eq!(render_body(&ResponseBody::Json(json!(true))), "true");
        assert_eq!(
            render_body(&ResponseBody::Text("  <p>raw</p>\n".to_string())),
            "  <p>raw</p>\n"
        );
    }

    #[test]
    fn test_render_headers_keeps_order() {
        let headers = vec![
            ("z-last".to_string(), "1".to_string()),
            ("a-first".to_string(), "2".to_string()),
        ];
        assert_eq!(
            render_headers(&headers),
            "{\n  \"z-last\": \"1\",\n  \"a-first\": \"2\"\n}"
        );
    }

    #[test]
    fn test_render_headers_joins_repeated_names() {
        let headers = vec![
            ("set-cookie".to_string(), "a=1".to_string()),
            ("vary".to_string(), "Accept".to_string()),
            ("set-cookie".to_string(), "b=2".to_string()),
        ];
        let rendered: Value = serde_json::from_str(&render_headers(&headers)).unwrap();
        assert_eq!(rendered, json!({"set-cookie": "a=1, b=2", "vary": "Accept"}));
    }

    #[test]
    fn test_render_headers_empty() {
        assert_eq!(render_headers(&[]), "{}");
    }

    #[test]
    fn test_render_response() {
        let rendered = render_response(&record(404, ResponseBody::Json(json!({"error": "x"}))));
        assert_eq!(
            rendered.badge,
            StatusBadge::Http {
                code: 404,
                text: "Whatever".to_string(),
                class: 400,
                elapsed_ms: 12,
            }
        );
        assert!(!rendered.is_error());
        assert!(rendered.headers.contains("\"date\""));
    }

    #[test]
    fn test_render_error() {
        let rendered = render_error(&TransportError::Connect("connection refused".to_string()));
        assert_eq!(rendered.badge, StatusBadge::Error);
        assert_eq!(rendered.body, "Connection error: connection refused");
        assert_eq!(rendered.headers, NO_HEADERS_PLACEHOLDER);
        assert!(rendered.is_error());
    }

    #[test]
    fn test_render_outcome_records_only_completed_exchanges() {
        let now = Utc::now();
        let ok = Ok(record(201, ResponseBody::Text(String::new())));
        let (rendered, entry) = render_outcome(Method::Post, "http://localhost/api", &ok, now);
        assert!(!rendered.is_error());
        let entry = entry.unwrap();
        assert_eq!(entry.status, 201);
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.elapsed_ms, 12);

        let failed = Err(TransportError::Timeout("timed out".to_string()));
        let (rendered, entry) = render_outcome(Method::Get, "http://localhost/api", &failed, now);
        assert!(rendered.is_error());
        assert!(entry.is_none());
    }

    #[test]
    fn test_history_lines() {
        colored::control::set_override(false);
        let mut history = History::default();
        history.record(HistoryEntry::new(Method::Get, "http://x/a", 200, 7, Utc::now()));
        history.record(HistoryEntry::new(Method::Delete, "http://x/b", 404, 1234, Utc::now()));

        let lines = history_lines(&history);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("DELETE 404 1234ms  http://x/b"));
        assert!(lines[1].contains("GET    200    7ms  http://x/a"));
    }

    #[test]
    fn test_status_line_error_has_no_code() {
        colored::control::set_override(false);
        let rendered = render_error(&TransportError::Request("bad url".to_string()));
        assert_eq!(status_line(&rendered), ERROR_BADGE);
    }
}
