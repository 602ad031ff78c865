//! Deterministic CLI output rendering.
//!
//! Every command builds a `serde_json::Value` payload of the shape
//! `{"ok": bool, "operation": str, "data"?: ..., "error"?: {...}}` and
//! hands it to [`emit`]. The three output modes never depend on map
//! iteration order: JSON mode sorts keys, default/pretty modes read
//! named fields directly.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Default,
    Json,
    Pretty,
}

pub fn resolve_output_mode(json_output: bool, pretty_output: bool) -> OutputMode {
    if json_output {
        OutputMode::Json
    } else if pretty_output {
        OutputMode::Pretty
    } else {
        OutputMode::Default
    }
}

/// Print `payload` per `mode`, suppressing successful output when `quiet`.
pub fn emit(payload: &Value, mode: OutputMode, quiet: bool) {
    if quiet && payload.get("ok").and_then(Value::as_bool) == Some(true) {
        return;
    }
    println!("{}", format_payload(payload, mode));
}

pub fn format_payload(payload: &Value, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => canonical_json(payload),
        OutputMode::Pretty => format_pretty(payload),
        OutputMode::Default => format_default(payload),
    }
}

fn is_ok(payload: &Value) -> bool {
    payload.get("ok").and_then(Value::as_bool) == Some(true)
}

fn format_default(payload: &Value) -> String {
    if is_ok(payload) {
        match payload.get("data") {
            Some(Value::Object(data)) => {
                if data.contains_key("path") && data.contains_key("source") && data.len() <= 2 {
                    return format!(
                        "OK path={} source={}",
                        encode(data.get("path").unwrap_or(&Value::Null)),
                        encode(data.get("source").unwrap_or(&Value::Null)),
                    );
                }
                format!("OK data={}", encode(payload.get("data").unwrap()))
            }
            Some(data) => format!("OK data={}", encode(data)),
            None => format!("OK payload={}", encode(payload)),
        }
    } else {
        match payload.get("error") {
            Some(Value::Object(error)) => {
                if ["code", "path", "message", "hint"].iter().all(|key| error.contains_key(*key)) {
                    let mut line = format!(
                        "ERROR code={} path={} message={} hint={}",
                        encode(error.get("code").unwrap_or(&Value::String("UNKNOWN_ERROR".into()))),
                        encode(error.get("path").unwrap_or(&Value::String(String::new().into()))),
                        encode(error.get("message").unwrap_or(&Value::String(String::new().into()))),
                        encode(error.get("hint").unwrap_or(&Value::String(String::new().into()))),
                    );
                    if payload.get("operation").and_then(Value::as_str) == Some("test") {
                        if let Some(failures) = payload.get("data").and_then(|d| d.get("failures")) {
                            if failures.is_array() {
                                line.push_str(&format!(" failures={}", encode(failures)));
                            }
                        }
                    }
                    line
                } else {
                    format!("ERROR error={}", encode(payload.get("error").unwrap()))
                }
            }
            Some(error) => format!("ERROR error={}", encode(error)),
            None => format!("ERROR payload={}", encode(payload)),
        }
    }
}

fn format_pretty(payload: &Value) -> String {
    let operation = payload.get("operation").and_then(Value::as_str).unwrap_or("");

    if is_ok(payload) {
        if let Some(Value::Object(data)) = payload.get("data") {
            if data.contains_key("path") && data.contains_key("source") && data.len() <= 2 {
                return [
                    "Validation succeeded".to_string(),
                    format!("path: {}", string_or_empty(data.get("path"))),
                    format!("source: {}", string_or_empty(data.get("source"))),
                ]
                .join("\n");
            }

            if operation == "install" {
                let mut lines = vec![
                    "Install succeeded".to_string(),
                    format!("module_path: {}", string_or_empty(data.get("module_path"))),
                    format!("registry_path: {}", string_or_empty(data.get("registry_path"))),
                    format!("installed_count: {}", number_or_zero(data.get("count"))),
                ];
                if let Some(Value::Array(items)) = data.get("installed") {
                    for item in items {
                        lines.push(format!(
                            "- {}@{}",
                            string_or_empty(item.get("name")),
                            string_or_empty(item.get("version"))
                        ));
                    }
                }
                return lines.join("\n");
            }

            if operation == "test" {
                let mut lines = vec![
                    "Test run succeeded".to_string(),
                    format!("module_path: {}", string_or_empty(data.get("module_path"))),
                    format!("total: {}", number_or_zero(data.get("total"))),
                    format!("passed: {}", number_or_zero(data.get("passed"))),
                    format!("failed: {}", number_or_zero(data.get("failed"))),
                ];
                if let Some(Value::Array(results)) = data.get("results") {
                    for result in results {
                        let status = string_or_empty(result.get("status")).to_uppercase();
                        lines.push(format!("- {} {}", status, string_or_empty(result.get("name"))));
                    }
                }
                return lines.join("\n");
            }
        }
        return pretty_json(payload);
    }

    if let Some(Value::Object(error)) = payload.get("error") {
        let header = match operation {
            "install" => "Install failed",
            "test" => "Test run failed",
            _ => "Validation failed",
        };
        let mut lines = vec![
            header.to_string(),
            format!("code: {}", error.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN_ERROR")),
            format!("path: {}", string_or_empty(error.get("path"))),
            format!("message: {}", string_or_empty(error.get("message"))),
            format!("hint: {}", string_or_empty(error.get("hint"))),
        ];
        if operation == "test" {
            if let Some(Value::Array(failures)) = payload.get("data").and_then(|d| d.get("failures")) {
                for failure in failures {
                    lines.push(format!(
                        "- {}[{}] {}: {}",
                        string_or_empty(failure.get("test_name")),
                        number_or_zero(failure.get("assertion_index")),
                        string_or_empty(failure.get("assertion_type")),
                        string_or_empty(failure.get("message")),
                    ));
                }
            }
        }
        return lines.join("\n");
    }

    pretty_json(payload)
}

fn string_or_empty(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn number_or_zero(value: Option<&Value>) -> i64 {
    value.and_then(Value::as_i64).unwrap_or(0)
}

fn encode(value: &Value) -> String {
    canonical_json(value)
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).expect("payload always serializes")
}

/// Compact JSON with keys sorted at every level so byte output is stable.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", body)
        }
        other => serde_json::to_string(other).expect("scalar JSON value always serializes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_mode_sorts_keys() {
        let payload = json!({"ok": true, "data": {"b": 1, "a": 2}});
        assert_eq!(format_payload(&payload, OutputMode::Json), r#"{"data":{"a":2,"b":1},"ok":true}"#);
    }

    #[test]
    fn default_mode_renders_validate_style_success() {
        let payload = json!({"ok": true, "data": {"path": "/m", "source": "/m/promptpm.yaml"}});
        assert_eq!(format_payload(&payload, OutputMode::Default), "OK path=\"/m\" source=\"/m/promptpm.yaml\"");
    }

    #[test]
    fn default_mode_renders_structured_error() {
        let payload = json!({
            "ok": false,
            "operation": "validate",
            "error": {"code": "VALIDATION_ERROR", "path": "/m", "message": "bad", "hint": "fix it"}
        });
        let rendered = format_payload(&payload, OutputMode::Default);
        assert!(rendered.starts_with("ERROR code=\"VALIDATION_ERROR\""));
    }

    #[test]
    fn quiet_suppresses_success_only() {
        let success = json!({"ok": true, "data": {}});
        let failure = json!({"ok": false, "error": {}});
        assert_eq!(format_payload(&success, OutputMode::Json), canonical_json(&success));
        assert_ne!(format_payload(&failure, OutputMode::Json).len(), 0);
    }
}
