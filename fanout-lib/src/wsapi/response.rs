use log::warn;
use serde_json::{Map, Value};

use super::{
    error_log::ErrorLog,
    scale::{Units, scale},
};
use crate::status_message;

const SUCCESS: &str = "200";

/// Turns the raw response of an API request into a JSON document
#[derive(Debug, Clone)]
pub(crate) struct ResponseProcessor {
    pub(crate) return_diagnostics: bool,
    pub(crate) units: Units,
    pub(crate) error_log: Option<ErrorLog>,
}

impl ResponseProcessor {
    /// Decode `raw` and fill in what the API left out.
    ///
    /// Anything that is not a JSON object decodes to an empty object. For
    /// failed requests, `response_code` and `message` are added unless the
    /// API sent them.
    pub(crate) fn process(&self, raw: &str, http_code: &str, request_uri: &str) -> Value {
        let mut response = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };

        if http_code != SUCCESS {
            let message = self.backfill(&mut response, raw, http_code);
            if let Some(log) = &self.error_log {
                if let Err(e) = log.write(http_code, &message, request_uri) {
                    warn!("Cannot write to error log: {e}");
                }
            }
        }

        scale(&mut response, self.units);
        response
    }

    /// Returns the message of the response after backfilling
    fn backfill(&self, response: &mut Value, raw: &str, http_code: &str) -> String {
        let Value::Object(root) = response else {
            return String::new();
        };

        let target = if self.return_diagnostics {
            ensure_object(root, "diagnostics");
            ensure_object(root, "response")
        } else {
            Some(root)
        };
        let Some(target) = target else {
            return String::new();
        };

        target
            .entry("response_code")
            .or_insert_with(|| response_code(http_code));
        let message = target
            .entry("message")
            .or_insert_with(|| Value::String(default_message(raw, http_code)));

        match message {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

fn ensure_object<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Option<&'a mut Map<String, Value>> {
    let value = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn response_code(http_code: &str) -> Value {
    http_code
        .parse::<u16>()
        .map_or_else(|_| Value::String(http_code.to_string()), Value::from)
}

/// The status text of the code. Transport failures reach the processor with
/// the engine's status message in place of the body, which carries the
/// failure detail and is kept.
fn default_message(raw: &str, http_code: &str) -> String {
    let code = http_code.parse().unwrap_or(u16::MAX);
    let raw = raw.trim();
    if code == 0 && !raw.is_empty() && serde_json::from_str::<Value>(raw).is_err() {
        return raw.to_string();
    }
    status_message(code, None)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::ResponseProcessor;
    use crate::wsapi::{DistanceUnit, ErrorLog, TemperatureUnit, scale::Units};

    fn processor() -> ResponseProcessor {
        ResponseProcessor {
            return_diagnostics: false,
            units: Units::default(),
            error_log: None,
        }
    }

    #[test]
    fn test_success_is_decoded() {
        let response = processor().process(r#"{"key":"abc","email":"a@b.c"}"#, "200", "");
        assert_eq!(response, json!({ "key": "abc", "email": "a@b.c" }));
    }

    #[test]
    fn test_non_object_becomes_empty() {
        assert_eq!(processor().process("[1, 2]", "200", ""), json!({}));
        assert_eq!(processor().process("not json", "200", ""), json!({}));
    }

    #[test]
    fn test_backfill_status_message() {
        let response = processor().process("Service Unavailable", "503", "");
        assert_eq!(
            response,
            json!({ "response_code": 503, "message": "Service Unavailable" })
        );
    }

    #[test]
    fn test_backfill_connection_error() {
        let response = processor().process("Connection Error: Connection refused", "0", "");
        assert_eq!(
            response,
            json!({ "response_code": 0, "message": "Connection Error: Connection refused" })
        );
    }

    #[test]
    fn test_backfill_ignores_plain_body() {
        let response = processor().process("created", "201", "");
        assert_eq!(
            response,
            json!({ "response_code": 201, "message": "Created" })
        );
    }

    #[test]
    fn test_backfill_keeps_api_fields() {
        let response = processor().process(r#"{"message":"Invalid key"}"#, "401", "");
        assert_eq!(
            response,
            json!({ "response_code": 401, "message": "Invalid key" })
        );
    }

    #[test]
    fn test_backfill_with_diagnostics() {
        let processor = ResponseProcessor {
            return_diagnostics: true,
            ..processor()
        };
        let response = processor.process("", "404", "");
        assert_eq!(
            response,
            json!({
                "diagnostics": {},
                "response": { "response_code": 404, "message": "Not Found" },
            })
        );
    }

    #[test]
    fn test_scaling_applied() {
        let processor = ResponseProcessor {
            units: Units {
                distance: DistanceUnit::Metric,
                temperature: TemperatureUnit::Celsius,
            },
            ..processor()
        };
        let response = processor.process(r#"{"temp": 32, "precip": 1}"#, "200", "");
        assert_eq!(response, json!({ "temp": 0.0, "precip": 2.54 }));
    }

    #[test]
    fn test_failures_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let processor = ResponseProcessor {
            error_log: Some(ErrorLog::new(dir.path())),
            ..processor()
        };

        processor.process("Bad Gateway", "502", "https://a/b.json?x=%20y");
        processor.process("{}", "200", "https://a/ok.json");

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(content.contains("[Error 502 | Bad Gateway] [https://a/b.json?x= y]"));
        assert_eq!(content.lines().count(), 1);
    }
}
