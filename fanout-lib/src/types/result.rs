use std::{
    fmt::{self, Display},
    time::Duration,
};

use http::StatusCode;
use serde::{Serialize, Serializer};

use super::request::{RequestId, RequestOptions};

/// `http_code` of a request for which no HTTP response was obtained,
/// e.g. because of a DNS failure, a refused connection or a timeout
pub const TRANSPORT_ERROR_CODE: &str = "0";

const CONNECTION_ERROR: &str = "Connection Error";
const UNKNOWN_STATUS: &str = "Unknown status";

/// Final outcome of a submitted request.
///
/// Exactly one record is produced per submitted request. Records are kept
/// in the order in which requests were finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord<M = ()> {
    /// Identifier assigned at submission
    pub id: RequestId,
    /// Response body for successful requests, a status message otherwise;
    /// in both cases after the handler had a chance to modify it
    pub response: String,
    /// HTTP status code as a string, or [`TRANSPORT_ERROR_CODE`]
    pub http_code: String,
    /// Time from submission to finalization, including retries
    #[serde(serialize_with = "serialize_secs")]
    pub latency: Duration,
    /// URL the request was submitted with
    pub url: String,
    /// Options the request was submitted with
    pub options: RequestOptions,
    /// Caller-supplied metadata
    pub metadata: Option<M>,
}

impl<M> ResultRecord<M> {
    /// Latency in seconds
    #[must_use]
    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }

    /// Returns `true` if the request ended with a 2xx status code
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.http_code.starts_with('2') && self.http_code.len() == 3
    }

    /// Returns `true` if no HTTP response was obtained
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        self.http_code == TRANSPORT_ERROR_CODE
    }
}

impl<M> Display for ResultRecord<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.http_code, self.url)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_secs<S>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(latency.as_secs_f64())
}

/// Human-readable message for a status code.
///
/// Code `0` stands for a transport error; `detail` is appended to the
/// message in that case. Every other code maps to its canonical reason
/// phrase, or `"Unknown status"` if there is none.
#[must_use]
pub fn status_message(code: u16, detail: Option<&str>) -> String {
    if code == 0 {
        return match detail {
            Some(detail) if !detail.is_empty() => format!("{CONNECTION_ERROR}: {detail}"),
            _ => CONNECTION_ERROR.to_string(),
        };
    }

    StatusCode::from_u16(code)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or(UNKNOWN_STATUS)
        .to_string()
}
