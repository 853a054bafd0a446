use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// Possible errors when interacting with `fanout_lib`
///
/// Failures of individual requests are never reported through this type.
/// They end up in the [`ResultRecord`](crate::ResultRecord) of the request
/// instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The transport reported a failure it cannot recover from.
    /// Admission stops and remaining requests stay unfinalized.
    #[error("Transport failed and cannot process further requests: {0}")]
    TransportFatal(String),

    /// The reqwest client could not be built
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// A header name or value could not be parsed
    #[error("Header could not be parsed: {0}")]
    InvalidHeader(String),

    /// Any form of I/O error occurred while reading from or writing to a given path.
    #[error("Failed to access path: `{}`, reason: {}", match .0 {
        Some(p) => p.to_str().unwrap_or("<MALFORMED PATH>"),
        None => "<MALFORMED PATH>",
    }, .1)]
    Io(Option<PathBuf>, #[source] std::io::Error),

    /// A configuration file could not be parsed
    #[error("Cannot parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl ErrorKind {
    /// Returns `true` if this error halts the engine
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportFatal(_))
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::TransportFatal(d1), Self::TransportFatal(d2))
            | (Self::InvalidHeader(d1), Self::InvalidHeader(d2)) => d1 == d2,
            (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::Io(p1, e1), Self::Io(p2, e2)) => p1 == p2 && e1.kind() == e2.kind(),
            (Self::Config(e1), Self::Config(e2)) => e1.to_string() == e2.to_string(),
            _ => false,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<http::header::InvalidHeaderValue> for ErrorKind {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn test_fatal_errors() {
        assert!(ErrorKind::TransportFatal("gone".into()).is_fatal());
        assert!(!ErrorKind::InvalidHeader("bad value".into()).is_fatal());
    }

    #[test]
    fn test_error_serialization() {
        let error = ErrorKind::TransportFatal("select failed".into());
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            "\"Transport failed and cannot process further requests: select failed\""
        );
    }
}
