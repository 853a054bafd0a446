use crate::Completion;

/// How a finished operation failed, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No HTTP response was obtained (connection, DNS or timeout failure)
    Transport,
    /// The server answered with 500, 503 or 504
    RecoverableServer,
    /// Any other status code outside of the 2xx range
    Terminal,
}

impl FailureKind {
    /// Returns `true` if an operation which failed this way may be retried
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport | Self::RecoverableServer)
    }
}

/// Classify a status code.
///
/// Returns `None` for 2xx codes, which did not fail at all.
#[must_use]
pub fn classify(code: u16) -> Option<FailureKind> {
    match code {
        0 => Some(FailureKind::Transport),
        500 | 503 | 504 => Some(FailureKind::RecoverableServer),
        200..=299 => None,
        _ => Some(FailureKind::Terminal),
    }
}

/// An extension trait to help determine if a finished operation
/// should be attempted again.
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for u16 {
    fn should_retry(&self) -> bool {
        classify(*self).is_some_and(|kind| kind.is_recoverable())
    }
}

impl RetryExt for Completion {
    fn should_retry(&self) -> bool {
        self.status_code.should_retry()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use rstest::rstest;

    use super::{FailureKind, RetryExt, classify};
    use crate::{Completion, RequestId};

    #[test]
    fn test_should_retry() {
        assert!(StatusCode::INTERNAL_SERVER_ERROR.as_u16().should_retry());
        assert!(StatusCode::SERVICE_UNAVAILABLE.as_u16().should_retry());
        assert!(StatusCode::GATEWAY_TIMEOUT.as_u16().should_retry());
        assert!(0_u16.should_retry());

        assert!(!StatusCode::OK.as_u16().should_retry());
        assert!(!StatusCode::BAD_GATEWAY.as_u16().should_retry());
        assert!(!StatusCode::NOT_IMPLEMENTED.as_u16().should_retry());
        assert!(!StatusCode::TOO_MANY_REQUESTS.as_u16().should_retry());
        assert!(!StatusCode::NOT_FOUND.as_u16().should_retry());
    }

    #[test]
    fn test_completion_should_retry() {
        let id = RequestId::new(0, 0);
        assert!(Completion::failure(id, "reset").should_retry());
        assert!(Completion::response(id, 503, "").should_retry());
        assert!(!Completion::response(id, 200, "ok").should_retry());
    }

    #[rstest]
    #[case(0, Some(FailureKind::Transport))]
    #[case(200, None)]
    #[case(204, None)]
    #[case(301, Some(FailureKind::Terminal))]
    #[case(404, Some(FailureKind::Terminal))]
    #[case(500, Some(FailureKind::RecoverableServer))]
    #[case(502, Some(FailureKind::Terminal))]
    #[case(503, Some(FailureKind::RecoverableServer))]
    #[case(504, Some(FailureKind::RecoverableServer))]
    fn test_classify(#[case] code: u16, #[case] expected: Option<FailureKind>) {
        assert_eq!(classify(code), expected);
    }
}
