use serde::Serialize;
use strum::{Display, EnumString};

/// Lifecycle phase of a submitted request, as reported by
/// [`Engine::status`](crate::Engine::status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for a free slot
    Queued,
    /// Registered with the transport and in flight
    Active,
    /// Finalized; a result is available
    Completed,
    /// Never submitted to this engine
    Unknown,
}

impl RequestStatus {
    #[inline]
    #[must_use]
    /// Returns `true` if a result is available
    pub const fn is_completed(&self) -> bool {
        matches!(self, RequestStatus::Completed)
    }

    #[inline]
    #[must_use]
    /// Returns `true` if the request has been submitted but is not finalized
    pub const fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Queued | RequestStatus::Active)
    }
}
