use std::time::Duration;

use super::request::{RequestId, RequestOptions};

/// Everything known about a request at the moment it is finalized, except
/// for the response itself, which is handed to the [`Handler`] separately
/// so that it can be modified.
#[derive(Debug)]
pub struct Completed<'a, M> {
    /// Identifier assigned at submission
    pub id: RequestId,
    /// HTTP status code as a string, or
    /// [`TRANSPORT_ERROR_CODE`](crate::TRANSPORT_ERROR_CODE)
    pub http_code: &'a str,
    /// Time elapsed since submission
    pub latency: Duration,
    /// URL the request was submitted with
    pub url: &'a str,
    /// Options the request was submitted with
    pub options: &'a RequestOptions,
    /// Caller-supplied metadata
    pub metadata: Option<&'a M>,
}

/// Called exactly once when a request is finalized.
///
/// Any `FnOnce(&mut String, &Completed<'_, M>)` closure is a handler. The
/// value left in `response` when `handle` returns is what gets stored in the
/// [`ResultRecord`](crate::ResultRecord).
pub trait Handler<M>: Send {
    /// Process the final response of a request
    fn handle(self: Box<Self>, response: &mut String, completed: &Completed<'_, M>);
}

impl<M, F> Handler<M> for F
where
    F: FnOnce(&mut String, &Completed<'_, M>) + Send,
{
    fn handle(self: Box<Self>, response: &mut String, completed: &Completed<'_, M>) {
        (*self)(response, completed);
    }
}
