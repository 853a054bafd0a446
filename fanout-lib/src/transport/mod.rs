//! The transport is the part of the system which actually performs HTTP
//! operations. The [`Engine`](crate::Engine) only registers operations with
//! it, waits for it to make progress and collects finished operations.
//!
//! [`ReqwestTransport`] is the implementation used in production. Tests
//! drive the engine with a scripted transport instead.

mod client;

use std::time::Duration;

use async_trait::async_trait;

use crate::{RequestId, RequestOptions, Result};

pub use client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, ReqwestTransport,
    ReqwestTransportBuilder,
};

/// Outcome of a single [`Transport::drive_progress`] step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work can be done right away; call `drive_progress` again
    Busy,
    /// No more immediate work
    Idle,
}

/// A finished transport operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Identifier the operation was registered with
    pub id: RequestId,
    /// HTTP status code, `0` if no HTTP response was obtained
    pub status_code: u16,
    /// Details about a transport failure, if any
    pub error: Option<String>,
    /// Full response body
    pub body: String,
}

impl Completion {
    /// A completion carrying an HTTP response
    #[must_use]
    pub fn response<S: Into<String>>(id: RequestId, status_code: u16, body: S) -> Self {
        Self {
            id,
            status_code,
            error: None,
            body: body.into(),
        }
    }

    /// A completion for an operation which got no HTTP response
    #[must_use]
    pub fn failure<S: Into<String>>(id: RequestId, detail: S) -> Self {
        Self {
            id,
            status_code: 0,
            error: Some(detail.into()),
            body: String::new(),
        }
    }
}

/// Multi-request HTTP capability the engine is written against.
///
/// Implementations multiplex any number of registered operations and report
/// each of them exactly once through [`Transport::next_completed`].
///
/// Errors returned from [`Transport::register`] or
/// [`Transport::drive_progress`] are fatal: the engine stops admitting
/// requests and `finish` returns early. Failures of individual operations
/// must be reported as a [`Completion`] instead.
#[async_trait]
pub trait Transport: Send {
    /// Start an operation
    fn register(&mut self, id: RequestId, url: &str, options: &RequestOptions) -> Result<()>;

    /// Forget about an operation which was reported as completed
    fn deregister(&mut self, id: RequestId);

    /// Do whatever can be done without waiting.
    ///
    /// Called repeatedly until it returns [`Progress::Idle`].
    fn drive_progress(&mut self) -> Result<Progress>;

    /// Wait until an operation completes or `timeout` elapses.
    ///
    /// Returns whether a completion is ready to be collected.
    async fn wait(&mut self, timeout: Duration) -> bool;

    /// Collect the next finished operation, if any
    fn next_completed(&mut self) -> Option<Completion>;

    /// Release all resources held for in-flight operations
    fn close(&mut self) {}
}
