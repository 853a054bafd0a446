//! `fanout` is a library for sending many HTTP requests with a bounded
//! number of them in flight at any time.
//!
//! Requests are submitted to an [`Engine`], which admits them into the
//! [`Transport`] as capacity allows, retries recoverable failures after a
//! fixed delay, and hands each finished request to its handler exactly once.
//!
//! ```no_run
//! use fanout_lib::{Engine, ReqwestTransportBuilder, Request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let transport = ReqwestTransportBuilder::builder().build().transport()?;
//!   let mut engine: Engine<_> = Engine::new(transport);
//!   engine.set_max_concurrency(10);
//!
//!   for url in ["https://example.com", "https://example.org"] {
//!     engine
//!       .submit(Request::new(url).handler(|response: &mut String, done| {
//!         println!("{} finished with {}", done.url, done.http_code);
//!         response.truncate(64);
//!       }))
//!       .await;
//!   }
//!
//!   engine.finish().await?;
//!   assert_eq!(engine.results().len(), 2);
//!   Ok(())
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod engine;
mod retry;
mod transport;
mod types;

pub mod wsapi;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::{
    engine::{
        DEFAULT_LAUNCH_INTERVAL, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES,
        DEFAULT_POLL_TIMEOUT, DEFAULT_RETRY_DELAY, Engine, EngineConfig,
    },
    retry::{FailureKind, classify},
    transport::{
        Completion, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, Progress,
        ReqwestTransport, ReqwestTransportBuilder, Transport,
    },
    types::{
        Completed, ErrorKind, Handler, Request, RequestId, RequestOptions, RequestStatus, Result,
        ResultRecord, TRANSPORT_ERROR_CODE, status_message,
    },
};
