pub(crate) mod api;
pub(crate) mod fetch;

pub(crate) use api::api;
pub(crate) use fetch::fetch;

use fanout_lib::ResultRecord;

/// Outcome of running one batch of requests
#[derive(Debug)]
pub(crate) struct Batch {
    /// Finished requests, in the order in which they finished
    pub(crate) records: Vec<ResultRecord>,
    /// Number of requests submitted to the engine
    pub(crate) submitted: usize,
    /// Result of waiting for the batch, an error if the transport failed
    pub(crate) outcome: fanout_lib::Result<()>,
}
