//! The engine keeps up to `max_concurrency` requests in flight on a
//! [`Transport`], retries recoverable failures and finalizes each request
//! exactly once.
//!
//! Every request goes through the same lifecycle:
//!
//! 1. [`Engine::submit`] appends it to a FIFO queue.
//! 2. Admission moves it from the queue head to the active set as soon as
//!    there is a free slot, and registers it with the transport.
//! 3. Evaluation collects finished operations. A recoverable failure sends
//!    the request back to the queue tail after the retry delay, anything else
//!    finalizes it: its handler runs and a [`ResultRecord`] is stored.
//!
//! [`Engine::finish`] repeats waiting and evaluation until nothing is left.

mod config;
mod node;

use std::{
    collections::{HashMap, VecDeque},
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use log::{debug, warn};

pub use config::{
    DEFAULT_LAUNCH_INTERVAL, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_POLL_TIMEOUT,
    DEFAULT_RETRY_DELAY, EngineConfig,
};
use node::{Node, NodeState};

use crate::{
    Completed, Completion, ErrorKind, Progress, Request, RequestId, RequestStatus, Result,
    ResultRecord, Transport, retry::RetryExt, status_message,
};

/// Tags the identifiers of each engine so that they never collide
static NEXT_ENGINE: AtomicU64 = AtomicU64::new(0);

impl From<NodeState> for RequestStatus {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Queued => RequestStatus::Queued,
            NodeState::Active => RequestStatus::Active,
            NodeState::Completed => RequestStatus::Completed,
        }
    }
}

/// Bounded-concurrency request multiplexer.
///
/// `T` is the transport which performs the HTTP operations and `M` the type
/// of the metadata attached to requests.
pub struct Engine<T, M = ()> {
    tag: u64,
    next_seq: u64,
    transport: T,
    config: EngineConfig,
    queue: VecDeque<Node<M>>,
    active: HashMap<RequestId, Node<M>>,
    results: Vec<ResultRecord<M>>,
    /// Position of each finalized request in `results`
    index: HashMap<RequestId, usize>,
    fatal: Option<String>,
}

impl<T, M> Debug for Engine<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tag", &self.tag)
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("active", &self.active.len())
            .field("completed", &self.results.len())
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, M> Engine<T, M> {
    /// Create an engine with the default [`EngineConfig`]
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Create an engine with the given configuration
    #[must_use]
    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        Self {
            tag: NEXT_ENGINE.fetch_add(1, Ordering::Relaxed),
            next_seq: 0,
            transport,
            config,
            queue: VecDeque::new(),
            active: HashMap::new(),
            results: Vec::new(),
            index: HashMap::new(),
            fatal: None,
        }
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set the maximum number of requests in flight.
    ///
    /// Takes effect at the next admission; requests already in flight are
    /// not affected.
    pub const fn set_max_concurrency(&mut self, max_concurrency: usize) {
        self.config.max_concurrency = max_concurrency;
    }

    /// Set the delay enforced after each admission
    pub const fn set_launch_interval(&mut self, interval: Duration) {
        self.config.launch_interval = interval;
    }

    /// Set how often a request failing with a recoverable error is retried
    pub const fn set_max_retries(&mut self, max_retries: u64) {
        self.config.max_retries = max_retries;
    }

    /// Set the delay before a failed request is queued again
    pub const fn set_retry_delay(&mut self, delay: Duration) {
        self.config.retry_delay = delay;
    }

    /// Submit a request.
    ///
    /// The request is queued, then admitted right away if there is a free
    /// slot. Operations which already finished are evaluated before this
    /// returns. Submission never fails: problems with the request show up in
    /// its result.
    pub async fn submit(&mut self, request: Request<M>) -> RequestId {
        let id = RequestId::new(self.tag, self.next_seq);
        self.next_seq += 1;

        self.queue.push_back(Node::new(id, request));
        self.admit().await;
        self.evaluate().await;
        id
    }

    /// Move queued requests into the transport while there are free slots
    pub async fn admit(&mut self) {
        while self.is_healthy() && self.active.len() < self.config.max_concurrency {
            let Some(mut node) = self.queue.pop_front() else {
                break;
            };

            if let Err(e) = self.transport.register(node.id, &node.url, &node.options) {
                self.queue.push_front(node);
                self.fail(e);
                break;
            }

            debug!("Admitted {} {} (attempt {})", node.id, node.url, node.retries + 1);
            node.state = NodeState::Active;
            self.active.insert(node.id, node);

            if !self.config.launch_interval.is_zero() {
                tokio::time::sleep(self.config.launch_interval).await;
            }
            self.drive();
        }
    }

    /// Wait until an operation finishes or the poll timeout elapses.
    ///
    /// Returns immediately if nothing is in flight.
    pub async fn wait_for_progress(&mut self) {
        if !self.is_healthy() || self.active.is_empty() {
            return;
        }

        self.transport.wait(self.config.poll_timeout).await;
        self.drive();
    }

    /// Collect all finished operations, then backfill freed slots
    pub async fn evaluate(&mut self) {
        let mut freed = false;

        while let Some(completion) = self.transport.next_completed() {
            let Some(node) = self.active.remove(&completion.id) else {
                warn!("Ignoring completion of unknown request {}", completion.id);
                self.transport.deregister(completion.id);
                continue;
            };
            freed = true;

            if completion.should_retry() && node.retries < self.config.max_retries {
                self.retry(node, &completion).await;
            } else {
                self.finalize(node, completion);
            }
        }

        if freed && self.is_healthy() && !self.queue.is_empty() {
            self.admit().await;
        }
    }

    /// Run until every submitted request is finalized.
    ///
    /// Returns early if the transport fails. The transport is closed in any
    /// case.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::TransportFatal`] if the transport failed in a
    /// way that stopped admission, either now or earlier. Requests which
    /// were finalized up to that point keep their results.
    pub async fn finish(&mut self) -> Result<()> {
        self.admit().await;
        while self.is_healthy() && !self.active.is_empty() {
            self.wait_for_progress().await;
            self.evaluate().await;
        }

        if self.is_healthy() && !self.queue.is_empty() {
            warn!(
                "{} requests remain queued; maximum concurrency is {}",
                self.queue.len(),
                self.config.max_concurrency
            );
        }
        self.transport.close();

        match &self.fatal {
            Some(detail) => Err(ErrorKind::TransportFatal(detail.clone())),
            None => Ok(()),
        }
    }

    fn drive(&mut self) {
        loop {
            match self.transport.drive_progress() {
                Ok(Progress::Busy) => {}
                Ok(Progress::Idle) => break,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
    }

    fn fail(&mut self, error: ErrorKind) {
        let detail = match error {
            ErrorKind::TransportFatal(detail) => detail,
            other => other.to_string(),
        };
        warn!("Transport failed, no more requests are admitted: {detail}");
        // Keep the first failure
        self.fatal.get_or_insert(detail);
    }

    async fn retry(&mut self, mut node: Node<M>, completion: &Completion) {
        self.transport.deregister(node.id);
        debug!(
            "Retrying {} {} after status {} ({}/{})",
            node.id,
            node.url,
            completion.status_code,
            node.retries + 1,
            self.config.max_retries
        );

        if !self.config.retry_delay.is_zero() {
            tokio::time::sleep(self.config.retry_delay).await;
        }
        node.retries += 1;
        node.state = NodeState::Queued;
        self.queue.push_back(node);
    }

    fn finalize(&mut self, mut node: Node<M>, completion: Completion) {
        node.state = NodeState::Completed;
        debug!("Finalizing {node:?} with status {}", completion.status_code);

        let Node {
            id,
            url,
            options,
            handler,
            metadata,
            submitted_at,
            ..
        } = node;
        let Completion {
            status_code,
            error,
            body,
            ..
        } = completion;

        let latency = submitted_at.elapsed();
        let http_code = status_code.to_string();
        let mut response = if (200..300).contains(&status_code) {
            body
        } else {
            status_message(status_code, error.as_deref())
        };

        if let Some(handler) = handler {
            let completed = Completed {
                id,
                http_code: &http_code,
                latency,
                url: &url,
                options: &options,
                metadata: metadata.as_ref(),
            };
            handler.handle(&mut response, &completed);
        }

        self.index.insert(id, self.results.len());
        self.results.push(ResultRecord {
            id,
            response,
            http_code,
            latency,
            url,
            options,
            metadata,
        });
        self.transport.deregister(id);
    }

    /// Where the request with the given id is in its lifecycle.
    ///
    /// Ids handed out by another engine are [`RequestStatus::Unknown`].
    #[must_use]
    pub fn status(&self, id: RequestId) -> RequestStatus {
        if self.index.contains_key(&id) {
            return RequestStatus::Completed;
        }

        self.active
            .get(&id)
            .or_else(|| self.queue.iter().find(|node| node.id == id))
            .map_or(RequestStatus::Unknown, |node| node.state.into())
    }

    /// Result of a finalized request
    #[must_use]
    pub fn result(&self, id: RequestId) -> Option<&ResultRecord<M>> {
        self.index.get(&id).map(|&i| &self.results[i])
    }

    /// All results, in the order in which requests were finalized
    #[must_use]
    pub fn results(&self) -> &[ResultRecord<M>] {
        &self.results
    }

    /// Consume the engine, keeping only the results
    #[must_use]
    pub fn into_results(self) -> Vec<ResultRecord<M>> {
        self.results
    }

    /// Number of requests submitted so far
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.next_seq.try_into().unwrap_or(usize::MAX)
    }

    /// Number of requests waiting for a free slot
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of requests in flight
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Returns `false` once the transport failed fatally
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.fatal.is_none()
    }

    /// Details about the fatal transport failure, if there was one
    #[must_use]
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// The underlying transport
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, e.g. for callers driving their own loop
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
