use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{Completion, ErrorKind, Progress, RequestId, RequestOptions, Result, Transport};

/// How the [`MockTransport`] answers one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockReply {
    status: u16,
    body: String,
    error: Option<String>,
    /// Number of `wait` calls before the reply is ready
    waits: usize,
}

impl MockReply {
    pub(crate) fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            error: None,
            waits: 0,
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            error: None,
            waits: 0,
        }
    }

    pub(crate) fn error(detail: &str) -> Self {
        Self {
            status: 0,
            body: String::new(),
            error: Some(detail.to_string()),
            waits: 0,
        }
    }

    /// Only complete after `waits` calls to [`Transport::wait`]
    pub(crate) const fn after(mut self, waits: usize) -> Self {
        self.waits = waits;
        self
    }

    fn into_completion(self, id: RequestId) -> Completion {
        Completion {
            id,
            status_code: self.status,
            error: self.error,
            body: self.body,
        }
    }
}

/// A scripted transport for deterministic engine tests.
///
/// Replies are scripted per URL and consumed one registration at a time.
/// URLs without a script, or with an exhausted one, get the default reply.
#[derive(Debug)]
pub(crate) struct MockTransport {
    scripts: HashMap<String, VecDeque<MockReply>>,
    default_reply: MockReply,
    pending: Vec<(RequestId, MockReply)>,
    ready: VecDeque<Completion>,
    in_flight: HashSet<RequestId>,
    /// Fail the registration after this many successful ones
    fail_register_after: Option<usize>,
    /// Fail `drive_progress` after this many successful calls
    fail_progress_after: Option<usize>,
    progress_calls: usize,

    pub(crate) registered: Vec<(RequestId, String)>,
    pub(crate) registered_at: Vec<Instant>,
    pub(crate) max_in_flight: usize,
    pub(crate) closed: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default_reply: MockReply::ok("ok"),
            pending: Vec::new(),
            ready: VecDeque::new(),
            in_flight: HashSet::new(),
            fail_register_after: None,
            fail_progress_after: None,
            progress_calls: 0,
            registered: Vec::new(),
            registered_at: Vec::new(),
            max_in_flight: 0,
            closed: 0,
        }
    }

    /// Answer registrations of `url` with `replies`, in order
    pub(crate) fn script<I>(mut self, url: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = MockReply>,
    {
        self.scripts
            .entry(url.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub(crate) fn default_reply(mut self, reply: MockReply) -> Self {
        self.default_reply = reply;
        self
    }

    pub(crate) const fn fail_register_after(mut self, registrations: usize) -> Self {
        self.fail_register_after = Some(registrations);
        self
    }

    pub(crate) const fn fail_progress_after(mut self, calls: usize) -> Self {
        self.fail_progress_after = Some(calls);
        self
    }

    /// Number of times `url` was registered
    pub(crate) fn attempts(&self, url: &str) -> usize {
        self.registered.iter().filter(|(_, u)| u == url).count()
    }

    /// Report a completion the engine never registered
    pub(crate) fn inject(&mut self, completion: Completion) {
        self.ready.push_back(completion);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn next_reply(&mut self, url: &str) -> MockReply {
        self.scripts
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn register(&mut self, id: RequestId, url: &str, _options: &RequestOptions) -> Result<()> {
        if self
            .fail_register_after
            .is_some_and(|limit| self.registered.len() >= limit)
        {
            return Err(ErrorKind::TransportFatal("out of handles".to_string()));
        }

        let reply = self.next_reply(url);
        self.registered.push((id, url.to_string()));
        self.registered_at.push(Instant::now());
        self.pending.push((id, reply));
        self.in_flight.insert(id);
        self.max_in_flight = self.max_in_flight.max(self.in_flight.len());
        Ok(())
    }

    fn deregister(&mut self, id: RequestId) {
        self.in_flight.remove(&id);
        self.pending.retain(|(pending, _)| *pending != id);
    }

    fn drive_progress(&mut self) -> Result<Progress> {
        if self
            .fail_progress_after
            .is_some_and(|limit| self.progress_calls >= limit)
        {
            return Err(ErrorKind::TransportFatal("multiplexer broke".to_string()));
        }
        self.progress_calls += 1;

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, reply)| reply.waits == 0);
        self.pending = pending;
        self.ready.extend(
            due.into_iter()
                .map(|(id, reply)| reply.into_completion(id)),
        );
        Ok(Progress::Idle)
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        if !self.ready.is_empty() {
            return true;
        }
        if self.pending.is_empty() {
            tokio::time::sleep(timeout).await;
            return false;
        }

        for (_, reply) in &mut self.pending {
            reply.waits = reply.waits.saturating_sub(1);
        }
        self.pending.iter().any(|(_, reply)| reply.waits == 0)
    }

    fn next_completed(&mut self) -> Option<Completion> {
        self.ready.pop_front()
    }

    fn close(&mut self) {
        self.closed += 1;
        self.pending.clear();
        self.ready.clear();
        self.in_flight.clear();
    }
}
