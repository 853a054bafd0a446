use tokio::time::Instant;

use crate::{Handler, Request, RequestId, RequestOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Queued,
    Active,
    Completed,
}

/// A submitted request and its tracking state
pub(crate) struct Node<M> {
    pub(crate) id: RequestId,
    pub(crate) url: String,
    pub(crate) options: RequestOptions,
    pub(crate) handler: Option<Box<dyn Handler<M>>>,
    pub(crate) metadata: Option<M>,
    pub(crate) submitted_at: Instant,
    /// Recoverable failures observed so far
    pub(crate) retries: u64,
    pub(crate) state: NodeState,
}

impl<M> Node<M> {
    pub(crate) fn new(id: RequestId, request: Request<M>) -> Self {
        let Request {
            url,
            options,
            handler,
            metadata,
        } = request;

        Self {
            id,
            url,
            options,
            handler,
            metadata,
            submitted_at: Instant::now(),
            retries: 0,
            state: NodeState::Queued,
        }
    }
}

impl<M> std::fmt::Debug for Node<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("retries", &self.retries)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
