//! One client session: the tree, its inbound RPC sequencing and its
//! outbound collection cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::change::DiffBatch;
use crate::config::SessionConfig;
use crate::error::CollectError;
use crate::rpc::{RpcDispatcher, RpcInvocation, RpcRejection};
use crate::tree::StateTree;
use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is closed")]
    SessionClosed,
    #[error("unexpected client id {got}, expected {expected}")]
    UnexpectedClientId { expected: u64, got: u64 },
    #[error("batch holds {got} invocations, limit is {limit}")]
    BatchTooLarge { got: usize, limit: usize },
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// A sequenced batch of invocations from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBatch {
    pub client_id: u64,
    pub invocations: Vec<RpcInvocation>,
}

/// Outcome of a batch that was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub client_id: u64,
    /// `true` if the batch repeated the last processed one and was skipped.
    pub duplicate: bool,
    /// One entry per invocation, in order.
    pub results: Vec<Result<(), RpcRejection>>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.results.len() - self.applied()
    }
}

/// Closes a session from another thread.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    closed: Arc<AtomicBool>,
}

impl SessionCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Smallest session id ever issued.
pub const MIN_SESSION_ID: u64 = 1 << 16;
/// Largest session id ever issued; ids stay exact as JSON numbers.
pub const MAX_SESSION_ID: u64 = (1 << 53) - 1;

fn new_session_id() -> u64 {
    rand::thread_rng().gen_range(MIN_SESSION_ID..=MAX_SESSION_ID)
}

type Callback = Box<dyn FnOnce(&mut StateTree) + Send>;

pub struct Session {
    id: u64,
    tree: StateTree,
    config: SessionConfig,
    dispatcher: RpcDispatcher,
    closed: Arc<AtomicBool>,
    last_client_id: Option<u64>,
    before_response: Vec<(NodeId, Callback)>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("nodes", &self.tree.len())
            .field("last_client_id", &self.last_client_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let mut tree = StateTree::new(config.root_feature_set());
        tree.set_check_invariants(config.check_invariants);
        let id = new_session_id();
        debug!(session = id, "session opened");
        Self {
            id,
            tree,
            dispatcher: RpcDispatcher::new(config.suppress_echo),
            config,
            closed: Arc::new(AtomicBool::new(false)),
            last_client_id: None,
            before_response: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut StateTree {
        &mut self.tree
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(session = self.id, "session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Id the next batch must carry.
    pub fn expected_client_id(&self) -> u64 {
        self.last_client_id.map_or(0, |last| last + 1)
    }

    pub fn handle_rpc_batch(&mut self, batch: RpcBatch) -> Result<BatchReport, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        if Some(batch.client_id) == self.last_client_id {
            warn!(session = self.id, client_id = batch.client_id, "duplicate rpc batch ignored");
            return Ok(BatchReport {
                client_id: batch.client_id,
                duplicate: true,
                results: Vec::new(),
            });
        }
        let expected = self.expected_client_id();
        if batch.client_id != expected {
            warn!(session = self.id, expected, got = batch.client_id, "out of order rpc batch");
            return Err(SessionError::UnexpectedClientId {
                expected,
                got: batch.client_id,
            });
        }
        let limit = self.config.max_batch_invocations;
        if batch.invocations.len() > limit {
            return Err(SessionError::BatchTooLarge {
                got: batch.invocations.len(),
                limit,
            });
        }

        let closed = Arc::clone(&self.closed);
        let (staged, results) = self
            .stage(&batch.invocations, || closed.load(Ordering::SeqCst))
            .map_err(|err| {
                debug!(session = self.id, client_id = batch.client_id, "session closed mid-batch, batch discarded");
                err
            })?;
        self.tree = staged;
        self.last_client_id = Some(batch.client_id);
        let report = BatchReport {
            client_id: batch.client_id,
            duplicate: false,
            results,
        };
        debug!(
            session = self.id,
            client_id = batch.client_id,
            applied = report.applied(),
            rejected = report.rejected(),
            "rpc batch handled"
        );
        Ok(report)
    }

    /// Applies `invocations` to a copy of the tree. The copy is dropped if
    /// `closed` reports the session closed at any point.
    fn stage<F>(
        &self,
        invocations: &[RpcInvocation],
        mut closed: F,
    ) -> Result<(StateTree, Vec<Result<(), RpcRejection>>), SessionError>
    where
        F: FnMut() -> bool,
    {
        let mut staged = self.tree.clone();
        let mut results = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            if closed() {
                return Err(SessionError::SessionClosed);
            }
            results.push(self.dispatcher.dispatch(&mut staged, invocation));
        }
        if closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok((staged, results))
    }

    /// Runs `callback` right before the next collection, if `node` is still
    /// attached by then.
    pub fn before_client_response<F>(&mut self, node: NodeId, callback: F)
    where
        F: FnOnce(&mut StateTree) + Send + 'static,
    {
        self.before_response.push((node, Box::new(callback)));
    }

    pub fn collect(&mut self) -> Result<DiffBatch, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        for (node, callback) in std::mem::take(&mut self.before_response) {
            if self.tree.contains(node) {
                callback(&mut self.tree);
            } else {
                trace!(session = self.id, node = %node, "dropping callback of retired node");
            }
        }
        Ok(self.tree.collect_changes()?)
    }

    /// Starts over with a client that lost its state.
    pub fn resync(&mut self) {
        self.tree.prepare_for_resync();
        info!(session = self.id, "session resync requested");
    }
}
