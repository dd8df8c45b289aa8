//! In-process mesh transport with configurable loss and partitions.
//!
//! Every peer registers its [`WireHandler`] under its index; calls route
//! through shared state that can drop requests (never delivered), drop
//! replies (delivered, answer discarded — the callee's state still
//! changed), or block links entirely to simulate a partition. Loss
//! decisions come from a seeded RNG so failure scenarios replay
//! deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use error_stack::{Report, ResultExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::TransportError;
use crate::messages::{Reply, Request};

use super::{Transport, WireHandler};

/// Loss probabilities, in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Loss {
    /// Chance a request is silently discarded before delivery.
    pub drop_request: f64,
    /// Chance a reply is discarded after the request was processed.
    pub drop_reply: f64,
}

#[derive(Debug, Default)]
struct MeshState {
    handlers: HashMap<usize, WireHandler>,
    /// Directed links currently blackholed.
    blocked: HashSet<(usize, usize)>,
    loss: Loss,
}

#[derive(Debug)]
struct MeshInner {
    state: Mutex<MeshState>,
    rng: Mutex<StdRng>,
}

/// The shared fabric connecting a set of in-process peers.
#[derive(Clone, Debug)]
pub struct Mesh {
    inner: Arc<MeshInner>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// A mesh whose loss decisions replay deterministically for `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(MeshInner {
                state: Mutex::new(MeshState::default()),
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MeshState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, peer: usize, handler: WireHandler) {
        self.state().handlers.insert(peer, handler);
    }

    pub fn set_loss(&self, loss: Loss) {
        self.state().loss = loss;
    }

    /// Blackhole all traffic between `island` and the rest of the mesh, in
    /// both directions. Links inside the island stay up.
    pub fn partition(&self, island: &[usize]) {
        let mut state = self.state();
        let outsiders: Vec<usize> = state
            .handlers
            .keys()
            .copied()
            .filter(|peer| !island.contains(peer))
            .collect();
        for &inside in island {
            for &outside in &outsiders {
                state.blocked.insert((inside, outside));
                state.blocked.insert((outside, inside));
            }
        }
    }

    /// Restore every blocked link.
    pub fn heal(&self) {
        self.state().blocked.clear();
    }

    /// The transport a single peer uses to reach the others.
    #[must_use]
    pub fn transport(&self, from: usize) -> MeshTransport {
        MeshTransport {
            mesh: self.clone(),
            from,
        }
    }

    fn roll(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.inner
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_bool(probability)
    }
}

/// One peer's view of the [`Mesh`].
#[derive(Clone, Debug)]
pub struct MeshTransport {
    mesh: Mesh,
    from: usize,
}

impl Transport for MeshTransport {
    type Addr = usize;

    async fn call(&self, target: &usize, request: Request) -> Result<Reply, Report<TransportError>> {
        let target = *target;
        let (handler, loss) = {
            let state = self.mesh.state();
            if state.blocked.contains(&(self.from, target)) {
                return Err(Report::new(TransportError::Dropped));
            }
            let handler = state
                .handlers
                .get(&target)
                .cloned()
                .ok_or_else(|| Report::new(TransportError::Unreachable))?;
            (handler, state.loss)
        };

        if self.mesh.roll(loss.drop_request) {
            trace!(from = self.from, to = target, "dropping request");
            return Err(Report::new(TransportError::Dropped));
        }

        let reply = handler
            .handle(request)
            .await
            .change_context(TransportError::Closed)?;

        // the reply path can fail independently of delivery
        let reply_blocked = self.mesh.state().blocked.contains(&(target, self.from));
        if reply_blocked || self.mesh.roll(loss.drop_reply) {
            trace!(from = self.from, to = target, "dropping reply");
            return Err(Report::new(TransportError::Dropped));
        }
        Ok(reply)
    }
}
