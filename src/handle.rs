//! Host-facing API for one peer's replicated log.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::{Fate, Seq, Slot};
use crate::error::EngineError;

pub(crate) enum Command {
    Start {
        slot: Slot,
        ack: oneshot::Sender<()>,
    },
    Done {
        seq: Seq,
        ack: oneshot::Sender<()>,
    },
    Max {
        reply: oneshot::Sender<Seq>,
    },
    Min {
        reply: oneshot::Sender<Seq>,
    },
    Status {
        seq: Seq,
        reply: oneshot::Sender<(Fate, Option<Bytes>)>,
    },
}

/// Handle the embedding application uses to drive its peer.
///
/// Cloneable; all operations are serialized through the engine loop. Every
/// method except [`min`](Self::min) answers from local state only.
#[derive(Clone, Debug)]
pub struct LogHandle {
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl LogHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, cancel: CancellationToken) -> Self {
        Self { command_tx, cancel }
    }

    async fn command<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Ask the group to agree on `value` for instance `seq`. Returns once
    /// the instance is queued; agreement happens in the background, poll
    /// [`status`](Self::status) for the outcome. The chosen value may be a
    /// different peer's proposal for the same seq.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine has shut down.
    pub async fn start(&self, seq: Seq, value: impl Into<Bytes>) -> Result<(), EngineError> {
        let slot = Slot::new(seq, value);
        self.command(|ack| Command::Start { slot, ack }).await
    }

    /// Tell the group this application is finished with every instance up
    /// to and including `seq`. Memory is reclaimed once all peers say so.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine has shut down.
    pub async fn done(&self, seq: Seq) -> Result<(), EngineError> {
        self.command(|ack| Command::Done { seq, ack }).await
    }

    /// Highest seq known to this peer's decided set, 0 when empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine has shut down.
    pub async fn max(&self) -> Result<Seq, EngineError> {
        self.command(|reply| Command::Max { reply }).await
    }

    /// One more than the minimum Done watermark across all peers.
    ///
    /// Contacts every peer; a peer that does not answer keeps its last
    /// known watermark (initially -1), so an unreachable peer pins Min
    /// until it comes back — by design, since it will need the instances
    /// it missed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine has shut down.
    pub async fn min(&self) -> Result<Seq, EngineError> {
        self.command(|reply| Command::Min { reply }).await
    }

    /// This peer's view of instance `seq`: its fate, and the decided value
    /// while it is still held. Never contacts other peers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine has shut down.
    pub async fn status(&self, seq: Seq) -> Result<(Fate, Option<Bytes>), EngineError> {
        self.command(|reply| Command::Status { seq, reply }).await
    }

    /// Signal shutdown. The engine exits on its next loop iteration;
    /// in-flight fan-outs are left to die with their reply queues.
    pub fn kill(&self) {
        self.cancel.cancel();
    }
}
