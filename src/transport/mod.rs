//! Transport seam: request/reply unicast between peers.
//!
//! The engine only ever uses [`Transport::call`] — send one request, await
//! one reply, and treat any error as "the reply never arrived". Inbound
//! requests flow the other way through a [`WireHandler`], which parks the
//! serving task until the engine loop has computed the response.

pub mod memory;
pub mod tcp;

use std::fmt;
use std::future::Future;

use error_stack::Report;
use tokio::sync::{mpsc, oneshot};

use crate::error::{EngineError, TransportError};
use crate::messages::{Reply, Request};

/// Send-and-await-reply unicast. Implementations time out internally; the
/// engine never cancels an in-flight call, it just stops caring about the
/// result.
pub trait Transport: Clone + Send + Sync + 'static {
    type Addr: Clone + fmt::Debug + Send + Sync + 'static;

    fn call(
        &self,
        target: &Self::Addr,
        request: Request,
    ) -> impl Future<Output = Result<Reply, Report<TransportError>>> + Send;
}

/// Hands inbound wire requests to the engine loop and waits for its answer.
///
/// Transport servers hold one of these: enqueue the decoded request, block
/// on the reply sink, write the reply back. The engine computes every
/// response on its single thread, so the response reflects a consistent
/// state snapshot.
#[derive(Clone, Debug)]
pub struct WireHandler {
    tx: mpsc::Sender<(Request, oneshot::Sender<Reply>)>,
}

impl WireHandler {
    pub(crate) fn new(tx: mpsc::Sender<(Request, oneshot::Sender<Reply>)>) -> Self {
        Self { tx }
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] when the engine loop has exited.
    pub async fn handle(&self, request: Request) -> Result<Reply, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        reply_rx.await.map_err(|_| EngineError::Closed)
    }
}
