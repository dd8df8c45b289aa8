//! TCP transport: length-delimited postcard frames, one connection per call.
//!
//! The serving side is an accept loop that spawns a task per connection;
//! each task decodes framed requests, parks on the engine's reply sink, and
//! writes the computed reply back.

use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use error_stack::{Report, ResultExt};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::messages::{Reply, Request};

use super::{Transport, WireHandler};

/// Wraps [`LengthDelimitedCodec`] with postcard serialization. Decodes `Rx`
/// frames, encodes `Tx` frames.
#[derive(Debug)]
pub struct WireCodec<Rx, Tx> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<(Rx, Tx)>,
}

impl<Rx, Tx> Default for WireCodec<Rx, Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rx, Tx> WireCodec<Rx, Tx> {
    /// Max frame length: 16 MB.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(16 * 1024 * 1024)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<Rx, Tx> Decoder for WireCodec<Rx, Tx>
where
    Rx: for<'de> Deserialize<'de>,
{
    type Item = Rx;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = postcard::from_bytes(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<Rx, Tx> Encoder<Tx> for WireCodec<Rx, Tx>
where
    Tx: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: Tx, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = postcard::to_allocvec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(bytes), dst)
    }
}

/// Request/reply unicast over short-lived TCP connections.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    call_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl TcpTransport {
    #[must_use]
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

impl Transport for TcpTransport {
    type Addr = SocketAddr;

    async fn call(
        &self,
        target: &SocketAddr,
        request: Request,
    ) -> Result<Reply, Report<TransportError>> {
        let exchange = async {
            let stream = TcpStream::connect(target)
                .await
                .change_context(TransportError::Connect)?;
            let mut framed = Framed::new(stream, WireCodec::<Reply, Request>::new());
            framed
                .send(request)
                .await
                .change_context(TransportError::Send)?;
            framed
                .next()
                .await
                .ok_or_else(|| Report::new(TransportError::Recv))?
                .change_context(TransportError::Recv)
        };
        tokio::time::timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| Report::new(TransportError::Timeout))?
    }
}

/// Accept connections on `listener` and feed their requests to `handler`.
///
/// Runs until the listener fails or the engine behind `handler` shuts down
/// a connection task (the loop itself only exits on accept errors).
///
/// # Errors
///
/// Returns [`TransportError::Accept`] when accepting a connection fails.
pub async fn serve(
    listener: TcpListener,
    handler: WireHandler,
) -> Result<(), Report<TransportError>> {
    loop {
        let (stream, remote) = listener
            .accept()
            .await
            .change_context(TransportError::Accept)?;
        debug!(%remote, "accepted connection");
        tokio::spawn(handle_connection(stream, handler.clone()));
    }
}

async fn handle_connection(stream: TcpStream, handler: WireHandler) {
    let mut framed = Framed::new(stream, WireCodec::<Request, Reply>::new());
    while let Some(next) = framed.next().await {
        let request = match next {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "dropping connection on malformed frame");
                return;
            }
        };
        let Ok(reply) = handler.handle(request).await else {
            // engine shut down
            return;
        };
        if framed.send(reply).await.is_err() {
            return;
        }
    }
}
