//! Replicated log library built on single-decree Paxos.
//!
//! Each application process embeds one [`Engine`]: peers form a fixed group
//! and agree on a value per log slot, independently for every slot. The
//! host starts agreement with [`LogHandle::start`], polls outcomes with
//! [`LogHandle::status`], and releases memory with [`LogHandle::done`] once
//! it no longer needs a prefix of the log. Nothing is persisted; a crashed
//! peer rejoins empty and catches up through the protocol.
//!
//! # Architecture
//!
//! - [`core`]: pure state machines (acceptor, proposer, instance store)
//! - [`Engine`]: the per-peer event loop that owns them
//! - [`transport`]: request/reply unicast — an in-memory lossy mesh for
//!   tests and a TCP transport for real deployments
//!
//! # Quick Start
//!
//! ```ignore
//! use paxlog::{Engine, EngineConfig, Fate, SystemClock};
//! use paxlog::transport::memory::Mesh;
//!
//! let mesh = Mesh::new();
//! let peers: Vec<usize> = (0..3).collect();
//! let (engine, handle, wire) =
//!     Engine::new(EngineConfig::default(), 0, peers, mesh.transport(0), SystemClock);
//! mesh.register(0, wire);
//! tokio::spawn(engine.run());
//!
//! handle.start(0, "first entry").await?;
//! // ... poll until agreement
//! let (fate, value) = handle.status(0).await?;
//! assert_eq!(fate, Fate::Decided);
//! ```

#![warn(clippy::pedantic)]

pub mod clock;
pub mod config;
pub mod core;
mod engine;
mod error;
mod handle;
pub mod messages;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, TransportError};
pub use handle::LogHandle;
pub use self::core::{Fate, Seq, Slot};
pub use transport::{Transport, WireHandler};
