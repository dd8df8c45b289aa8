//! Pure state machines for the consensus engine — no I/O, no async.
//!
//! The engine loop in [`crate::Engine`] owns one of each of these and feeds
//! it events; everything here is synchronous and unit-tested in place.
//!
//! - [`types`]: sequence numbers, slots, fates
//! - [`acceptor`]: the per-peer promise/accept state (`AcceptorCore`)
//! - [`proposer`]: the single in-flight round (`ProposerCore`)
//! - [`store`]: pending queue, decided set, Done watermark (`InstanceStore`)

pub(crate) mod acceptor;
pub(crate) mod proposer;
pub(crate) mod store;
pub(crate) mod types;

pub use acceptor::AcceptorCore;
pub use proposer::{AcceptOutcome, DecideOutcome, PrepareOutcome, ProposerCore};
pub use store::InstanceStore;
pub use types::{Fate, Seq, Slot};
