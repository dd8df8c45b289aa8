//! Core type definitions shared between the pure state machines and the
//! async engine.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Log position. Non-negative; `-1` is reserved for the never-Done watermark.
pub type Seq = i64;

/// One position of the replicated log: a sequence number bundled with the
/// opaque application payload, so acceptors can key decisions without
/// understanding the value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub seq: Seq,
    pub value: Bytes,
}

impl Slot {
    #[must_use]
    pub fn new(seq: Seq, value: impl Into<Bytes>) -> Self {
        Self {
            seq,
            value: value.into(),
        }
    }
}

/// What this peer knows about an instance. Only ever advances
/// Pending -> Decided -> Forgotten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fate {
    /// No decision has been learned here yet.
    Pending,
    /// A value has been chosen and learned.
    Decided,
    /// Decided, then reclaimed because the instance fell below the global
    /// Min watermark. The payload is gone; only the fate remains.
    Forgotten,
}
