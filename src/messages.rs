//! Wire protocol messages.
//!
//! Four request/reply pairs delivered over an unreliable unicast transport.
//! Rejections are encoded in-band: `n_a == REJECTED` in a [`PrepareReply`]
//! and `n == REJECTED` in an [`AcceptReply`]. A [`PrepareReply`] with
//! `n_a == ALREADY_DECIDED` and a populated `v_a` is the synthetic
//! "decided here" answer from a peer that has already learned the slot.

use serde::{Deserialize, Serialize};

use crate::core::{Seq, Slot};

/// Rejection sentinel for `PrepareReply::n_a` and `AcceptReply::n`.
pub const REJECTED: i64 = -1;

/// Marker in `PrepareReply::n_a` for the synthetic "decided here" reply.
/// Minted proposal numbers embed wall-clock seconds in their high bits, so a
/// genuine accepted proposal number of 1 cannot occur.
pub const ALREADY_DECIDED: i64 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Prepare(PrepareArgs),
    Accept(AcceptArgs),
    Decide(DecideArgs),
    /// Watermark exchange: asks the peer for the highest seq its host has
    /// passed to Done (`-1` if never called).
    GetDone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Prepare(PrepareReply),
    Accept(AcceptReply),
    Decide(DecideReply),
    Done(DoneReply),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareArgs {
    pub n: i64,
    pub slot: Slot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareReply {
    pub n: i64,
    pub n_a: i64,
    pub v_a: Option<Slot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptArgs {
    pub n: i64,
    pub slot: Slot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptReply {
    pub n: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideArgs {
    pub n: i64,
    pub slot: Slot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideReply {
    pub n: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneReply {
    pub done: Seq,
}
