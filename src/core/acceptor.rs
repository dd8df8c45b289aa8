//! Pure acceptor state machine — no I/O, no async, no synchronization.
//!
//! One `(n_p, n_a, v_a)` triple is kept across all instances and reset
//! wholesale when a decision lands. This is sound because each peer drives
//! at most one proposer round at a time, so the triple only ever describes
//! the instance currently under contention.

use crate::messages::{ALREADY_DECIDED, AcceptArgs, AcceptReply, PrepareArgs, PrepareReply, REJECTED};

use super::types::Slot;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptorCore {
    /// Highest proposal number promised.
    n_p: i64,
    /// Proposal number of the most recent accepted value.
    n_a: i64,
    /// The most recent accepted value.
    v_a: Option<Slot>,
    /// A round has touched this acceptor since the last decision.
    rounding: bool,
}

impl AcceptorCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer a prepare request.
    ///
    /// `settled` is the locally known decided slot for the requested seq, if
    /// any; when present the reply short-circuits into the synthetic
    /// "decided here" form so the proposer adopts the existing decision.
    pub fn prepare(&mut self, args: &PrepareArgs, settled: Option<Slot>) -> PrepareReply {
        self.rounding = true;
        if let Some(slot) = settled {
            self.n_p = args.n;
            return PrepareReply {
                n: args.n,
                n_a: ALREADY_DECIDED,
                v_a: Some(slot),
            };
        }
        if args.n > self.n_p {
            self.n_p = args.n;
            PrepareReply {
                n: args.n,
                n_a: self.n_a,
                v_a: self.v_a.clone(),
            }
        } else {
            PrepareReply {
                n: args.n,
                n_a: REJECTED,
                v_a: None,
            }
        }
    }

    /// Answer an accept request. Rejects outright when no round is in
    /// progress here (the promise that would justify the accept was never
    /// made since the last decision).
    pub fn accept(&mut self, args: &AcceptArgs) -> AcceptReply {
        if !self.rounding {
            return AcceptReply { n: REJECTED };
        }
        if args.n >= self.n_p {
            self.n_p = args.n;
            self.n_a = args.n;
            self.v_a = Some(args.slot.clone());
            AcceptReply { n: args.n }
        } else {
            AcceptReply { n: REJECTED }
        }
    }

    /// Clear all promise/accept state once a decision has landed. The next
    /// round starts from a blank acceptor.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
