//! Pure proposer state machine — no I/O, no async.
//!
//! Tracks a single in-flight round: prepare votes, accept votes, the best
//! previously-accepted value seen during prepare, and the phase flags. The
//! engine owns timing (ticks, stall detection) and message fan-out; this
//! type only decides what each reply means.

use crate::messages::{AcceptReply, DecideReply, PrepareReply, REJECTED};

use super::types::{Seq, Slot};

/// Result of folding in one prepare reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Stale, rejected, or already past the prepare phase.
    Ignored,
    /// Counted; majority not yet reached.
    Pending,
    /// Majority of promises. `chosen` is the value to drive through accept:
    /// the highest previously-accepted value if any promise carried one,
    /// otherwise our own.
    Quorum { n: i64, chosen: Slot },
}

/// Result of folding in one accept reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Ignored,
    Pending,
    /// Majority of accepts; broadcast the decision.
    Quorum { n: i64, chosen: Slot },
}

/// Result of folding in one decide reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecideOutcome {
    Ignored,
    /// The round is complete; `chosen` is the value that went through.
    Decided { chosen: Slot },
}

#[derive(Clone, Debug)]
pub struct ProposerCore {
    /// Low 8 bits of every proposal number minted here.
    id: u8,
    num_peers: usize,
    propose_n: i64,
    /// The value being driven. Replaced by an adopted value at prepare
    /// quorum, so by decide time it is the chosen value.
    propose_v: Option<Slot>,
    /// The pending-queue seq this round was started for. Unlike
    /// `propose_v`, never rewritten by adoption.
    round_seq: Seq,
    /// Best "ok" prepare reply carrying a previously-accepted value.
    best_promise: Option<PrepareReply>,
    prepare_votes: usize,
    accept_votes: usize,
    prepared: bool,
    accepted: bool,
    decided: bool,
    /// Highest proposal number ever minted here, for the monotonicity bump.
    last_n: i64,
}

impl ProposerCore {
    /// `id` must be distinct across peers; it is the uniqueness tiebreak
    /// between proposal numbers minted in the same wall-clock second.
    #[must_use]
    pub fn new(id: u8, num_peers: usize) -> Self {
        Self {
            id,
            num_peers,
            propose_n: 0,
            propose_v: None,
            round_seq: 0,
            best_promise: None,
            prepare_votes: 0,
            accept_votes: 0,
            prepared: false,
            accepted: false,
            // no round yet; the first tick may start one immediately
            decided: true,
            last_n: 0,
        }
    }

    /// True when no round is in flight.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.decided
    }

    /// The seq of the instance the current round is driving, if any.
    #[must_use]
    pub fn round_seq(&self) -> Option<Seq> {
        (!self.decided).then_some(self.round_seq)
    }

    /// Give up on the current round without a decision. Used when the
    /// instance it was driving got settled by another peer's broadcast.
    /// Straggling replies for the round are dead after this.
    pub fn abandon(&mut self) {
        self.prepared = true;
        self.accepted = true;
        self.decided = true;
    }

    /// Start a round for `slot`, minting a fresh proposal number
    /// `(unix_seconds << 8) | id`. When the clock has not advanced since
    /// the previous round, the clock portion is bumped instead; the id
    /// stays in the low bits so numbers remain unique across peers.
    pub fn begin_round(&mut self, slot: Slot, unix_seconds: i64) -> i64 {
        let mut n = (unix_seconds << 8) | i64::from(self.id);
        if n <= self.last_n {
            n = self.last_n + (1 << 8);
        }
        self.last_n = n;
        self.propose_n = n;
        self.round_seq = slot.seq;
        self.propose_v = Some(slot);
        self.best_promise = None;
        self.prepare_votes = 0;
        self.accept_votes = 0;
        self.prepared = false;
        self.accepted = false;
        self.decided = false;
        n
    }

    fn majority(&self) -> usize {
        self.num_peers / 2
    }

    /// Fold in a prepare reply from the fan-out.
    pub fn on_prepare_reply(&mut self, reply: &PrepareReply) -> PrepareOutcome {
        if self.prepared || reply.n != self.propose_n || reply.n_a == REJECTED {
            return PrepareOutcome::Ignored;
        }
        if reply.n_a > 0
            && self
                .best_promise
                .as_ref()
                .is_none_or(|best| reply.n_a > best.n_a)
        {
            self.best_promise = Some(reply.clone());
        }
        self.prepare_votes += 1;
        if self.prepare_votes <= self.majority() {
            return PrepareOutcome::Pending;
        }

        let chosen = match self.best_promise.as_ref().and_then(|best| best.v_a.clone()) {
            Some(adopted) => adopted,
            None => {
                let Some(own) = self.propose_v.clone() else {
                    return PrepareOutcome::Ignored;
                };
                own
            }
        };
        self.propose_v = Some(chosen.clone());
        self.prepared = true;
        PrepareOutcome::Quorum {
            n: self.propose_n,
            chosen,
        }
    }

    /// Fold in an accept reply. The rejection sentinel never matches
    /// `propose_n`, so it falls out with the stale replies.
    pub fn on_accept_reply(&mut self, reply: &AcceptReply) -> AcceptOutcome {
        if self.accepted || reply.n != self.propose_n {
            return AcceptOutcome::Ignored;
        }
        self.accept_votes += 1;
        if self.accept_votes <= self.majority() {
            return AcceptOutcome::Pending;
        }
        let Some(chosen) = self.propose_v.clone() else {
            return AcceptOutcome::Ignored;
        };
        self.accepted = true;
        AcceptOutcome::Quorum {
            n: self.propose_n,
            chosen,
        }
    }

    /// Fold in a decide reply. The first matching reply completes the round.
    pub fn on_decide_reply(&mut self, reply: &DecideReply) -> DecideOutcome {
        if self.decided || reply.n != self.propose_n {
            return DecideOutcome::Ignored;
        }
        let Some(chosen) = self.propose_v.clone() else {
            return DecideOutcome::Ignored;
        };
        self.decided = true;
        DecideOutcome::Decided { chosen }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ALREADY_DECIDED;

    fn slot(seq: i64, value: &str) -> Slot {
        Slot::new(seq, value.as_bytes().to_vec())
    }

    fn ok_reply(n: i64) -> PrepareReply {
        PrepareReply {
            n,
            n_a: 0,
            v_a: None,
        }
    }

    #[test]
    fn minting_strictly_increases_without_clock_advance() {
        let mut core = ProposerCore::new(3, 3);
        let n1 = core.begin_round(slot(0, "a"), 1000);
        let n2 = core.begin_round(slot(0, "a"), 1000);
        let n3 = core.begin_round(slot(0, "a"), 1000);
        assert_eq!(n1, (1000 << 8) | 3);
        assert!(n2 > n1);
        assert!(n3 > n2);
        // the peer id survives the bump, keeping numbers globally unique
        assert_eq!(n2 & 0xFF, 3);
        assert_eq!(n3 & 0xFF, 3);
    }

    #[test]
    fn minting_resumes_from_clock_once_it_advances() {
        let mut core = ProposerCore::new(3, 3);
        let n1 = core.begin_round(slot(0, "a"), 1000);
        let n2 = core.begin_round(slot(0, "a"), 2000);
        assert!(n2 > n1);
        assert_eq!(n2, (2000 << 8) | 3);
    }

    #[test]
    fn minting_embeds_peer_id() {
        let mut a = ProposerCore::new(1, 3);
        let mut b = ProposerCore::new(2, 3);
        let na = a.begin_round(slot(0, "a"), 1000);
        let nb = b.begin_round(slot(0, "b"), 1000);
        assert_ne!(na, nb);
        assert_eq!(na & 0xFF, 1);
        assert_eq!(nb & 0xFF, 2);
    }

    #[test]
    fn prepare_quorum_keeps_own_value() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(0, "own"), 1000);
        assert_eq!(core.on_prepare_reply(&ok_reply(n)), PrepareOutcome::Pending);
        let outcome = core.on_prepare_reply(&ok_reply(n));
        assert_eq!(
            outcome,
            PrepareOutcome::Quorum {
                n,
                chosen: slot(0, "own"),
            }
        );
    }

    #[test]
    fn prepare_adopts_highest_accepted() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(0, "own"), 1000);
        core.on_prepare_reply(&PrepareReply {
            n,
            n_a: 500,
            v_a: Some(slot(0, "older")),
        });
        let outcome = core.on_prepare_reply(&PrepareReply {
            n,
            n_a: 900,
            v_a: Some(slot(0, "newer")),
        });
        assert_eq!(
            outcome,
            PrepareOutcome::Quorum {
                n,
                chosen: slot(0, "newer"),
            }
        );
    }

    #[test]
    fn rejection_and_stale_prepare_replies_not_counted() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(0, "own"), 1000);
        assert_eq!(
            core.on_prepare_reply(&PrepareReply {
                n,
                n_a: REJECTED,
                v_a: None,
            }),
            PrepareOutcome::Ignored
        );
        assert_eq!(
            core.on_prepare_reply(&ok_reply(n - 1)),
            PrepareOutcome::Ignored
        );
        // still needs two genuine oks
        assert_eq!(core.on_prepare_reply(&ok_reply(n)), PrepareOutcome::Pending);
    }

    #[test]
    fn late_prepare_replies_after_quorum_ignored() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(0, "own"), 1000);
        core.on_prepare_reply(&ok_reply(n));
        assert!(matches!(
            core.on_prepare_reply(&ok_reply(n)),
            PrepareOutcome::Quorum { .. }
        ));
        assert_eq!(core.on_prepare_reply(&ok_reply(n)), PrepareOutcome::Ignored);
    }

    #[test]
    fn accept_quorum_then_decide() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(7, "v"), 1000);
        core.on_prepare_reply(&ok_reply(n));
        core.on_prepare_reply(&ok_reply(n));
        assert_eq!(
            core.on_accept_reply(&AcceptReply { n }),
            AcceptOutcome::Pending
        );
        assert_eq!(
            core.on_accept_reply(&AcceptReply { n }),
            AcceptOutcome::Quorum {
                n,
                chosen: slot(7, "v"),
            }
        );
        assert_eq!(
            core.on_decide_reply(&DecideReply { n }),
            DecideOutcome::Decided {
                chosen: slot(7, "v"),
            }
        );
        assert!(core.idle());
    }

    #[test]
    fn accept_sentinel_ignored() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(0, "v"), 1000);
        core.on_prepare_reply(&ok_reply(n));
        core.on_prepare_reply(&ok_reply(n));
        assert_eq!(
            core.on_accept_reply(&AcceptReply { n: REJECTED }),
            AcceptOutcome::Ignored
        );
    }

    #[test]
    fn decide_after_adoption_reports_adopted_value() {
        let mut core = ProposerCore::new(0, 3);
        let n = core.begin_round(slot(4, "mine"), 1000);
        core.on_prepare_reply(&PrepareReply {
            n,
            n_a: ALREADY_DECIDED,
            v_a: Some(slot(4, "theirs")),
        });
        let outcome = core.on_prepare_reply(&ok_reply(n));
        assert_eq!(
            outcome,
            PrepareOutcome::Quorum {
                n,
                chosen: slot(4, "theirs"),
            }
        );
        core.on_accept_reply(&AcceptReply { n });
        core.on_accept_reply(&AcceptReply { n });
        assert_eq!(
            core.on_decide_reply(&DecideReply { n }),
            DecideOutcome::Decided {
                chosen: slot(4, "theirs"),
            }
        );
    }

    #[test]
    fn abandon_makes_proposer_idle() {
        let mut core = ProposerCore::new(0, 3);
        core.begin_round(slot(0, "v"), 1000);
        assert_eq!(core.round_seq(), Some(0));
        core.abandon();
        assert!(core.idle());
        assert_eq!(core.round_seq(), None);
    }
}
