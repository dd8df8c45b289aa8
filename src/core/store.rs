//! Instance store: the pending queue of locally-started instances and the
//! decided set, plus the local Done watermark.
//!
//! Fates only move forward. A settled entry is never replaced: the first
//! decision recorded for a seq wins, and reclamation drops the payload but
//! keeps the seq so Status can still answer Forgotten.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::types::{Fate, Seq, Slot};

#[derive(Clone, Debug)]
struct PendingInstance {
    slot: Slot,
    fate: Fate,
}

#[derive(Clone, Debug)]
struct Settled {
    fate: Fate,
    value: Option<Bytes>,
}

#[derive(Clone, Debug)]
pub struct InstanceStore {
    /// Locally-started instances in start order.
    pending: Vec<PendingInstance>,
    /// Scan position: everything before it is settled.
    cursor: usize,
    /// Decided set, Forgotten entries included.
    settled: BTreeMap<Seq, Settled>,
    /// Highest seq the host has passed to Done; -1 until the first call.
    done: Seq,
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            cursor: 0,
            settled: BTreeMap::new(),
            done: -1,
        }
    }

    /// Append a locally-started instance. Duplicate seqs are allowed; the
    /// scan skips whichever of them settles first.
    pub fn push(&mut self, slot: Slot) {
        self.pending.push(PendingInstance {
            slot,
            fate: Fate::Pending,
        });
    }

    /// Advance the cursor past settled instances and return the next one
    /// still awaiting agreement, if any.
    pub fn next_unsettled(&mut self) -> Option<Slot> {
        while let Some(entry) = self.pending.get(self.cursor) {
            if entry.fate == Fate::Decided || self.settled.contains_key(&entry.slot.seq) {
                self.cursor += 1;
            } else {
                return Some(entry.slot.clone());
            }
        }
        None
    }

    /// Record a learned decision. Idempotent: the first value recorded for
    /// a seq is kept, later calls (including for Forgotten seqs) are no-ops.
    /// Returns whether this call inserted the entry.
    pub fn learn(&mut self, slot: Slot) -> bool {
        if self.settled.contains_key(&slot.seq) {
            return false;
        }
        self.settled.insert(
            slot.seq,
            Settled {
                fate: Fate::Decided,
                value: Some(slot.value),
            },
        );
        true
    }

    /// Stamp the pending-queue entry at the cursor Decided, carrying the
    /// chosen slot. Skipped when the chosen seq is not the one the cursor
    /// entry is waiting for (an adopted value from a different slot); that
    /// entry stays pending and a later round settles it.
    pub fn settle_current(&mut self, chosen: &Slot) {
        if let Some(entry) = self.pending.get_mut(self.cursor)
            && entry.slot.seq == chosen.seq
        {
            entry.slot = chosen.clone();
            entry.fate = Fate::Decided;
        }
    }

    /// The decided value for `seq`, available only while it is still
    /// Decided (Forgotten entries have dropped their payload).
    #[must_use]
    pub fn settled_value(&self, seq: Seq) -> Option<Slot> {
        let entry = self.settled.get(&seq)?;
        let value = entry.value.clone()?;
        Some(Slot { seq, value })
    }

    #[must_use]
    pub fn fate(&self, seq: Seq) -> Fate {
        if let Some(entry) = self.settled.get(&seq) {
            entry.fate
        } else if seq <= self.done {
            // reclaimed before this peer ever learned it
            Fate::Forgotten
        } else {
            Fate::Pending
        }
    }

    #[must_use]
    pub fn status(&self, seq: Seq) -> (Fate, Option<Bytes>) {
        match self.settled.get(&seq) {
            Some(entry) => (entry.fate, entry.value.clone()),
            None if seq <= self.done => (Fate::Forgotten, None),
            None => (Fate::Pending, None),
        }
    }

    /// Largest seq in the decided set, Forgotten entries included; 0 when
    /// nothing has ever been decided here.
    #[must_use]
    pub fn max_seq(&self) -> Seq {
        self.settled.keys().next_back().copied().unwrap_or(0)
    }

    /// Host is finished with everything up to and including `seq`: raise
    /// the watermark and reclaim.
    pub fn done_up_to(&mut self, seq: Seq) {
        self.done = self.done.max(seq);
        self.forget_below(self.done + 1);
    }

    /// Reclaim instances with seq strictly below `min`: fate moves to
    /// Forgotten, payload is dropped, the seq itself stays.
    pub fn forget_below(&mut self, min: Seq) {
        for entry in self.settled.range_mut(..min).map(|(_, entry)| entry) {
            if entry.fate == Fate::Decided {
                entry.fate = Fate::Forgotten;
                entry.value = None;
            }
        }
    }

    /// This peer's Done watermark.
    #[must_use]
    pub fn done(&self) -> Seq {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(seq: i64, value: &str) -> Slot {
        Slot::new(seq, value.as_bytes().to_vec())
    }

    #[test]
    fn learn_is_idempotent_and_keeps_first_value() {
        let mut store = InstanceStore::new();
        assert!(store.learn(slot(0, "a")));
        assert!(!store.learn(slot(0, "b")));
        assert_eq!(store.status(0), (Fate::Decided, Some(Bytes::from("a"))));
    }

    #[test]
    fn fate_never_regresses() {
        let mut store = InstanceStore::new();
        store.learn(slot(0, "a"));
        store.done_up_to(0);
        assert_eq!(store.fate(0), Fate::Forgotten);
        // a late duplicate decide must not resurrect the entry
        store.learn(slot(0, "a"));
        assert_eq!(store.fate(0), Fate::Forgotten);
        assert_eq!(store.status(0).1, None);
    }

    #[test]
    fn done_forgets_and_clears_values() {
        let mut store = InstanceStore::new();
        for seq in 0..5 {
            store.learn(slot(seq, "v"));
        }
        store.done_up_to(2);
        for seq in 0..=2 {
            assert_eq!(store.status(seq), (Fate::Forgotten, None));
        }
        assert_eq!(store.status(3), (Fate::Decided, Some(Bytes::from("v"))));
        assert_eq!(store.done(), 2);
    }

    #[test]
    fn done_watermark_is_monotone() {
        let mut store = InstanceStore::new();
        store.done_up_to(3);
        store.done_up_to(1);
        assert_eq!(store.done(), 3);
    }

    #[test]
    fn max_counts_forgotten_entries() {
        let mut store = InstanceStore::new();
        assert_eq!(store.max_seq(), 0);
        store.learn(slot(2, "a"));
        store.learn(slot(5, "b"));
        store.learn(slot(3, "c"));
        assert_eq!(store.max_seq(), 5);
        store.done_up_to(5);
        assert_eq!(store.max_seq(), 5);
    }

    #[test]
    fn status_of_unknown_seq() {
        let mut store = InstanceStore::new();
        assert_eq!(store.status(9), (Fate::Pending, None));
        store.done_up_to(9);
        // reclaimed before it was ever learned here
        assert_eq!(store.status(9), (Fate::Forgotten, None));
        assert_eq!(store.status(10), (Fate::Pending, None));
    }

    #[test]
    fn scan_skips_settled_instances() {
        let mut store = InstanceStore::new();
        store.push(slot(0, "a"));
        store.push(slot(1, "b"));
        store.push(slot(2, "c"));
        assert_eq!(store.next_unsettled(), Some(slot(0, "a")));
        store.learn(slot(0, "a"));
        // a decision learned from another peer advances the scan too
        assert_eq!(store.next_unsettled(), Some(slot(1, "b")));
        store.learn(slot(1, "z"));
        assert_eq!(store.next_unsettled(), Some(slot(2, "c")));
        store.learn(slot(2, "c"));
        assert_eq!(store.next_unsettled(), None);
    }

    #[test]
    fn settle_current_requires_matching_seq() {
        let mut store = InstanceStore::new();
        store.push(slot(0, "mine"));
        assert_eq!(store.next_unsettled(), Some(slot(0, "mine")));
        // adopted value for a different slot leaves the entry pending
        store.settle_current(&slot(7, "other"));
        assert_eq!(store.next_unsettled(), Some(slot(0, "mine")));
        store.settle_current(&slot(0, "chosen"));
        store.learn(slot(0, "chosen"));
        assert_eq!(store.next_unsettled(), None);
    }

    #[test]
    fn duplicate_starts_share_one_decision() {
        let mut store = InstanceStore::new();
        store.push(slot(0, "a"));
        store.push(slot(0, "b"));
        store.learn(slot(0, "a"));
        store.settle_current(&slot(0, "a"));
        assert_eq!(store.next_unsettled(), None);
        assert_eq!(store.status(0), (Fate::Decided, Some(Bytes::from("a"))));
    }
}
