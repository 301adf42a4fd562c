//! The coalescing queue of pending changes.

use crate::model::{ChangeOp, Model, ModelId, PendingChange};
use std::collections::VecDeque;

/// Outcome of tracking a local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The change was queued, possibly replacing a previous entry for
    /// the same record.
    Queued,
    /// A delete cancelled a create that never reached the server; the
    /// queue holds nothing for the id and no network call is needed.
    Elided,
}

/// A queue of local changes awaiting push, coalesced per record.
///
/// # Invariants
///
/// - At most one entry per record id.
/// - Edits to a record whose create has not been pushed collapse into
///   a single create carrying the latest snapshot.
/// - A delete of a record whose create has not been pushed removes the
///   id from the queue entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeQueue {
    entries: VecDeque<PendingChange>,
}

impl ChangeQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Rebuilds a queue from persisted entries, re-tracking each one so
    /// the per-id invariant holds even if the stored form was stale.
    pub fn from_entries(entries: Vec<PendingChange>) -> Self {
        let mut queue = Self::new();
        for entry in entries {
            queue.track(entry.operation, entry.model);
        }
        queue
    }

    /// Records that `model` must eventually be reconciled with the
    /// server, applying the coalescing rules.
    pub fn track(&mut self, operation: ChangeOp, model: Model) -> TrackOutcome {
        let previous = self.take(&model.id);
        let previous_op = previous.map(|entry| entry.operation);

        match operation {
            // Edits before the first push stay a single create with the
            // newest snapshot; the server must never see an update for
            // a record it has not created.
            ChangeOp::Update if previous_op == Some(ChangeOp::Create) => {
                self.entries
                    .push_back(PendingChange::new(ChangeOp::Create, model));
                TrackOutcome::Queued
            }
            // Deleting a never-pushed create leaves nothing to send.
            ChangeOp::Delete if previous_op == Some(ChangeOp::Create) => TrackOutcome::Elided,
            _ => {
                self.entries.push_back(PendingChange::new(operation, model));
                TrackOutcome::Queued
            }
        }
    }

    /// Removes and returns the entry for `id`, if any.
    fn take(&mut self, id: &ModelId) -> Option<PendingChange> {
        let position = self.entries.iter().position(|entry| entry.id() == *id)?;
        self.entries.remove(position)
    }

    /// Removes the entry for `id`. Returns true if one existed.
    pub fn remove(&mut self, id: &ModelId) -> bool {
        self.take(id).is_some()
    }

    /// Settles a push acknowledgment: drops each acked id whose queued
    /// entry is still the snapshot that was sent. An entry re-tracked
    /// while the push was on the wire carries a newer snapshot and
    /// stays queued for the next push. Returns the ids settled.
    pub fn settle(&mut self, sent: &[PendingChange], acked: &[ModelId]) -> Vec<ModelId> {
        let mut settled = Vec::with_capacity(acked.len());
        for id in acked {
            let pushed = sent.iter().find(|entry| entry.id() == *id);
            if pushed.is_some() && self.get(id) == pushed {
                self.remove(id);
                settled.push(*id);
            }
        }
        settled
    }

    /// Returns the entry for `id`, if any.
    pub fn get(&self, id: &ModelId) -> Option<&PendingChange> {
        self.entries.iter().find(|entry| entry.id() == *id)
    }

    /// Returns true if an entry for `id` is queued.
    pub fn contains(&self, id: &ModelId) -> bool {
        self.get(id).is_some()
    }

    /// Iterates over the queued entries.
    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.entries.iter()
    }

    /// Clones the queued entries, oldest first.
    pub fn snapshot(&self) -> Vec<PendingChange> {
        self.entries.iter().cloned().collect()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
