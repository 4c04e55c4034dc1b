//! Dispute ledger of the in-memory engine.
//!
//! `open_by_outcome` is the uniqueness index for open disputes: an insert
//! checks and claims its `(resolution, outcome)` slot in one step.

use std::collections::HashMap;

use arbiter_core::{ActorRef, DisputeId, OutcomeId, ResolutionId, Timestamp};

use crate::dispute::{Dispute, DisputeStatus};
use crate::error::StoreError;

struct Undo {
    id: DisputeId,
    previous_row: Option<Dispute>,
}

#[derive(Default)]
pub(super) struct DisputeLedger {
    rows: HashMap<DisputeId, Dispute>,
    by_resolution: HashMap<ResolutionId, Vec<DisputeId>>,
    open_by_outcome: HashMap<(ResolutionId, OutcomeId), DisputeId>,
    journal: Vec<Undo>,
}

impl DisputeLedger {
    pub(super) fn get(&self, id: DisputeId) -> Option<&Dispute> {
        self.rows.get(&id)
    }

    pub(super) fn for_resolution(
        &self,
        resolution_id: ResolutionId,
        status: Option<DisputeStatus>,
    ) -> Vec<Dispute> {
        self.by_resolution
            .get(&resolution_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.rows.get(id))
                    .filter(|d| status.map_or(true, |s| d.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of open disputes on the resolution, sorted.
    pub(super) fn open_ids(&self, resolution_id: ResolutionId) -> Vec<DisputeId> {
        let mut ids: Vec<DisputeId> = self
            .open_by_outcome
            .iter()
            .filter(|((rid, _), _)| *rid == resolution_id)
            .map(|(_, id)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub(super) fn count_open(&self, resolution_id: ResolutionId) -> usize {
        self.open_by_outcome
            .keys()
            .filter(|(rid, _)| *rid == resolution_id)
            .count()
    }

    pub(super) fn insert(&mut self, dispute: Dispute) -> Result<Dispute, StoreError> {
        if self.rows.contains_key(&dispute.id) {
            return Err(StoreError::Integrity(format!(
                "dispute {} already exists",
                dispute.id
            )));
        }
        let key = (dispute.resolution_id, dispute.disputed_outcome_id.clone());
        if dispute.is_open() && self.open_by_outcome.contains_key(&key) {
            return Err(StoreError::DuplicateDispute {
                resolution_id: dispute.resolution_id,
                disputed_outcome_id: dispute.disputed_outcome_id,
            });
        }
        self.by_resolution
            .entry(dispute.resolution_id)
            .or_default()
            .push(dispute.id);
        self.write(None, dispute.clone());
        Ok(dispute)
    }

    /// Compare-and-swap `open → to`.
    pub(super) fn review(
        &mut self,
        resolution_id: ResolutionId,
        id: DisputeId,
        to: DisputeStatus,
        reviewer: &ActorRef,
        notes: Option<String>,
        at: Timestamp,
    ) -> Result<Dispute, StoreError> {
        let previous = self
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::DisputeNotFound(id))?;
        if previous.resolution_id != resolution_id {
            return Err(StoreError::Integrity(format!(
                "dispute {id} belongs to {}, not {resolution_id}",
                previous.resolution_id
            )));
        }
        if !previous.is_open() {
            return Err(StoreError::DisputeNotOpen {
                dispute_id: id,
                status: previous.status,
            });
        }
        let mut next = previous.clone();
        next.close(to, reviewer.clone(), notes, at);
        self.write(Some(previous), next.clone());
        Ok(next)
    }

    fn write(&mut self, previous_row: Option<Dispute>, row: Dispute) {
        self.journal.push(Undo {
            id: row.id,
            previous_row,
        });
        self.index(&row);
        self.rows.insert(row.id, row);
    }

    fn index(&mut self, row: &Dispute) {
        let key = (row.resolution_id, row.disputed_outcome_id.clone());
        if row.is_open() {
            self.open_by_outcome.insert(key, row.id);
        } else if self.open_by_outcome.get(&key) == Some(&row.id) {
            self.open_by_outcome.remove(&key);
        }
    }

    pub(super) fn commit(&mut self) {
        self.journal.clear();
    }

    pub(super) fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            let Some(current) = self.rows.remove(&undo.id) else {
                continue;
            };
            let key = (current.resolution_id, current.disputed_outcome_id.clone());
            if self.open_by_outcome.get(&key) == Some(&current.id) {
                self.open_by_outcome.remove(&key);
            }
            match undo.previous_row {
                Some(row) => {
                    self.index(&row);
                    self.rows.insert(row.id, row);
                }
                None => {
                    if let Some(ids) = self.by_resolution.get_mut(&current.resolution_id) {
                        ids.retain(|id| *id != undo.id);
                    }
                }
            }
        }
    }
}
