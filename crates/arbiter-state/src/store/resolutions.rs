//! Resolution table of the in-memory engine.
//!
//! Keeps one row per resolution, a current-resolution pointer per market and
//! the market history in insertion order. Every write records an undo entry
//! so a failed batch can be rolled back.

use std::collections::HashMap;

use arbiter_core::{MarketId, ResolutionId, Timestamp};

use crate::error::StoreError;
use crate::pagination::{Page, PageRequest};
use crate::resolution::{Resolution, ResolutionFilter, ResolutionPatch, ResolutionStatus};

struct Undo {
    id: ResolutionId,
    market_id: MarketId,
    previous_row: Option<Resolution>,
    previous_current: Option<ResolutionId>,
}

#[derive(Default)]
pub(super) struct ResolutionTable {
    rows: HashMap<ResolutionId, Resolution>,
    current: HashMap<MarketId, ResolutionId>,
    by_market: HashMap<MarketId, Vec<ResolutionId>>,
    journal: Vec<Undo>,
}

impl ResolutionTable {
    pub(super) fn get(&self, id: ResolutionId) -> Option<&Resolution> {
        self.rows.get(&id)
    }

    pub(super) fn require(&self, id: ResolutionId) -> Result<&Resolution, StoreError> {
        self.rows.get(&id).ok_or(StoreError::ResolutionNotFound(id))
    }

    pub(super) fn current(&self, market_id: &MarketId) -> Option<&Resolution> {
        self.current.get(market_id).and_then(|id| self.rows.get(id))
    }

    pub(super) fn history(&self, market_id: &MarketId) -> Vec<Resolution> {
        self.by_market
            .get(market_id)
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn list(&self, filter: &ResolutionFilter, page: PageRequest) -> Page<Resolution> {
        let mut matching: Vec<Resolution> = self
            .rows
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.resolution_date
                .cmp(&a.resolution_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Page::from_ordered(matching, page)
    }

    pub(super) fn insert(&mut self, resolution: Resolution) -> Result<Resolution, StoreError> {
        if self.rows.contains_key(&resolution.id) {
            return Err(StoreError::Integrity(format!(
                "resolution {} already exists",
                resolution.id
            )));
        }
        if resolution.is_current() && self.current.contains_key(&resolution.market_id) {
            return Err(StoreError::DuplicateResolution {
                market_id: resolution.market_id,
            });
        }
        self.by_market
            .entry(resolution.market_id.clone())
            .or_default()
            .push(resolution.id);
        self.write(None, resolution.clone());
        Ok(resolution)
    }

    /// Compare-and-swap: the stored status must be one of `expected`.
    pub(super) fn transition(
        &mut self,
        id: ResolutionId,
        expected: &[ResolutionStatus],
        to: ResolutionStatus,
        patch: &ResolutionPatch,
        at: Timestamp,
    ) -> Result<Resolution, StoreError> {
        let previous = self.require(id)?.clone();
        if !expected.contains(&previous.status) {
            return Err(StoreError::StaleState {
                resolution_id: id,
                expected: expected
                    .iter()
                    .map(ResolutionStatus::as_str)
                    .collect::<Vec<_>>()
                    .join("|"),
                actual: previous.status,
            });
        }
        if !previous.status.can_transition_to(to) {
            return Err(StoreError::Integrity(format!(
                "illegal transition {} -> {to} on resolution {id}",
                previous.status
            )));
        }
        let mut next = previous.clone();
        next.apply(to, patch, at);
        self.write(Some(previous), next.clone());
        Ok(next)
    }

    fn write(&mut self, previous_row: Option<Resolution>, row: Resolution) {
        let previous_current = self.current.get(&row.market_id).copied();
        self.journal.push(Undo {
            id: row.id,
            market_id: row.market_id.clone(),
            previous_row,
            previous_current,
        });
        if row.is_current() {
            self.current.insert(row.market_id.clone(), row.id);
        } else if previous_current == Some(row.id) {
            self.current.remove(&row.market_id);
        }
        self.rows.insert(row.id, row);
    }

    pub(super) fn commit(&mut self) {
        self.journal.clear();
    }

    pub(super) fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo.previous_row {
                Some(row) => {
                    self.rows.insert(undo.id, row);
                }
                None => {
                    self.rows.remove(&undo.id);
                    if let Some(ids) = self.by_market.get_mut(&undo.market_id) {
                        ids.retain(|id| *id != undo.id);
                    }
                }
            }
            match undo.previous_current {
                Some(id) => {
                    self.current.insert(undo.market_id, id);
                }
                None => {
                    self.current.remove(&undo.market_id);
                }
            }
        }
    }
}
