//! Append-only audit log of the in-memory engine.

use std::collections::HashMap;

use arbiter_core::{AuditEntryId, ResolutionId};

use crate::audit::{AuditLogEntry, AuditRecord};
use crate::error::StoreError;

#[derive(Default)]
pub(super) struct AuditLog {
    trails: HashMap<ResolutionId, Vec<AuditLogEntry>>,
    journal: Vec<ResolutionId>,
}

impl AuditLog {
    pub(super) fn trail(&self, resolution_id: ResolutionId) -> Vec<AuditLogEntry> {
        self.trails.get(&resolution_id).cloned().unwrap_or_default()
    }

    /// Seal the record as the next entry of its resolution's trail.
    pub(super) fn append(&mut self, record: AuditRecord) -> Result<AuditLogEntry, StoreError> {
        let resolution_id = record.resolution_id;
        let trail = self.trails.entry(resolution_id).or_default();
        let entry = AuditLogEntry::seal(record, AuditEntryId::new(), trail.last())
            .map_err(|e| StoreError::Integrity(format!("cannot seal audit entry: {e}")))?;
        trail.push(entry.clone());
        self.journal.push(resolution_id);
        Ok(entry)
    }

    pub(super) fn commit(&mut self) {
        self.journal.clear();
    }

    pub(super) fn rollback(&mut self) {
        while let Some(resolution_id) = self.journal.pop() {
            if let Some(trail) = self.trails.get_mut(&resolution_id) {
                trail.pop();
            }
        }
    }
}
