//! Passagem de retomada ("Retomar") entre duas invocações.
//!
//! Um canal de uso único com capacidade 1: `save` deposita o snapshot,
//! `take` o remove. Uma segunda leitura sem novo `save` não devolve nada,
//! o que impede retomar duas vezes o mesmo estado.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::production::PigmentStep;
use crate::store::write_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub history_entry_id: String,
    pub formula_id: String,
    pub steps: Vec<PigmentStep>,
}

/// Take-once slot holding at most one [`ResumeSnapshot`].
///
/// When backed by a file the slot also survives a process restart; `take`
/// deletes the file.
#[derive(Debug, Default)]
pub struct SnapshotSlot {
    slot: Option<ResumeSnapshot>,
    path: Option<PathBuf>,
}

impl SnapshotSlot {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed slot. An existing file is picked up as the pending snapshot.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let slot = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Some(serde_json::from_str(&contents)?)
        } else {
            None
        };
        Ok(Self {
            slot,
            path: Some(path),
        })
    }

    /// Stores `snapshot`, replacing any snapshot not yet taken.
    pub fn save(&mut self, snapshot: ResumeSnapshot) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            write_json(path, &snapshot)?;
        }
        debug!(history_entry_id = %snapshot.history_entry_id, "resume snapshot saved");
        self.slot = Some(snapshot);
        Ok(())
    }

    /// Removes and returns the pending snapshot.
    pub fn take(&mut self) -> Result<Option<ResumeSnapshot>, StoreError> {
        if let Some(path) = &self.path
            && path.exists()
        {
            std::fs::remove_file(path)?;
        }
        Ok(self.slot.take())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::StepStatus;

    fn snapshot(id: &str) -> ResumeSnapshot {
        ResumeSnapshot {
            history_entry_id: id.into(),
            formula_id: "f1".into(),
            steps: vec![PigmentStep {
                pigment_id: "pa".into(),
                name: "Amarelo".into(),
                code: "AM-01".into(),
                target_ml: 900.0,
                remaining_ml: 600.0,
                status: StepStatus::Pending,
                carried_ml: 300.0,
            }],
        }
    }

    #[test]
    fn take_is_single_use() {
        let mut slot = SnapshotSlot::in_memory();
        slot.save(snapshot("h1")).unwrap();

        assert_eq!(slot.take().unwrap().unwrap().history_entry_id, "h1");
        assert!(slot.take().unwrap().is_none());
        assert!(slot.is_empty());
    }

    #[test]
    fn save_replaces_pending_snapshot() {
        let mut slot = SnapshotSlot::in_memory();
        slot.save(snapshot("h1")).unwrap();
        slot.save(snapshot("h2")).unwrap();
        assert_eq!(slot.take().unwrap().unwrap().history_entry_id, "h2");
    }

    #[test]
    fn file_slot_survives_restart_and_is_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");

        SnapshotSlot::file(&path).unwrap().save(snapshot("h1")).unwrap();

        let mut reopened = SnapshotSlot::file(&path).unwrap();
        let taken = reopened.take().unwrap().unwrap();
        assert_eq!(taken.steps[0].remaining_ml, 600.0);
        assert!(!path.exists());

        let mut again = SnapshotSlot::file(&path).unwrap();
        assert!(again.take().unwrap().is_none());
    }
}
