//! Pontos de integração com os cadastros externos.
//!
//! Fórmulas, pigmentos e histórico pertencem a subsistemas CRUD fora deste
//! crate. O motor de produção fala com eles apenas através dos traits
//! [`FormulaCatalog`], [`PigmentStore`] e [`HistoryStore`]. Duas
//! implementações acompanham o crate: [`MemoryStore`] (testes, demo) e
//! [`JsonFileStore`], que persiste tudo num arquivo JSON para sobreviver a
//! reinícios do processo.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::history::ProductionHistoryEntry;
use crate::model::{Formula, Pigment};

/// Read access to the formula registry.
pub trait FormulaCatalog {
    fn formula(&self, id: &str) -> Option<Formula>;

    /// All formulas available for selection.
    fn formulas(&self) -> Vec<Formula>;
}

/// Storage behind the pigment ledger.
pub trait PigmentStore {
    fn pigment(&self, id: &str) -> Option<Pigment>;

    /// Overwrites the stock on hand of an existing pigment. Unknown ids are
    /// ignored.
    fn set_quantity(&mut self, id: &str, quantity_on_hand: f64) -> Result<(), StoreError>;
}

/// Persistent audit records of production runs.
pub trait HistoryStore {
    fn history_entry(&self, id: &str) -> Option<ProductionHistoryEntry>;

    fn history_entries(&self) -> Vec<ProductionHistoryEntry>;

    fn insert_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError>;

    /// Replaces the entry with the same id. Inserts it when the id is unknown.
    fn update_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError>;

    /// All entries, newest first.
    fn list_history(&self) -> Vec<ProductionHistoryEntry> {
        let mut entries = self.history_entries();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// "Não Finalizada" entries, newest first.
    fn resumable_history(&self) -> Vec<ProductionHistoryEntry> {
        crate::history::resumable(&self.list_history())
            .into_iter()
            .cloned()
            .collect()
    }
}

/// Everything the production machine needs from its collaborators.
pub trait ProductionStore: FormulaCatalog + PigmentStore + HistoryStore {}

impl<T: FormulaCatalog + PigmentStore + HistoryStore> ProductionStore for T {}

/// In-memory catalog, ledger storage and history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pigments: BTreeMap<String, Pigment>,
    #[serde(default)]
    formulas: BTreeMap<String, Formula>,
    #[serde(default)]
    history: Vec<ProductionHistoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pigment(&mut self, pigment: Pigment) {
        self.pigments.insert(pigment.id.clone(), pigment);
    }

    pub fn insert_formula(&mut self, formula: Formula) {
        self.formulas.insert(formula.id.clone(), formula);
    }

    /// Simulates a pigment deleted through the external CRUD.
    pub fn remove_pigment(&mut self, id: &str) -> Option<Pigment> {
        self.pigments.remove(id)
    }

    /// Simulates a formula deleted through the external CRUD.
    pub fn remove_formula(&mut self, id: &str) -> Option<Formula> {
        self.formulas.remove(id)
    }

    pub fn pigments(&self) -> impl Iterator<Item = &Pigment> {
        self.pigments.values()
    }
}

impl FormulaCatalog for MemoryStore {
    fn formula(&self, id: &str) -> Option<Formula> {
        self.formulas.get(id).cloned()
    }

    fn formulas(&self) -> Vec<Formula> {
        self.formulas.values().cloned().collect()
    }
}

impl PigmentStore for MemoryStore {
    fn pigment(&self, id: &str) -> Option<Pigment> {
        self.pigments.get(id).cloned()
    }

    fn set_quantity(&mut self, id: &str, quantity_on_hand: f64) -> Result<(), StoreError> {
        if let Some(p) = self.pigments.get_mut(id) {
            p.quantity_on_hand = quantity_on_hand;
        }
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    fn history_entry(&self, id: &str) -> Option<ProductionHistoryEntry> {
        self.history.iter().find(|e| e.id == id).cloned()
    }

    fn history_entries(&self) -> Vec<ProductionHistoryEntry> {
        self.history.clone()
    }

    fn insert_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError> {
        self.history.push(entry);
        Ok(())
    }

    fn update_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError> {
        match self.history.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.history.push(entry),
        }
        Ok(())
    }
}

/// [`MemoryStore`] persisted as a single JSON document.
///
/// Every mutation is applied to a copy, written to disk, and only then
/// swapped in, so a failed write leaves both memory and disk unchanged.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: MemoryStore,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            MemoryStore::default()
        };
        Ok(Self { path, data })
    }

    /// Applies `f` to the catalog and persists the result.
    pub fn modify(&mut self, f: impl FnOnce(&mut MemoryStore)) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        f(&mut next);
        write_json(&self.path, &next)?;
        self.data = next;
        Ok(())
    }

    fn apply(
        &mut self,
        f: impl FnOnce(&mut MemoryStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        f(&mut next)?;
        write_json(&self.path, &next)?;
        self.data = next;
        Ok(())
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl FormulaCatalog for JsonFileStore {
    fn formula(&self, id: &str) -> Option<Formula> {
        self.data.formula(id)
    }

    fn formulas(&self) -> Vec<Formula> {
        self.data.formulas()
    }
}

impl PigmentStore for JsonFileStore {
    fn pigment(&self, id: &str) -> Option<Pigment> {
        self.data.pigment(id)
    }

    fn set_quantity(&mut self, id: &str, quantity_on_hand: f64) -> Result<(), StoreError> {
        self.apply(|d| d.set_quantity(id, quantity_on_hand))
    }
}

impl HistoryStore for JsonFileStore {
    fn history_entry(&self, id: &str) -> Option<ProductionHistoryEntry> {
        self.data.history_entry(id)
    }

    fn history_entries(&self) -> Vec<ProductionHistoryEntry> {
        self.data.history_entries()
    }

    fn insert_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError> {
        self.apply(|d| d.insert_history(entry))
    }

    fn update_history(&mut self, entry: ProductionHistoryEntry) -> Result<(), StoreError> {
        self.apply(|d| d.update_history(entry))
    }
}
