//! Razão de pigmentos: estoque autoritativo e baixas.
//!
//! A baixa nunca deixa o estoque negativo: consumo acima do disponível é
//! tolerado e o saldo fica em zero. Pigmentos excluídos são ignorados.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LedgerError, StoreError};
use crate::history::ConsumedPigment;
use crate::model::{Formula, Pigment};
use crate::store::PigmentStore;

/// A formula line the current stock cannot cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shortage {
    pub pigment_id: String,
    pub name: String,
    pub required_ml: f64,
    /// `None` when the pigment was deleted.
    pub on_hand_ml: Option<f64>,
}

/// Ledger operations over a [`PigmentStore`].
pub struct PigmentLedger<'a, S: PigmentStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: PigmentStore + ?Sized> PigmentLedger<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &str) -> Result<Pigment, LedgerError> {
        self.store
            .pigment(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Reduces stock by `ml`, clamped at zero. Returns the new stock, or
    /// `None` when the pigment no longer exists.
    pub fn deduct(&mut self, id: &str, ml: f64) -> Result<Option<f64>, StoreError> {
        let Some(pigment) = self.store.pigment(id) else {
            debug!(pigment_id = id, "deduction skipped, pigment no longer exists");
            return Ok(None);
        };
        let remaining = (pigment.quantity_on_hand - ml.max(0.0)).max(0.0);
        if ml > pigment.quantity_on_hand {
            warn!(
                pigment_id = id,
                requested_ml = ml,
                on_hand_ml = pigment.quantity_on_hand,
                "over-consumption, stock clamped at zero"
            );
        }
        self.store.set_quantity(id, remaining)?;
        Ok(Some(remaining))
    }

    /// Deducts every line of a fixed consumed set, starting at `*applied`.
    ///
    /// `*applied` advances after each successful deduction, so a failed
    /// batch can be retried without deducting a line twice.
    pub fn deduct_all(
        &mut self,
        consumed: &[ConsumedPigment],
        applied: &mut usize,
    ) -> Result<(), StoreError> {
        while let Some(line) = consumed.get(*applied) {
            self.deduct(&line.pigment_id, line.ml_consumed)?;
            *applied += 1;
        }
        Ok(())
    }

    /// Lines of `formula` whose target exceeds the stock on hand.
    pub fn shortages(&self, formula: &Formula) -> Vec<Shortage> {
        formula
            .lines
            .iter()
            .filter_map(|line| {
                let on_hand = self.store.pigment(&line.pigment_id).map(|p| p.quantity_on_hand);
                match on_hand {
                    Some(q) if q >= line.target_ml => None,
                    _ => Some(Shortage {
                        pigment_id: line.pigment_id.clone(),
                        name: line.name.clone(),
                        required_ml: line.target_ml,
                        on_hand_ml: on_hand,
                    }),
                }
            })
            .collect()
    }
}
