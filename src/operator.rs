//! Operador automático: conduz uma produção carregada até o fim.
//!
//! Usado pela CLI no lugar do operador humano. Inicia (ou retoma) a
//! produção, acompanha a pesagem e aciona "Próximo" a cada pigmento pesado.
//! Com `stop_after`, finaliza manualmente depois de N pigmentos.
//!
//! Se a gravação do resultado falhar, o commit pendente é repetido algumas
//! vezes antes de devolver o erro; a máquina continua com o commit pendente.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::ProductionError;
use crate::production::{
    ActionOutcome, FinishOutcome, LifecycleState, ProductionMachine, ProgressReport,
};
use crate::store::ProductionStore;

/// Commit attempts (the first one included) before giving up.
pub const COMMIT_ATTEMPTS: usize = 3;

const COMMIT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub async fn drive<S: ProductionStore>(
    machine: &mut ProductionMachine<S>,
    stop_after: Option<usize>,
    mut on_progress: impl FnMut(&ProgressReport),
) -> Result<FinishOutcome, ProductionError> {
    let first = match machine.lifecycle() {
        LifecycleState::Paused => machine.resume(),
        _ => machine.start(),
    };
    if let ActionOutcome::Finished(outcome) = settle(machine, first).await? {
        return Ok(outcome);
    }

    let mut weighed = 0;
    loop {
        if stop_after.is_some_and(|n| weighed >= n) {
            info!(weighed, "stopping early, finalizing manually");
            let outcome = machine.finalize();
            return finished(settle(machine, outcome).await?);
        }

        machine.wait_until_weighed().await;
        on_progress(&machine.progress());
        weighed += 1;

        if stop_after.is_some_and(|n| weighed >= n) {
            continue;
        }
        let next = machine.advance();
        if let ActionOutcome::Finished(outcome) = settle(machine, next).await? {
            on_progress(&machine.progress());
            return Ok(outcome);
        }
    }
}

/// Retries a commit that failed to persist, up to [`COMMIT_ATTEMPTS`].
async fn settle<S: ProductionStore>(
    machine: &mut ProductionMachine<S>,
    mut result: Result<ActionOutcome, ProductionError>,
) -> Result<ActionOutcome, ProductionError> {
    let mut attempt = 1;
    loop {
        match result {
            Err(ProductionError::Persistence(ref e))
                if attempt < COMMIT_ATTEMPTS && machine.pending_commit().is_some() =>
            {
                warn!(error = %e, attempt, "commit failed, retrying");
            }
            other => return other,
        }
        tokio::time::sleep(COMMIT_RETRY_DELAY).await;
        result = machine.retry_commit().map(ActionOutcome::Finished);
        attempt += 1;
    }
}

fn finished(outcome: ActionOutcome) -> Result<FinishOutcome, ProductionError> {
    match outcome {
        ActionOutcome::Finished(outcome) => Ok(outcome),
        _ => Err(ProductionError::InvalidTransition {
            action: "finalize",
            state: LifecycleState::Running,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::FinalState;
    use crate::sample::sample_catalog;
    use crate::sensor::FixedSensor;
    use crate::snapshot::SnapshotSlot;
    use crate::error::StoreError;
    use crate::history::ProductionHistoryEntry;
    use crate::model::{Formula, Pigment};
    use crate::store::{FormulaCatalog, HistoryStore, MemoryStore, PigmentStore};

    fn machine() -> ProductionMachine<MemoryStore> {
        ProductionMachine::new(
            sample_catalog(),
            SnapshotSlot::in_memory(),
            FixedSensor(45.0),
            Duration::from_millis(10),
        )
    }

    /// Sample catalog whose next `failures` history writes are rejected.
    struct UnreliableHistory {
        inner: MemoryStore,
        failures: usize,
    }

    impl UnreliableHistory {
        fn write(&mut self) -> Result<(), StoreError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(StoreError::Rejected("history offline".into()));
            }
            Ok(())
        }
    }

    impl FormulaCatalog for UnreliableHistory {
        fn formula(&self, id: &str) -> Option<Formula> {
            self.inner.formula(id)
        }
        fn formulas(&self) -> Vec<Formula> {
            self.inner.formulas()
        }
    }

    impl PigmentStore for UnreliableHistory {
        fn pigment(&self, id: &str) -> Option<Pigment> {
            self.inner.pigment(id)
        }
        fn set_quantity(&mut self, id: &str, q: f64) -> Result<(), StoreError> {
            self.inner.set_quantity(id, q)
        }
    }

    impl HistoryStore for UnreliableHistory {
        fn history_entry(&self, id: &str) -> Option<ProductionHistoryEntry> {
            self.inner.history_entry(id)
        }
        fn history_entries(&self) -> Vec<ProductionHistoryEntry> {
            self.inner.history_entries()
        }
        fn insert_history(&mut self, e: ProductionHistoryEntry) -> Result<(), StoreError> {
            self.write()?;
            self.inner.insert_history(e)
        }
        fn update_history(&mut self, e: ProductionHistoryEntry) -> Result<(), StoreError> {
            self.write()?;
            self.inner.update_history(e)
        }
    }

    fn unreliable(failures: usize) -> ProductionMachine<UnreliableHistory> {
        ProductionMachine::new(
            UnreliableHistory {
                inner: sample_catalog(),
                failures,
            },
            SnapshotSlot::in_memory(),
            FixedSensor(45.0),
            Duration::from_millis(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn drives_formula_to_completion() {
        let mut m = machine();
        m.select_formula("f-ceu").unwrap();
        let mut reports = 0;
        let outcome = drive(&mut m, None, |_| reports += 1).await.unwrap();

        let FinishOutcome::Recorded { entry, .. } = outcome else {
            panic!("expected history entry");
        };
        assert_eq!(entry.final_state, FinalState::Finalizada);
        assert!(reports >= 2);
        assert_eq!(
            m.store().pigment("pg-azul").unwrap().quantity_on_hand,
            1_800.0 - 90.0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_leaves_unfinished_entry_that_can_be_resumed() {
        let mut m = machine();
        m.select_formula("f-ocre").unwrap();
        let outcome = drive(&mut m, Some(1), |_| {}).await.unwrap();

        let FinishOutcome::Recorded { entry, .. } = outcome else {
            panic!("expected history entry");
        };
        assert_eq!(entry.final_state, FinalState::NaoFinalizada);
        assert_eq!(entry.consumed_pigments.len(), 1);
        assert_eq!(entry.consumed_pigments[0].ml_consumed, 540.0);

        m.resume_history(&entry.id).unwrap();
        let outcome = drive(&mut m, None, |_| {}).await.unwrap();
        let FinishOutcome::Recorded { entry: done, updated } = outcome else {
            panic!("expected history entry");
        };
        assert!(updated);
        assert_eq!(done.id, entry.id);
        assert_eq!(done.final_state, FinalState::Finalizada);
        assert_eq!(m.store().list_history().len(), 1);
        assert_eq!(
            m.store().pigment("pg-branco").unwrap().quantity_on_hand,
            18_000.0 - 540.0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_zero_uses_no_material() {
        let mut m = machine();
        m.select_formula("f-ocre").unwrap();
        let outcome = drive(&mut m, Some(0), |_| {}).await.unwrap();
        assert_eq!(outcome, FinishOutcome::NoMaterialUsed);
        assert!(m.store().list_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_history_failure_is_retried() {
        let mut m = unreliable(COMMIT_ATTEMPTS - 1);
        m.select_formula("f-ceu").unwrap();
        let outcome = drive(&mut m, None, |_| {}).await.unwrap();

        assert!(matches!(outcome, FinishOutcome::Recorded { updated: false, .. }));
        assert_eq!(m.store().list_history().len(), 1);
        assert_eq!(
            m.store().pigment("pg-azul").unwrap().quantity_on_hand,
            1_800.0 - 90.0
        );
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_history_failure_keeps_commit_pending() {
        let mut m = unreliable(usize::MAX);
        m.select_formula("f-ceu").unwrap();
        let err = drive(&mut m, None, |_| {}).await.unwrap_err();

        assert!(matches!(err, ProductionError::Persistence(_)));
        assert_eq!(m.lifecycle(), LifecycleState::Completed);
        let pending = m.pending_commit().expect("commit stays pending");
        assert_eq!(pending.entry.final_state, FinalState::Finalizada);
        assert_eq!(pending.applied, pending.deductions.len());
        assert!(m.store().list_history().is_empty());

        m.store_mut().failures = 0;
        let outcome = m.retry_commit().unwrap();
        assert!(matches!(outcome, FinishOutcome::Recorded { .. }));
        assert_eq!(m.store().list_history().len(), 1);
        // Retries never deduct twice.
        assert_eq!(
            m.store().pigment("pg-azul").unwrap().quantity_on_hand,
            1_800.0 - 90.0
        );
    }
}
