//! Máquina de produção: dona da única produção ativa e do seu ticker.
//!
//! O ticker é uma tarefa tokio periódica, a única fonte de mutação de
//! `remaining_ml`. Seu `JoinHandle` fica junto do estado da produção e é
//! abortado em toda transição que sai de RUNNING. Ticks atrasados que
//! escapem do abort são descartados pela geração da produção.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::run::{ProductionRun, StepStatus, TickOutcome};
use super::state::{Action, LifecycleState, StateMachine, Transition};
use crate::config::ProductionConfig;
use crate::cost::consumption_cost;
use crate::error::ProductionError;
use crate::history::{
    ConsumedPigment, FinalState, ProductionHistoryEntry, compute_resume_snapshot,
};
use crate::ledger::PigmentLedger;
use crate::model::Formula;
use crate::sensor::{RandomSensor, WeighingSensor};
use crate::snapshot::{ResumeSnapshot, SnapshotSlot};
use crate::store::ProductionStore;

type SharedSensor = Arc<Mutex<Box<dyn WeighingSensor>>>;

/// How a terminal run was committed.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// History written. `updated` is true when an unfinished entry was
    /// overwritten rather than a new one created.
    Recorded {
        entry: ProductionHistoryEntry,
        updated: bool,
    },
    /// Nothing was weighed: no deduction, no history entry.
    NoMaterialUsed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Weighing { step_index: usize },
    Paused,
    Finished(FinishOutcome),
}

/// Effects of a terminal transition, computed once and kept until they are
/// persisted.
#[derive(Debug, Clone)]
pub struct PendingCommit {
    pub entry: ProductionHistoryEntry,
    pub deductions: Vec<ConsumedPigment>,
    /// Number of `deductions` already applied to the ledger.
    pub applied: usize,
    pub updates_existing: bool,
}

impl PendingCommit {
    fn from_run(run: &ProductionRun, store: &impl ProductionStore) -> Self {
        let consumed = run.consumed_set();
        let final_cost = consumption_cost(&consumed, store).total;
        let final_state = match run.lifecycle {
            LifecycleState::Completed => FinalState::Finalizada,
            _ => FinalState::NaoFinalizada,
        };
        let entry = ProductionHistoryEntry {
            id: run
                .history_entry_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: Utc::now(),
            formula_id: run.formula_id.clone(),
            formula_name: run.formula_name.clone(),
            formula_code: run.formula_code.clone(),
            consumed_pigments: consumed,
            final_state,
            final_cost,
        };
        Self {
            entry,
            deductions: run.ledger_deductions(),
            applied: 0,
            updates_existing: run.history_entry_id.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepProgress {
    pub pigment_id: String,
    pub name: String,
    pub code: String,
    pub target_ml: f64,
    pub remaining_ml: f64,
    pub weighed_ml: f64,
    pub percent: f64,
    pub status: StepStatus,
}

/// Read-only view of the active run for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub lifecycle: LifecycleState,
    pub formula_id: Option<String>,
    pub formula_name: Option<String>,
    pub current_step_index: Option<usize>,
    pub awaiting_advance: bool,
    pub steps: Vec<StepProgress>,
    /// Cost of the material weighed so far, at current prices.
    pub live_cost: f64,
    pub pending_commit: bool,
}

struct ActiveRun {
    run: Arc<Mutex<ProductionRun>>,
    ticker: Option<JoinHandle<()>>,
    pending: Option<PendingCommit>,
}

impl ActiveRun {
    fn new(run: ProductionRun) -> Self {
        Self {
            run: Arc::new(Mutex::new(run)),
            ticker: None,
            pending: None,
        }
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    /// A fresh run nobody started yet may be swapped for another formula.
    fn is_replaceable(&self) -> bool {
        let run = self.run.lock();
        self.pending.is_none() && run.lifecycle == LifecycleState::Ready && !run.from_snapshot
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

fn spawn_ticker(
    run: Arc<Mutex<ProductionRun>>,
    sensor: SharedSensor,
    period: Duration,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let increment = sensor.lock().next_increment();
            let outcome = run.lock().tick(generation, increment);
            match outcome {
                TickOutcome::Weighing { remaining_ml } => {
                    trace!(remaining_ml, "weighing tick");
                }
                TickOutcome::Weighed { step_index } => {
                    debug!(step_index, "step weighed, awaiting advance");
                    break;
                }
                TickOutcome::Stale => break,
            }
        }
    })
}

/// Drives the single active production run.
pub struct ProductionMachine<S: ProductionStore> {
    store: S,
    snapshots: SnapshotSlot,
    sensor: SharedSensor,
    tick_interval: Duration,
    active: Option<ActiveRun>,
}

impl<S: ProductionStore> ProductionMachine<S> {
    pub fn new(
        store: S,
        snapshots: SnapshotSlot,
        sensor: impl WeighingSensor,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            snapshots,
            sensor: Arc::new(Mutex::new(Box::new(sensor))),
            tick_interval,
            active: None,
        }
    }

    /// Machine with a random sensor tuned by `config`.
    pub fn from_config(store: S, snapshots: SnapshotSlot, config: &ProductionConfig) -> Self {
        Self::new(
            store,
            snapshots,
            RandomSensor::new(config.min_increment_ml, config.max_increment_ml),
            config.tick_interval(),
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access for collaborators (external CRUD) while the machine lives.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.active
            .as_ref()
            .map_or(LifecycleState::Idle, |a| a.run.lock().lifecycle)
    }

    /// Copy of the active run's state.
    pub fn run(&self) -> Option<ProductionRun> {
        self.active.as_ref().map(|a| a.run.lock().clone())
    }

    pub fn pending_commit(&self) -> Option<&PendingCommit> {
        self.active.as_ref().and_then(|a| a.pending.as_ref())
    }

    /// Formulas offered for selection.
    pub fn formulas(&self) -> Vec<Formula> {
        self.store.formulas()
    }

    fn ensure_can_load(&self) -> Result<(), ProductionError> {
        match &self.active {
            Some(active) if !active.is_replaceable() => Err(ProductionError::RunAlreadyActive),
            _ => Ok(()),
        }
    }

    fn install(&mut self, run: ProductionRun) {
        info!(
            formula_id = %run.formula_id,
            lifecycle = %run.lifecycle,
            steps = run.steps.len(),
            "production run loaded"
        );
        self.active = Some(ActiveRun::new(run));
    }

    /// Loads a fresh run for `formula_id` in `Ready`.
    ///
    /// A deleted formula leaves the machine without a selection.
    pub fn select_formula(&mut self, formula_id: &str) -> Result<(), ProductionError> {
        self.ensure_can_load()?;
        let Some(formula) = self.store.formula(formula_id) else {
            warn!(formula_id, "formula not found, nothing selected");
            self.active = None;
            return Err(ProductionError::NoFormulaSelected);
        };

        for shortage in PigmentLedger::new(&mut self.store).shortages(&formula) {
            warn!(
                pigment_id = %shortage.pigment_id,
                required_ml = shortage.required_ml,
                on_hand_ml = ?shortage.on_hand_ml,
                "insufficient stock for formula line"
            );
        }
        self.install(ProductionRun::from_formula(&formula));
        Ok(())
    }

    /// "Retomar": rebuilds step state for an unfinished history entry and
    /// leaves it in the snapshot slot.
    ///
    /// Refused while another run is active, so the slot never holds a
    /// snapshot that nobody is about to load.
    pub fn request_resume(&mut self, history_entry_id: &str) -> Result<ResumeSnapshot, ProductionError> {
        self.ensure_can_load()?;
        let entry = self
            .store
            .history_entry(history_entry_id)
            .ok_or_else(|| ProductionError::HistoryEntryNotFound(history_entry_id.to_string()))?;
        if !entry.is_resumable() {
            return Err(ProductionError::NothingToResume);
        }
        let formula = self
            .store
            .formula(&entry.formula_id)
            .ok_or_else(|| ProductionError::FormulaNotFound(entry.formula_id.clone()))?;

        let snapshot = compute_resume_snapshot(&entry, &formula);
        self.snapshots.save(snapshot.clone())?;
        Ok(snapshot)
    }

    /// Consumes the pending snapshot and loads the reconstructed run in `Paused`.
    pub fn load_snapshot(&mut self) -> Result<(), ProductionError> {
        self.ensure_can_load()?;
        let snapshot = self.snapshots.take()?.ok_or(ProductionError::NothingToResume)?;
        let formula = self
            .store
            .formula(&snapshot.formula_id)
            .ok_or_else(|| ProductionError::FormulaNotFound(snapshot.formula_id.clone()))?;
        self.install(ProductionRun::from_snapshot(snapshot, &formula));
        Ok(())
    }

    /// `request_resume` followed by `load_snapshot`. A snapshot that fails
    /// to load is discarded.
    pub fn resume_history(&mut self, history_entry_id: &str) -> Result<(), ProductionError> {
        self.request_resume(history_entry_id)?;
        let loaded = self.load_snapshot();
        if loaded.is_err() {
            self.snapshots.take()?;
        }
        loaded
    }

    pub fn start(&mut self) -> Result<ActionOutcome, ProductionError> {
        self.apply(Action::Start)
    }

    pub fn pause(&mut self) -> Result<ActionOutcome, ProductionError> {
        self.apply(Action::Pause)
    }

    pub fn resume(&mut self) -> Result<ActionOutcome, ProductionError> {
        self.apply(Action::Resume)
    }

    pub fn advance(&mut self) -> Result<ActionOutcome, ProductionError> {
        self.apply(Action::Advance)
    }

    pub fn finalize(&mut self) -> Result<ActionOutcome, ProductionError> {
        self.apply(Action::Finalize)
    }

    fn apply(&mut self, action: Action) -> Result<ActionOutcome, ProductionError> {
        let active = self
            .active
            .as_mut()
            .ok_or(ProductionError::NoFormulaSelected)?;

        let (transition, generation, awaiting_advance) = {
            let mut run = active.run.lock();
            let transition = StateMachine::apply(&mut run, action)?;
            (transition, run.generation, run.awaiting_advance())
        };
        active.cancel_ticker();
        info!(action = action.as_str(), ?transition, "production transition");

        match transition {
            Transition::Weighing { step_index } => {
                if !awaiting_advance {
                    active.ticker = Some(spawn_ticker(
                        Arc::clone(&active.run),
                        Arc::clone(&self.sensor),
                        self.tick_interval,
                        generation,
                    ));
                }
                Ok(ActionOutcome::Weighing { step_index })
            }
            Transition::Paused => Ok(ActionOutcome::Paused),
            Transition::Terminal(_) => {
                let pending = PendingCommit::from_run(&active.run.lock(), &self.store);
                active.pending = Some(pending);
                self.commit().map(ActionOutcome::Finished)
            }
        }
    }

    /// Retries persisting a terminal run whose commit failed. Deductions
    /// already applied are not repeated.
    pub fn retry_commit(&mut self) -> Result<FinishOutcome, ProductionError> {
        self.commit()
    }

    fn commit(&mut self) -> Result<FinishOutcome, ProductionError> {
        let state = self.lifecycle();
        let Some(pending) = self.active.as_mut().and_then(|a| a.pending.as_mut()) else {
            return Err(ProductionError::InvalidTransition {
                action: "commit",
                state,
            });
        };

        if pending.entry.consumed_pigments.is_empty() {
            info!("production finished without material use");
            self.active = None;
            return Ok(FinishOutcome::NoMaterialUsed);
        }

        if let Err(e) =
            PigmentLedger::new(&mut self.store).deduct_all(&pending.deductions, &mut pending.applied)
        {
            error!(error = %e, applied = pending.applied, "ledger deduction failed, commit pending");
            return Err(e.into());
        }

        let updated = pending.updates_existing;
        let written = if updated {
            self.store.update_history(pending.entry.clone())
        } else {
            self.store.insert_history(pending.entry.clone())
        };
        if let Err(e) = written {
            error!(error = %e, "history write failed, commit pending");
            return Err(e.into());
        }

        let entry = pending.entry.clone();
        info!(
            history_entry_id = %entry.id,
            final_state = %entry.final_state,
            final_cost = entry.final_cost,
            updated,
            "production committed"
        );
        self.active = None;
        Ok(FinishOutcome::Recorded { entry, updated })
    }

    pub fn progress(&self) -> ProgressReport {
        let Some(active) = &self.active else {
            return ProgressReport {
                lifecycle: LifecycleState::Idle,
                formula_id: None,
                formula_name: None,
                current_step_index: None,
                awaiting_advance: false,
                steps: Vec::new(),
                live_cost: 0.0,
                pending_commit: false,
            };
        };

        let run = active.run.lock();
        let steps = run
            .steps
            .iter()
            .map(|s| StepProgress {
                pigment_id: s.pigment_id.clone(),
                name: s.name.clone(),
                code: s.code.clone(),
                target_ml: s.target_ml,
                remaining_ml: s.remaining_ml,
                weighed_ml: s.weighed_ml(),
                percent: s.percent(),
                status: s.status,
            })
            .collect();

        ProgressReport {
            lifecycle: run.lifecycle,
            formula_id: Some(run.formula_id.clone()),
            formula_name: Some(run.formula_name.clone()),
            current_step_index: run.current_step().map(|_| run.current_step_index),
            awaiting_advance: run.awaiting_advance(),
            steps,
            live_cost: consumption_cost(&run.consumed_set(), &self.store).total,
            pending_commit: active.pending.is_some(),
        }
    }

    /// Waits until the current step is weighed or the run stops running.
    pub async fn wait_until_weighed(&self) -> LifecycleState {
        loop {
            let lifecycle = self.lifecycle();
            let weighing = self
                .active
                .as_ref()
                .is_some_and(|a| !a.run.lock().awaiting_advance());
            if lifecycle != LifecycleState::Running || !weighing {
                return lifecycle;
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::history::FinalState;
    use crate::model::Pigment;
    use crate::sensor::FixedSensor;
    use crate::store::{FormulaCatalog, HistoryStore, MemoryStore, PigmentStore};

    const TICK: Duration = Duration::from_millis(100);

    fn catalog() -> MemoryStore {
        let mut store = MemoryStore::new();
        let a = Pigment::new("pa", "Amarelo Óxido", "AM-01", 5000.0, 90.0);
        let b = Pigment::new("pb", "Preto Carbono", "PR-01", 5000.0, 180.0);
        store.insert_formula(
            Formula::new("f1", "Ocre Colonial", "OC-10")
                .with_line(&a, 900.0)
                .with_line(&b, 900.0),
        );
        store.insert_pigment(a);
        store.insert_pigment(b);
        store
    }

    fn machine_with(store: MemoryStore, increment: f64) -> ProductionMachine<MemoryStore> {
        ProductionMachine::new(store, SnapshotSlot::in_memory(), FixedSensor(increment), TICK)
    }

    fn stock(m: &ProductionMachine<impl ProductionStore>, id: &str) -> f64 {
        m.store().pigment(id).unwrap().quantity_on_hand
    }

    fn remaining(m: &ProductionMachine<impl ProductionStore>, step: usize) -> f64 {
        m.run().unwrap().steps[step].remaining_ml
    }

    async fn run_to_completion(m: &mut ProductionMachine<impl ProductionStore>) -> FinishOutcome {
        loop {
            m.wait_until_weighed().await;
            match m.advance().unwrap() {
                ActionOutcome::Finished(outcome) => return outcome,
                ActionOutcome::Weighing { .. } => continue,
                ActionOutcome::Paused => panic!("unexpected pause"),
            }
        }
    }

    /// Store whose history writes can be made to fail.
    struct FlakyStore {
        inner: MemoryStore,
        fail_history: bool,
    }

    impl FormulaCatalog for FlakyStore {
        fn formula(&self, id: &str) -> Option<Formula> {
            self.inner.formula(id)
        }
        fn formulas(&self) -> Vec<Formula> {
            self.inner.formulas()
        }
    }

    impl PigmentStore for FlakyStore {
        fn pigment(&self, id: &str) -> Option<Pigment> {
            self.inner.pigment(id)
        }
        fn set_quantity(&mut self, id: &str, q: f64) -> Result<(), StoreError> {
            self.inner.set_quantity(id, q)
        }
    }

    impl HistoryStore for FlakyStore {
        fn history_entry(&self, id: &str) -> Option<ProductionHistoryEntry> {
            self.inner.history_entry(id)
        }
        fn history_entries(&self) -> Vec<ProductionHistoryEntry> {
            self.inner.history_entries()
        }
        fn insert_history(&mut self, e: ProductionHistoryEntry) -> Result<(), StoreError> {
            if self.fail_history {
                return Err(StoreError::Rejected("history unavailable".into()));
            }
            self.inner.insert_history(e)
        }
        fn update_history(&mut self, e: ProductionHistoryEntry) -> Result<(), StoreError> {
            if self.fail_history {
                return Err(StoreError::Rejected("history unavailable".into()));
            }
            self.inner.update_history(e)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_deducts_exact_recipe() {
        // 7ml increments never land exactly on 900; the recipe is what counts.
        let mut m = machine_with(catalog(), 7.0);
        m.select_formula("f1").unwrap();
        assert_eq!(m.lifecycle(), LifecycleState::Ready);
        assert_eq!(m.start().unwrap(), ActionOutcome::Weighing { step_index: 0 });

        let outcome = run_to_completion(&mut m).await;

        let FinishOutcome::Recorded { entry, updated } = outcome else {
            panic!("expected a history entry");
        };
        assert!(!updated);
        assert_eq!(entry.final_state, FinalState::Finalizada);
        assert!(entry.consumed_pigments.iter().all(|c| c.ml_consumed == 900.0));
        // 900ml a 90/900 + 900ml a 180/900
        assert!((entry.final_cost - 270.0).abs() < 1e-9);
        assert_eq!(stock(&m, "pa"), 4100.0);
        assert_eq!(stock(&m, "pb"), 4100.0);
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
        assert_eq!(m.store().list_history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_finalize_records_partial_consumption() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(remaining(&m, 0), 600.0);

        let ActionOutcome::Finished(FinishOutcome::Recorded { entry, .. }) = m.finalize().unwrap()
        else {
            panic!("expected a history entry");
        };
        assert_eq!(entry.final_state, FinalState::NaoFinalizada);
        assert_eq!(entry.consumed_pigments.len(), 1);
        assert_eq!(entry.consumed_pigments[0].pigment_id, "pa");
        assert_eq!(entry.consumed_pigments[0].ml_consumed, 300.0);
        assert!((entry.final_cost - 30.0).abs() < 1e-9);
        assert_eq!(stock(&m, "pa"), 4700.0);
        assert_eq!(stock(&m, "pb"), 5000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_preserves_remaining() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(m.pause().unwrap(), ActionOutcome::Paused);
        let at_pause = remaining(&m, 0);
        assert_eq!(at_pause, 700.0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remaining(&m, 0), at_pause);
        assert_eq!(m.lifecycle(), LifecycleState::Paused);

        m.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remaining(&m, 0), 600.0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_at_weighed_and_waits_for_advance() {
        let mut m = machine_with(catalog(), 500.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let run = m.run().unwrap();
        assert_eq!(run.steps[0].status, StepStatus::Weighed);
        assert_eq!(run.steps[0].remaining_ml, 0.0);
        assert_eq!(run.steps[1].status, StepStatus::Pending);
        assert_eq!(run.steps[1].remaining_ml, 900.0);
        assert!(m.progress().awaiting_advance);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_without_weighing_writes_nothing() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();

        let outcome = m.finalize().unwrap();
        assert_eq!(outcome, ActionOutcome::Finished(FinishOutcome::NoMaterialUsed));
        assert!(m.store().list_history().is_empty());
        assert_eq!(stock(&m, "pa"), 5000.0);
        assert_eq!(stock(&m, "pb"), 5000.0);
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_run_updates_same_history_entry() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let ActionOutcome::Finished(FinishOutcome::Recorded { entry: first, .. }) =
            m.finalize().unwrap()
        else {
            panic!("expected a history entry");
        };

        let snapshot = m.request_resume(&first.id).unwrap();
        assert_eq!(snapshot.steps[0].remaining_ml, 600.0);
        assert_eq!(snapshot.steps[0].status, StepStatus::Pending);
        assert_eq!(snapshot.steps[1].remaining_ml, 900.0);
        assert_eq!(snapshot.steps[1].status, StepStatus::Pending);

        m.load_snapshot().unwrap();
        assert_eq!(m.lifecycle(), LifecycleState::Paused);
        assert!(matches!(
            m.start(),
            Err(ProductionError::InvalidTransition { action: "start", .. })
        ));
        m.resume().unwrap();
        let outcome = run_to_completion(&mut m).await;

        let FinishOutcome::Recorded { entry, updated } = outcome else {
            panic!("expected a history entry");
        };
        assert!(updated);
        assert_eq!(entry.id, first.id);
        assert_eq!(entry.final_state, FinalState::Finalizada);
        let history = m.store().list_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].final_state, FinalState::Finalizada);
        // 300ml in the first session, the remaining 600ml + 900ml now.
        assert_eq!(stock(&m, "pa"), 4100.0);
        assert_eq!(stock(&m, "pb"), 4100.0);
    }

    #[tokio::test]
    async fn snapshot_is_consumed_once() {
        let mut store = catalog();
        store
            .insert_history(ProductionHistoryEntry {
                id: "h1".into(),
                timestamp: Utc::now(),
                formula_id: "f1".into(),
                formula_name: "Ocre Colonial".into(),
                formula_code: "OC-10".into(),
                consumed_pigments: vec![ConsumedPigment {
                    pigment_id: "pa".into(),
                    name: "Amarelo Óxido".into(),
                    code: "AM-01".into(),
                    ml_consumed: 300.0,
                }],
                final_state: FinalState::NaoFinalizada,
                final_cost: 30.0,
            })
            .unwrap();
        let mut m = machine_with(store, 100.0);

        m.request_resume("h1").unwrap();
        m.load_snapshot().unwrap();
        m.finalize().unwrap();
        assert!(matches!(
            m.load_snapshot(),
            Err(ProductionError::NothingToResume)
        ));
    }

    #[tokio::test]
    async fn resume_refused_when_formula_deleted() {
        let mut store = catalog();
        store
            .insert_history(ProductionHistoryEntry {
                id: "h1".into(),
                timestamp: Utc::now(),
                formula_id: "f1".into(),
                formula_name: "Ocre Colonial".into(),
                formula_code: "OC-10".into(),
                consumed_pigments: vec![],
                final_state: FinalState::NaoFinalizada,
                final_cost: 0.0,
            })
            .unwrap();
        store.remove_formula("f1");
        let mut m = machine_with(store, 100.0);

        assert!(matches!(
            m.resume_history("h1"),
            Err(ProductionError::FormulaNotFound(id)) if id == "f1"
        ));
        assert!(matches!(
            m.resume_history("missing"),
            Err(ProductionError::HistoryEntryNotFound(_))
        ));
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn deleted_formula_leaves_machine_idle() {
        let mut store = catalog();
        store.remove_formula("f1");
        let mut m = machine_with(store, 100.0);

        assert!(matches!(
            m.select_formula("f1"),
            Err(ProductionError::NoFormulaSelected)
        ));
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
        assert!(matches!(m.start(), Err(ProductionError::NoFormulaSelected)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_second_run_while_active() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        // Not started yet: selection can change.
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        assert!(matches!(
            m.select_formula("f1"),
            Err(ProductionError::RunAlreadyActive)
        ));
        m.pause().unwrap();
        assert!(matches!(
            m.load_snapshot(),
            Err(ProductionError::RunAlreadyActive)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_refused_while_run_active_leaves_slot_empty() {
        let mut m = machine_with(catalog(), 100.0);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let ActionOutcome::Finished(FinishOutcome::Recorded { entry: first, .. }) =
            m.finalize().unwrap()
        else {
            panic!("expected a history entry");
        };

        m.select_formula("f1").unwrap();
        m.start().unwrap();
        assert!(matches!(
            m.resume_history(&first.id),
            Err(ProductionError::RunAlreadyActive)
        ));
        assert!(matches!(
            m.request_resume(&first.id),
            Err(ProductionError::RunAlreadyActive)
        ));
        assert_eq!(m.lifecycle(), LifecycleState::Running);

        assert_eq!(
            m.finalize().unwrap(),
            ActionOutcome::Finished(FinishOutcome::NoMaterialUsed)
        );
        assert!(matches!(
            m.load_snapshot(),
            Err(ProductionError::NothingToResume)
        ));
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_history_write_keeps_commit_pending() {
        let store = FlakyStore {
            inner: catalog(),
            fail_history: true,
        };
        let mut m = ProductionMachine::new(store, SnapshotSlot::in_memory(), FixedSensor(100.0), TICK);
        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        let err = m.finalize().unwrap_err();
        assert!(matches!(err, ProductionError::Persistence(_)));
        assert_eq!(m.lifecycle(), LifecycleState::ManuallyTerminated);
        assert!(m.progress().pending_commit);
        assert_eq!(m.pending_commit().unwrap().applied, 1);
        assert!(m.resume().is_err());

        m.store_mut().fail_history = false;
        let outcome = m.retry_commit().unwrap();
        assert!(matches!(outcome, FinishOutcome::Recorded { updated: false, .. }));
        // Deducted exactly once across both attempts.
        assert_eq!(stock(&m, "pa"), 4700.0);
        assert_eq!(m.store().list_history().len(), 1);
        assert_eq!(m.lifecycle(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn retry_commit_without_pending_is_invalid() {
        let mut m = machine_with(catalog(), 100.0);
        assert!(matches!(
            m.retry_commit(),
            Err(ProductionError::InvalidTransition { action: "commit", state: LifecycleState::Idle })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reports_live_cost() {
        let mut m = machine_with(catalog(), 90.0);
        assert_eq!(m.progress().lifecycle, LifecycleState::Idle);

        m.select_formula("f1").unwrap();
        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let report = m.progress();
        assert_eq!(report.lifecycle, LifecycleState::Running);
        assert_eq!(report.formula_name.as_deref(), Some("Ocre Colonial"));
        assert_eq!(report.current_step_index, Some(0));
        assert_eq!(report.steps[0].weighed_ml, 180.0);
        assert_eq!(report.steps[0].percent, 20.0);
        assert!((report.live_cost - 18.0).abs() < 1e-9);
    }
}
