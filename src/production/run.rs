use serde::{Deserialize, Serialize};

use super::state::LifecycleState;
use crate::history::ConsumedPigment;
use crate::model::Formula;
use crate::snapshot::ResumeSnapshot;

/// Consumo abaixo deste limite (ml) é ruído e não é registrado.
pub const CONSUMPTION_EPSILON_ML: f64 = 0.01;

/// Status of a single pigment step. Only moves forward:
/// Pending → InProgress → Weighed → Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    InProgress,
    /// Target reached; waiting for the operator's "Próximo".
    Weighed,
    Done,
}

/// Weighing of one pigment within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PigmentStep {
    pub pigment_id: String,
    pub name: String,
    pub code: String,
    pub target_ml: f64,
    pub remaining_ml: f64,
    pub status: StepStatus,
    /// Consumption recorded (and already deducted) by earlier sessions of a
    /// resumed run.
    #[serde(default)]
    pub carried_ml: f64,
}

impl PigmentStep {
    /// Total consumed across all sessions.
    pub fn consumed_ml(&self) -> f64 {
        (self.target_ml - self.remaining_ml).max(self.carried_ml)
    }

    pub fn weighed_ml(&self) -> f64 {
        (self.target_ml - self.remaining_ml).max(0.0)
    }

    pub fn percent(&self) -> f64 {
        if self.target_ml <= 0.0 {
            return 100.0;
        }
        (self.weighed_ml() / self.target_ml * 100.0).clamp(0.0, 100.0)
    }

    fn advance_status(&mut self, next: StepStatus) {
        if next > self.status {
            self.status = next;
        }
    }
}

/// Result of one sensor reading applied to the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Still weighing; `remaining_ml` left on the current step.
    Weighing { remaining_ml: f64 },
    /// The current step just reached its target.
    Weighed { step_index: usize },
    /// The tick belongs to a cancelled ticker or the run is not weighing.
    Stale,
}

impl TickOutcome {
    pub fn is_weighing(&self) -> bool {
        matches!(self, TickOutcome::Weighing { .. })
    }
}

/// A production run in memory.
#[derive(Debug, Clone)]
pub struct ProductionRun {
    pub formula_id: String,
    pub formula_name: String,
    pub formula_code: String,
    /// Set when the run continues an unfinished history entry.
    pub history_entry_id: Option<String>,
    pub steps: Vec<PigmentStep>,
    pub current_step_index: usize,
    pub lifecycle: LifecycleState,
    pub from_snapshot: bool,
    pub state_history: Vec<LifecycleState>,
    /// Bumped on every applied action. Ticks carry the generation they were
    /// spawned with and are ignored once it changes.
    pub generation: u64,
}

impl ProductionRun {
    /// Fresh run seeded from the formula recipe, in `Ready`.
    pub fn from_formula(formula: &Formula) -> Self {
        let steps = formula
            .lines
            .iter()
            .map(|line| PigmentStep {
                pigment_id: line.pigment_id.clone(),
                name: line.name.clone(),
                code: line.code.clone(),
                target_ml: line.target_ml,
                remaining_ml: line.target_ml,
                status: StepStatus::Pending,
                carried_ml: 0.0,
            })
            .collect();

        Self {
            formula_id: formula.id.clone(),
            formula_name: formula.name.clone(),
            formula_code: formula.code.clone(),
            history_entry_id: None,
            steps,
            current_step_index: 0,
            lifecycle: LifecycleState::Ready,
            from_snapshot: false,
            state_history: Vec::new(),
            generation: 0,
        }
    }

    /// Run reconstructed from a resume snapshot, in `Paused`. The current
    /// step is the first one not yet done.
    pub fn from_snapshot(snapshot: ResumeSnapshot, formula: &Formula) -> Self {
        let current_step_index = snapshot
            .steps
            .iter()
            .position(|s| s.status != StepStatus::Done)
            .unwrap_or(snapshot.steps.len());

        Self {
            formula_id: formula.id.clone(),
            formula_name: formula.name.clone(),
            formula_code: formula.code.clone(),
            history_entry_id: Some(snapshot.history_entry_id),
            steps: snapshot.steps,
            current_step_index,
            lifecycle: LifecycleState::Paused,
            from_snapshot: true,
            state_history: Vec::new(),
            generation: 0,
        }
    }

    pub fn current_step(&self) -> Option<&PigmentStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn awaiting_advance(&self) -> bool {
        self.current_step()
            .is_some_and(|s| s.status == StepStatus::Weighed)
    }

    pub(crate) fn set_lifecycle(&mut self, next: LifecycleState) {
        if next != self.lifecycle {
            self.state_history.push(self.lifecycle);
            self.lifecycle = next;
        }
    }

    /// Moves to the first step not done and opens it for weighing.
    /// Returns `None` when every step is done.
    pub(crate) fn open_current_step(&mut self) -> Option<usize> {
        while self
            .steps
            .get(self.current_step_index)
            .is_some_and(|s| s.status == StepStatus::Done)
        {
            self.current_step_index += 1;
        }
        let index = self.current_step_index;
        let step = self.steps.get_mut(index)?;
        if step.remaining_ml > 0.0 {
            step.advance_status(StepStatus::InProgress);
        } else {
            step.advance_status(StepStatus::Weighed);
        }
        Some(index)
    }

    pub(crate) fn close_current_step(&mut self) {
        if let Some(step) = self.steps.get_mut(self.current_step_index) {
            step.advance_status(StepStatus::Done);
            self.current_step_index += 1;
        }
    }

    /// Applies one weighed increment to the current step.
    pub fn tick(&mut self, generation: u64, increment_ml: f64) -> TickOutcome {
        if generation != self.generation || self.lifecycle != LifecycleState::Running {
            return TickOutcome::Stale;
        }
        let index = self.current_step_index;
        let Some(step) = self.steps.get_mut(index) else {
            return TickOutcome::Stale;
        };
        if step.status != StepStatus::InProgress {
            return TickOutcome::Stale;
        }

        step.remaining_ml = (step.remaining_ml - increment_ml.max(0.0)).max(0.0);
        if step.remaining_ml <= 0.0 {
            step.advance_status(StepStatus::Weighed);
            TickOutcome::Weighed { step_index: index }
        } else {
            TickOutcome::Weighing {
                remaining_ml: step.remaining_ml,
            }
        }
    }

    /// Consumption to record in history, one entry per recipe line.
    ///
    /// A completed run used exactly the recipe. A manually terminated one
    /// used `target - remaining` per step (at least what earlier sessions
    /// recorded), keeping only lines above the noise threshold.
    pub fn consumed_set(&self) -> Vec<ConsumedPigment> {
        self.steps
            .iter()
            .filter_map(|step| {
                let ml = self.recorded_ml(step);
                (ml > CONSUMPTION_EPSILON_ML).then(|| consumed(step, ml))
            })
            .collect()
    }

    /// Quantities still to deduct from the ledger: each line's consumption
    /// minus what earlier sessions already deducted for that same line.
    pub fn ledger_deductions(&self) -> Vec<ConsumedPigment> {
        self.steps
            .iter()
            .filter_map(|step| {
                let ml = self.recorded_ml(step) - step.carried_ml;
                (ml > CONSUMPTION_EPSILON_ML).then(|| consumed(step, ml))
            })
            .collect()
    }

    fn recorded_ml(&self, step: &PigmentStep) -> f64 {
        if self.lifecycle == LifecycleState::Completed {
            step.target_ml.max(step.carried_ml)
        } else {
            step.consumed_ml()
        }
    }
}

fn consumed(step: &PigmentStep, ml: f64) -> ConsumedPigment {
    ConsumedPigment {
        pigment_id: step.pigment_id.clone(),
        name: step.name.clone(),
        code: step.code.clone(),
        ml_consumed: ml,
    }
}
