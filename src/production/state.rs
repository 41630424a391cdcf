use std::fmt;

use serde::{Deserialize, Serialize};

use super::run::ProductionRun;
use crate::error::ProductionError;

/// Ciclo de vida de uma produção.
///
/// IDLE → READY → RUNNING ⇄ PAUSED → COMPLETED | MANUALLY_TERMINATED.
/// Um snapshot de retomada carregado entra direto em PAUSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Idle,
    Ready,
    Running,
    Paused,
    Completed,
    ManuallyTerminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "IDLE"),
            LifecycleState::Ready => write!(f, "READY"),
            LifecycleState::Running => write!(f, "RUNNING"),
            LifecycleState::Paused => write!(f, "PAUSED"),
            LifecycleState::Completed => write!(f, "COMPLETED"),
            LifecycleState::ManuallyTerminated => write!(f, "MANUALLY_TERMINATED"),
        }
    }
}

/// Operator actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    /// "Próximo": close the weighed step and open the next one.
    Advance,
    /// Manual termination with partial consumption.
    Finalize,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Advance => "advance",
            Action::Finalize => "finalize",
        }
    }
}

/// The result of applying an action to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The run is weighing (or awaiting advance on) the step at `step_index`.
    Weighing { step_index: usize },
    /// Ticking stopped, remainders preserved.
    Paused,
    /// The run reached a terminal state and must be committed.
    Terminal(LifecycleState),
}

/// Applies operator actions to a [`ProductionRun`].
///
/// Pure state logic: no timers, no persistence. Every applied action bumps
/// the run's ticker generation, which invalidates any tick still in flight.
pub struct StateMachine;

impl StateMachine {
    /// Validate `action` against the run's lifecycle and apply it.
    ///
    /// | action   | valid in                              |
    /// |----------|---------------------------------------|
    /// | start    | Ready (fresh run)                     |
    /// | resume   | Paused (incl. loaded snapshot)        |
    /// | pause    | Running                               |
    /// | advance  | Running, current step Weighed         |
    /// | finalize | Running or Paused                     |
    pub fn apply(run: &mut ProductionRun, action: Action) -> Result<Transition, ProductionError> {
        let state = run.lifecycle;
        let valid = match action {
            Action::Start => state == LifecycleState::Ready && !run.from_snapshot,
            Action::Resume => state == LifecycleState::Paused,
            Action::Pause => state == LifecycleState::Running,
            Action::Advance => state == LifecycleState::Running && run.awaiting_advance(),
            Action::Finalize => {
                matches!(state, LifecycleState::Running | LifecycleState::Paused)
            }
        };
        if !valid {
            return Err(ProductionError::InvalidTransition {
                action: action.as_str(),
                state,
            });
        }

        run.generation += 1;
        let transition = match action {
            Action::Start | Action::Resume => Self::weigh_from_current(run),
            Action::Pause => {
                run.set_lifecycle(LifecycleState::Paused);
                Transition::Paused
            }
            Action::Advance => {
                run.close_current_step();
                Self::weigh_from_current(run)
            }
            Action::Finalize => {
                run.set_lifecycle(LifecycleState::ManuallyTerminated);
                Transition::Terminal(LifecycleState::ManuallyTerminated)
            }
        };
        Ok(transition)
    }

    fn weigh_from_current(run: &mut ProductionRun) -> Transition {
        match run.open_current_step() {
            Some(step_index) => {
                run.set_lifecycle(LifecycleState::Running);
                Transition::Weighing { step_index }
            }
            None => {
                run.set_lifecycle(LifecycleState::Completed);
                Transition::Terminal(LifecycleState::Completed)
            }
        }
    }
}
