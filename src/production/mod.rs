mod machine;
mod run;
mod state;

pub use machine::{
    ActionOutcome, FinishOutcome, PendingCommit, ProductionMachine, ProgressReport, StepProgress,
};
pub use run::{CONSUMPTION_EPSILON_ML, PigmentStep, ProductionRun, StepStatus, TickOutcome};
pub use state::{Action, LifecycleState, StateMachine, Transition};
