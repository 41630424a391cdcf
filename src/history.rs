//! Histórico de produção: registros de auditoria e reconstrução para retomada.
//!
//! Um registro guarda apenas o consumo, não o estado completo dos passos.
//! Para retomar uma produção "Não Finalizada", os passos são recalculados a
//! partir das linhas atuais da fórmula com [`compute_resume_snapshot`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Formula;
use crate::production::{CONSUMPTION_EPSILON_ML, PigmentStep, StepStatus};
use crate::snapshot::ResumeSnapshot;

/// Estado final gravado no histórico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalState {
    #[serde(rename = "Finalizada")]
    Finalizada,
    #[serde(rename = "Não Finalizada")]
    NaoFinalizada,
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalState::Finalizada => write!(f, "Finalizada"),
            FinalState::NaoFinalizada => write!(f, "Não Finalizada"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedPigment {
    pub pigment_id: String,
    pub name: String,
    pub code: String,
    pub ml_consumed: f64,
}

/// Registro de auditoria de uma produção.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub formula_id: String,
    pub formula_name: String,
    pub formula_code: String,
    pub consumed_pigments: Vec<ConsumedPigment>,
    pub final_state: FinalState,
    pub final_cost: f64,
}

impl ProductionHistoryEntry {
    pub fn is_resumable(&self) -> bool {
        self.final_state == FinalState::NaoFinalizada
    }

    /// Total recorded for `pigment_id` across all lines.
    pub fn consumed_ml(&self, pigment_id: &str) -> f64 {
        self.consumed_pigments
            .iter()
            .filter(|c| c.pigment_id == pigment_id)
            .map(|c| c.ml_consumed)
            .sum()
    }
}

/// Entries an operator can pick up with "Retomar".
pub fn resumable(entries: &[ProductionHistoryEntry]) -> Vec<&ProductionHistoryEntry> {
    entries.iter().filter(|e| e.is_resumable()).collect()
}

/// Rebuilds step state for an unfinished run from the formula's current
/// lines and the consumption recorded in `entry`.
///
/// Recorded consumption of a pigment is handed to its lines in recipe
/// order, each line taking up to its target and the last one taking the
/// rest. Lines without a matching record (pigment added after the run
/// started) start from zero consumed.
pub fn compute_resume_snapshot(entry: &ProductionHistoryEntry, formula: &Formula) -> ResumeSnapshot {
    let mut recorded: HashMap<&str, f64> = HashMap::new();
    let steps = formula
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let last = !formula.lines[i + 1..]
                .iter()
                .any(|l| l.pigment_id == line.pigment_id);
            let pool = recorded
                .entry(line.pigment_id.as_str())
                .or_insert_with(|| entry.consumed_ml(&line.pigment_id));
            let consumed = if last { *pool } else { pool.min(line.target_ml) };
            *pool -= consumed;

            let remaining = (line.target_ml - consumed).max(0.0);
            let status = if remaining < CONSUMPTION_EPSILON_ML {
                StepStatus::Done
            } else {
                StepStatus::Pending
            };
            PigmentStep {
                pigment_id: line.pigment_id.clone(),
                name: line.name.clone(),
                code: line.code.clone(),
                target_ml: line.target_ml,
                remaining_ml: remaining,
                status,
                carried_ml: consumed,
            }
        })
        .collect();

    ResumeSnapshot {
        history_entry_id: entry.id.clone(),
        formula_id: formula.id.clone(),
        steps,
    }
}
