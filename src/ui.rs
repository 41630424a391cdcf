//! Interface de terminal da tintometria: barras de progresso e saída colorida.
//!
//! Usa `indicatif` para uma barra por pigmento e `console` para cores.
//! O [`RunProgress`] acompanha visualmente uma produção no terminal.

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::cost::FormulaCost;
use crate::history::{FinalState, ProductionHistoryEntry};
use crate::model::Formula;
use crate::production::{FinishOutcome, PendingCommit, ProgressReport, StepStatus};

/// Barras de progresso de uma produção, uma por pigmento.
pub struct RunProgress {
    bars: Vec<ProgressBar>,
    // Mantém as barras desenhadas juntas.
    _multi: MultiProgress,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Cria uma barra por passo do relatório inicial.
    pub fn start(report: &ProgressReport) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:>24} [{bar:30.cyan/blue}] {pos:>4}/{len:4} ml {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bars = report
            .steps
            .iter()
            .map(|step| {
                let pb = multi.add(ProgressBar::new(step.target_ml.round() as u64));
                pb.set_style(style.clone());
                pb.set_prefix(format!("{} ({})", step.name, step.code));
                pb
            })
            .collect();

        Self {
            bars,
            _multi: multi,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza as barras a partir do relatório corrente.
    pub fn update(&self, report: &ProgressReport) {
        for (pb, step) in self.bars.iter().zip(&report.steps) {
            pb.set_position(step.weighed_ml.round() as u64);
            let label = match step.status {
                StepStatus::Pending => String::new(),
                StepStatus::InProgress => format!("{}", self.yellow.apply_to("pesando")),
                StepStatus::Weighed => format!("{}", self.green.apply_to("pesado")),
                StepStatus::Done => format!("{}", self.green.apply_to("✓")),
            };
            pb.set_message(label);
        }
    }

    /// Finaliza as barras e exibe o resultado da produção.
    pub fn finish(&self, outcome: &FinishOutcome) {
        for pb in &self.bars {
            pb.finish();
        }
        match outcome {
            FinishOutcome::Recorded { entry, updated } => {
                let style = match entry.final_state {
                    FinalState::Finalizada => &self.green,
                    FinalState::NaoFinalizada => &self.yellow,
                };
                let verb = if *updated { "atualizado" } else { "criado" };
                println!(
                    "  {} Produção {} (histórico {verb}: {})",
                    style.apply_to("●"),
                    entry.final_state,
                    entry.id
                );
                print_entry(entry);
            }
            FinishOutcome::NoMaterialUsed => {
                println!(
                    "  {} Produção encerrada sem uso de material",
                    self.red.apply_to("✗")
                );
            }
        }
    }
}

fn print_entry(entry: &ProductionHistoryEntry) {
    for c in &entry.consumed_pigments {
        println!("      {:<24} {:>9.2} ml", format!("{} ({})", c.name, c.code), c.ml_consumed);
    }
    println!("      {:<24} {:>9.2}", "Custo", entry.final_cost);
}

/// Mostra um commit que não pôde ser gravado, para registro manual.
pub fn print_pending_commit(pending: &PendingCommit) {
    let red = Style::new().red().bold();
    eprintln!(
        "  {} Produção {} não gravada no histórico ({})",
        red.apply_to("✗"),
        pending.entry.final_state,
        pending.entry.id
    );
    print_entry(&pending.entry);
    for line in pending.deductions.iter().skip(pending.applied) {
        eprintln!(
            "      estoque não baixado: {} ({}) {:.2} ml",
            line.name, line.code, line.ml_consumed
        );
    }
}

/// Imprime uma fórmula com o custo de cada linha.
pub fn print_formula(formula: &Formula, cost: &FormulaCost) {
    let dim = Style::new().dim();
    println!(
        "{} {} [{}] - {:.0} ml",
        Style::new().bold().apply_to(&formula.id),
        formula.name,
        formula.code,
        formula.base_volume
    );
    for line in &cost.lines {
        let price = match line.cost {
            Some(c) => format!("{c:>9.2}"),
            None => format!("{}", dim.apply_to("preço indisponível")),
        };
        println!("    {:<24} {:>8.2} ml  {price}", line.name, line.ml);
    }
    println!("    {:<24} {:>11}  {:>9.2}", "Total", "", cost.total);
}

/// Imprime o histórico, um registro por linha.
pub fn print_history(entries: &[ProductionHistoryEntry]) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    for entry in entries {
        let state = match entry.final_state {
            FinalState::Finalizada => green.apply_to(entry.final_state.to_string()),
            FinalState::NaoFinalizada => yellow.apply_to(entry.final_state.to_string()),
        };
        println!(
            "{}  {}  {} [{}]  {:<15} {:>9.2}",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.formula_name,
            entry.formula_code,
            state,
            entry.final_cost
        );
    }
}
