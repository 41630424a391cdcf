//! Interface de linha de comando da tintometria baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (init, formulas,
//! produce, history, resume, demo) e flags globais (--data-dir, --tick-ms,
//! --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tintometria: motor de produção de tintas com retomada e histórico.
#[derive(Debug, Parser)]
#[command(name = "tintometria", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Diretório de dados (catálogo, histórico, snapshot de retomada).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Intervalo entre leituras da balança simulada, em milissegundos.
    #[arg(long, global = true)]
    pub tick_ms: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Grava um catálogo de exemplo (pigmentos e fórmulas) no diretório de dados.
    Init {
        /// Sobrescreve um catálogo existente.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Lista as fórmulas com o custo atual.
    Formulas,

    /// Produz uma fórmula, pesando pigmento a pigmento.
    Produce {
        /// Identificador da fórmula.
        formula_id: String,

        /// Finaliza manualmente depois de pesar este número de pigmentos.
        #[arg(long)]
        stop_after: Option<usize>,
    },

    /// Mostra o histórico de produção, mais recente primeiro.
    History {
        /// Apenas produções "Não Finalizada".
        #[arg(long, default_value_t = false)]
        resumable: bool,
    },

    /// Retoma uma produção "Não Finalizada" do histórico.
    Resume {
        /// Identificador do registro de histórico.
        entry_id: String,
    },

    /// Executa a demonstração em memória do fluxo de produção.
    Demo,
}
