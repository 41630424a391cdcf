//! Tintometria: motor de produção de tintas.
//!
//! Converte uma fórmula (receita de pigmentos) numa produção rastreada,
//! pesada pigmento a pigmento, que pode ser pausada, finalizada no meio ou
//! retomada depois exatamente de onde parou. Ao terminar, dá baixa no
//! estoque de pigmentos e grava um registro de auditoria no histórico.

pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod history;
pub mod ledger;
pub mod model;
pub mod operator;
pub mod production;
pub mod sample;
pub mod sensor;
pub mod snapshot;
pub mod store;
pub mod ui;

pub use error::{LedgerError, ProductionError, StoreError};
pub use production::{ActionOutcome, FinishOutcome, LifecycleState, ProductionMachine};
