//! Motor de custo de fórmulas.
//!
//! Funções puras: o custo é sempre recalculado a partir dos preços atuais
//! dos pigmentos, nunca lido de um cache. Linhas cujo pigmento foi excluído
//! custam zero e são marcadas com preço indisponível.

use serde::Serialize;

use crate::history::ConsumedPigment;
use crate::model::{Formula, Pigment};
use crate::store::PigmentStore;

/// Volume (ml) a que o `unit_price` de um pigmento se refere.
pub const REFERENCE_VOLUME_ML: f64 = 900.0;

/// Cost of `ml` of `pigment` at its current price.
pub fn unit_cost(pigment: &Pigment, ml: f64) -> f64 {
    pigment.unit_price / REFERENCE_VOLUME_ML * ml
}

/// Priced line of a formula or of a consumed set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineCost {
    pub pigment_id: String,
    pub name: String,
    pub ml: f64,
    /// `None` when the pigment no longer exists in the ledger.
    pub cost: Option<f64>,
}

impl LineCost {
    pub fn price_unavailable(&self) -> bool {
        self.cost.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaCost {
    pub lines: Vec<LineCost>,
    pub total: f64,
}

impl FormulaCost {
    pub fn has_unavailable_prices(&self) -> bool {
        self.lines.iter().any(LineCost::price_unavailable)
    }

    fn from_lines(lines: Vec<LineCost>) -> Self {
        let total = lines.iter().filter_map(|l| l.cost).sum();
        Self { lines, total }
    }
}

fn price_line(pigments: &impl PigmentStore, pigment_id: &str, name: &str, ml: f64) -> LineCost {
    LineCost {
        pigment_id: pigment_id.to_string(),
        name: name.to_string(),
        ml,
        cost: pigments.pigment(pigment_id).map(|p| unit_cost(&p, ml)),
    }
}

/// Cost of the whole recipe at current prices.
pub fn formula_cost(formula: &Formula, pigments: &impl PigmentStore) -> FormulaCost {
    FormulaCost::from_lines(
        formula
            .lines
            .iter()
            .map(|l| price_line(pigments, &l.pigment_id, &l.name, l.target_ml))
            .collect(),
    )
}

/// Cost of a consumed set (partial or complete run) at current prices.
pub fn consumption_cost(consumed: &[ConsumedPigment], pigments: &impl PigmentStore) -> FormulaCost {
    FormulaCost::from_lines(
        consumed
            .iter()
            .map(|c| price_line(pigments, &c.pigment_id, &c.name, c.ml_consumed))
            .collect(),
    )
}
