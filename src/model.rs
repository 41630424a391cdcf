//! Registros fornecidos pelos cadastros externos: pigmentos e fórmulas.
//!
//! O motor de produção apenas lê estes tipos. Pigmentos são mutados pelo
//! [`PigmentLedger`](crate::ledger::PigmentLedger) na finalização de uma
//! produção; fórmulas nunca são mutadas por uma produção.

use serde::{Deserialize, Serialize};

/// Volume padrão de uma fórmula, em ml.
pub const DEFAULT_BASE_VOLUME_ML: f64 = 900.0;

/// Matéria-prima com estoque em ml e preço de referência.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pigment {
    pub id: String,
    pub name: String,
    pub code: String,
    /// Estoque disponível em ml. Nunca negativo.
    pub quantity_on_hand: f64,
    /// Preço por volume de referência (900 ml).
    pub unit_price: f64,
}

impl Pigment {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        code: impl Into<String>,
        quantity_on_hand: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: code.into(),
            quantity_on_hand: quantity_on_hand.max(0.0),
            unit_price,
        }
    }
}

/// Uma linha da receita: quantos ml de um pigmento entram na fórmula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaLine {
    pub pigment_id: String,
    pub name: String,
    pub code: String,
    pub target_ml: f64,
}

/// Receita declarativa de uma batelada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default = "default_base_volume")]
    pub base_volume: f64,
    pub lines: Vec<FormulaLine>,
    /// Custo total em cache. Recalcule com [`Formula::refresh_total_cost`].
    #[serde(default)]
    pub total_cost: f64,
}

fn default_base_volume() -> f64 {
    DEFAULT_BASE_VOLUME_ML
}

impl Formula {
    pub fn new(id: impl Into<String>, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: code.into(),
            base_volume: DEFAULT_BASE_VOLUME_ML,
            lines: Vec::new(),
            total_cost: 0.0,
        }
    }

    /// Adds a recipe line for `pigment`. Builder-style, used by catalogs and tests.
    pub fn with_line(mut self, pigment: &Pigment, target_ml: f64) -> Self {
        self.lines.push(FormulaLine {
            pigment_id: pigment.id.clone(),
            name: pigment.name.clone(),
            code: pigment.code.clone(),
            target_ml,
        });
        self
    }

    /// Edits the target quantity of the line referencing `pigment_id`.
    /// Returns `false` when the formula has no such line or the quantity is
    /// not positive.
    pub fn set_line_quantity(&mut self, pigment_id: &str, target_ml: f64) -> bool {
        if target_ml <= 0.0 {
            return false;
        }
        match self.lines.iter_mut().find(|l| l.pigment_id == pigment_id) {
            Some(line) => {
                line.target_ml = target_ml;
                true
            }
            None => false,
        }
    }

    /// Re-derives the cached `total_cost` from current pigment prices.
    pub fn refresh_total_cost(&mut self, pigments: &impl crate::store::PigmentStore) -> f64 {
        self.total_cost = crate::cost::formula_cost(self, pigments).total;
        self.total_cost
    }

    pub fn line(&self, pigment_id: &str) -> Option<&FormulaLine> {
        self.lines.iter().find(|l| l.pigment_id == pigment_id)
    }

    pub fn total_ml(&self) -> f64 {
        self.lines.iter().map(|l| l.target_ml).sum()
    }
}
