//! Sinal de pesagem simulado.
//!
//! Não há balança real: cada leitura devolve um incremento aleatório,
//! limitado por `min_ml..=max_ml`, que o ticker subtrai do restante do passo.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of weighed increments, in ml, for the active step.
pub trait WeighingSensor: Send + 'static {
    fn next_increment(&mut self) -> f64;
}

/// Uniformly random increments within a bounded range.
pub struct RandomSensor {
    rng: StdRng,
    min_ml: f64,
    max_ml: f64,
}

impl RandomSensor {
    pub fn new(min_ml: f64, max_ml: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), min_ml, max_ml)
    }

    /// Reproducible sensor for demos.
    pub fn seeded(seed: u64, min_ml: f64, max_ml: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), min_ml, max_ml)
    }

    fn with_rng(rng: StdRng, min_ml: f64, max_ml: f64) -> Self {
        let min_ml = min_ml.max(0.0);
        Self {
            rng,
            min_ml,
            max_ml: max_ml.max(min_ml),
        }
    }
}

impl WeighingSensor for RandomSensor {
    fn next_increment(&mut self) -> f64 {
        if self.max_ml <= self.min_ml {
            return self.min_ml;
        }
        self.rng.gen_range(self.min_ml..=self.max_ml)
    }
}

/// Always reads the same increment.
pub struct FixedSensor(pub f64);

impl WeighingSensor for FixedSensor {
    fn next_increment(&mut self) -> f64 {
        self.0
    }
}
