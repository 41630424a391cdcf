//! Catálogo de exemplo usado por `init` e `demo`.

use crate::model::{Formula, Pigment};
use crate::store::MemoryStore;

pub fn sample_catalog() -> MemoryStore {
    let branco = Pigment::new("pg-branco", "Branco Titânio", "BR-01", 18_000.0, 95.0);
    let amarelo = Pigment::new("pg-amarelo", "Amarelo Óxido", "AM-03", 4_500.0, 120.0);
    let preto = Pigment::new("pg-preto", "Preto Carbono", "PR-02", 2_700.0, 140.0);
    let azul = Pigment::new("pg-azul", "Azul Ftalo", "AZ-07", 1_800.0, 210.0);
    let vermelho = Pigment::new("pg-vermelho", "Vermelho Óxido", "VM-05", 3_600.0, 130.0);

    let formulas = [
        Formula::new("f-ocre", "Ocre Colonial", "OC-10")
            .with_line(&branco, 540.0)
            .with_line(&amarelo, 270.0)
            .with_line(&preto, 90.0),
        Formula::new("f-ceu", "Azul Céu", "AZ-100")
            .with_line(&branco, 810.0)
            .with_line(&azul, 90.0),
        Formula::new("f-terracota", "Terracota", "TR-22")
            .with_line(&vermelho, 450.0)
            .with_line(&amarelo, 180.0)
            .with_line(&branco, 225.0)
            .with_line(&preto, 45.0),
    ];

    let mut store = MemoryStore::new();
    for pigment in [branco, amarelo, preto, azul, vermelho] {
        store.insert_pigment(pigment);
    }
    for mut formula in formulas {
        formula.refresh_total_cost(&store);
        store.insert_formula(formula);
    }
    store
}
