//! Configuração da tintometria carregada a partir de `tintometria.toml`.
//!
//! A struct [`ProductionConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `TINTOMETRIA_DATA_DIR` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;

/// Configuração de nível superior carregada de `tintometria.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductionConfig {
    /// Intervalo entre leituras da balança simulada, em milissegundos.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Menor incremento pesado por leitura, em ml.
    #[serde(default = "default_min_increment_ml")]
    pub min_increment_ml: f64,

    /// Maior incremento pesado por leitura, em ml.
    #[serde(default = "default_max_increment_ml")]
    pub max_increment_ml: f64,

    /// Diretório do catálogo, histórico e snapshot de retomada.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Valor padrão para o intervalo de leitura: 100ms.
fn default_tick_interval_ms() -> u64 {
    100
}

fn default_min_increment_ml() -> f64 {
    5.0
}

fn default_max_increment_ml() -> f64 {
    25.0
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".tintometria")
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_increment_ml: default_min_increment_ml(),
            max_increment_ml: default_max_increment_ml(),
            data_dir: default_data_dir(),
        }
    }
}

impl ProductionConfig {
    /// Carrega a configuração de `tintometria.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("tintometria.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ProductionConfig>(&contents)?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("TINTOMETRIA_DATA_DIR")
            && !dir.is_empty()
        {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than zero");
        }
        if self.min_increment_ml <= 0.0 || self.max_increment_ml < self.min_increment_ml {
            bail!(
                "invalid increment range {}..={} ml",
                self.min_increment_ml,
                self.max_increment_ml
            );
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("resume.json")
    }
}
