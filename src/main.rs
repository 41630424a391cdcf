use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tintometria::cli::{Cli, Command};
use tintometria::config::ProductionConfig;
use tintometria::cost::formula_cost;
use tintometria::operator::drive;
use tintometria::production::ProductionMachine;
use tintometria::sample::sample_catalog;
use tintometria::sensor::RandomSensor;
use tintometria::snapshot::SnapshotSlot;
use tintometria::store::{FormulaCatalog, HistoryStore, JsonFileStore, ProductionStore};
use tintometria::ui::{RunProgress, print_formula, print_history, print_pending_commit};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ProductionConfig::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(ms) = cli.tick_ms {
        config.tick_interval_ms = ms;
    }
    config.validate()?;

    match cli.command {
        Command::Init { force } => init(&config, force),
        Command::Formulas => {
            let store = open_store(&config)?;
            for formula in store.formulas() {
                print_formula(&formula, &formula_cost(&formula, &store));
            }
            Ok(())
        }
        Command::Produce {
            formula_id,
            stop_after,
        } => {
            let mut machine = open_machine(&config)?;
            machine.select_formula(&formula_id)?;
            run(&mut machine, stop_after).await
        }
        Command::History { resumable: only } => {
            let store = open_store(&config)?;
            let entries = if only {
                store.resumable_history()
            } else {
                store.list_history()
            };
            print_history(&entries);
            Ok(())
        }
        Command::Resume { entry_id } => {
            let mut machine = open_machine(&config)?;
            machine.resume_history(&entry_id)?;
            run(&mut machine, None).await
        }
        Command::Demo => demo(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &ProductionConfig) -> Result<JsonFileStore> {
    let path = config.store_path();
    if !path.exists() {
        bail!(
            "No catalog found at {}. Run `tintometria init` first.",
            path.display()
        );
    }
    JsonFileStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn open_machine(config: &ProductionConfig) -> Result<ProductionMachine<JsonFileStore>> {
    let store = open_store(config)?;
    let snapshots = SnapshotSlot::file(config.snapshot_path())?;
    Ok(ProductionMachine::from_config(store, snapshots, config))
}

fn init(config: &ProductionConfig, force: bool) -> Result<()> {
    let path = config.store_path();
    if path.exists() && !force {
        bail!("Catalog already exists at {} (use --force)", path.display());
    }
    if force && path.exists() {
        std::fs::remove_file(&path)?;
    }
    let mut store = JsonFileStore::open(&path)?;
    store.modify(|data| *data = sample_catalog())?;
    println!("Catálogo de exemplo gravado em {}", path.display());
    Ok(())
}

async fn run<S: ProductionStore>(
    machine: &mut ProductionMachine<S>,
    stop_after: Option<usize>,
) -> Result<()> {
    let progress = RunProgress::start(&machine.progress());
    match drive(machine, stop_after, |report| progress.update(report)).await {
        Ok(outcome) => {
            progress.finish(&outcome);
            Ok(())
        }
        Err(e) => {
            if let Some(pending) = machine.pending_commit() {
                print_pending_commit(pending);
            }
            Err(e.into())
        }
    }
}

async fn demo(config: &ProductionConfig) -> Result<()> {
    let mut machine = ProductionMachine::new(
        sample_catalog(),
        SnapshotSlot::in_memory(),
        RandomSensor::seeded(7, config.min_increment_ml, config.max_increment_ml),
        Duration::from_millis(config.tick_interval_ms.min(20)),
    );

    println!("1) Produção interrompida depois do primeiro pigmento");
    machine.select_formula("f-ocre")?;
    run(&mut machine, Some(1)).await?;

    let entry = machine
        .store()
        .list_history()
        .into_iter()
        .find(|e| e.is_resumable())
        .context("demo run left no unfinished entry")?;

    println!("\n2) Retomando {}", entry.id);
    machine.resume_history(&entry.id)?;
    run(&mut machine, None).await?;

    println!("\n3) Histórico");
    print_history(&machine.store().list_history());
    Ok(())
}
