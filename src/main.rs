use std::env;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use econ_gauge::config::{now_ts, Config};
use econ_gauge::gauge::GaugeRegistry;
use econ_gauge::logging::{log, obj, run_id, v_str, Domain, Level};
use econ_gauge::pipeline::Pipeline;
use econ_gauge::report::Report;
use econ_gauge::storage::{CacheBackend, MemoryBackend, SnapshotKey, SqliteBackend};
use econ_gauge::store::DataStore;

const USAGE: &str = "usage: econ_gauge <run [--force] | report | status | archive <mode> <label> | snapshot <mode> <label>>";

fn open_store(cfg: &Config) -> Result<DataStore> {
    let backend: Box<dyn CacheBackend> = match &cfg.sqlite_path {
        Some(path) => Box::new(
            SqliteBackend::new(path).with_context(|| format!("opening sqlite store {}", path))?,
        ),
        None => Box::new(MemoryBackend::default()),
    };
    let mut store = DataStore::new(backend, cfg.cache_ttl_secs);
    store.init()?;
    Ok(store)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn snapshot_key(cfg: &Config, args: &[String]) -> Result<SnapshotKey> {
    match args {
        [mode, label, ..] => Ok(SnapshotKey::new(&cfg.country, mode, label)),
        _ => bail!("{}", USAGE),
    }
}

fn build_report(cfg: &Config, registry: &GaugeRegistry, store: &DataStore) -> Report {
    let now = now_ts();
    Report::build(registry, &store.snapshot_at(now), store.status(now), &cfg.country, Utc::now())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{}", USAGE);
    };

    let cfg = Config::from_env();
    let registry = GaugeRegistry::load(cfg.gauge_catalog.as_deref())?;
    let mut store = open_store(&cfg)?;

    log(
        Level::Info,
        Domain::System,
        "start",
        obj(&[
            ("command", v_str(command)),
            ("run", v_str(&run_id())),
            ("catalog", v_str(registry.version())),
            ("country", v_str(&cfg.country)),
        ]),
    );

    match command.as_str() {
        "run" => {
            let force = args.iter().any(|a| a == "--force");
            if force || store.is_expired(now_ts()) {
                let pipeline = Pipeline::from_config(&cfg, registry);
                pipeline.run_cycle(&mut store, Utc::now().date_naive()).await?;
                print_json(&build_report(&cfg, pipeline.registry(), &store))?;
            } else {
                log(
                    Level::Info,
                    Domain::Cache,
                    "refresh_skipped",
                    obj(&[("reason", v_str("ttl_not_elapsed"))]),
                );
                print_json(&build_report(&cfg, &registry, &store))?;
            }
        }
        "report" => print_json(&build_report(&cfg, &registry, &store))?,
        "status" => print_json(&store.status(now_ts()))?,
        "archive" => {
            let key = snapshot_key(&cfg, &args[1..])?;
            let archived = store.archive_snapshot(&key, now_ts())?;
            print_json(&json!({
                "country": key.country,
                "period_mode": key.period_mode,
                "period_label": key.period_label,
                "archived": archived,
            }))?;
        }
        "snapshot" => {
            let key = snapshot_key(&cfg, &args[1..])?;
            print_json(&store.get_snapshot(&key)?)?;
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }

    store.shutdown()
}
