use std::sync::Arc;

use chrono::Duration;
use clap::Parser;
use cmdb_core::CmdbConfig;
use cmdb_scheduler::{
    next_occurrence, Clock, ScheduleRule, SchedulerEngine, SystemClock, TraceLevel, TraceLog,
    TraceSink,
};
use cmdb_store::ChangeStore;
use anyhow::Context;
use tracing::info;

mod cli;
mod purge;

use cli::{Cli, Command};
use purge::ChangePurgeProcess;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries trace lines and command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cmdb_cron=info,cmdb_scheduler=info,cmdb_store=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > CMDB_CONFIG env > ~/.cmdb/cmdb.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("CMDB_CONFIG").ok());
    let config = load_config(config_path.as_deref())?;

    match cli.command {
        Command::NextRun { module, now } => next_run(&config, &module, now),
        Command::Purge {
            older_than_days,
            dry_run,
        } => purge_now(&config, older_than_days, dry_run),
        Command::Flatten { table, id, fields } => {
            let store = open_store(&config)?;
            let fields: Option<Vec<&str>> = fields
                .as_ref()
                .map(|list| list.iter().map(String::as_str).collect());
            let record = store.flatten(&table, id, fields.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

/// A missing file means defaults; a file that does not parse is fatal.
fn load_config(path: Option<&str>) -> anyhow::Result<CmdbConfig> {
    CmdbConfig::load(path).with_context(|| match path {
        Some(path) => format!("invalid configuration in {path}"),
        None => "invalid configuration".to_string(),
    })
}

fn next_run(
    config: &CmdbConfig,
    module: &str,
    now: Option<chrono::NaiveDateTime>,
) -> anyhow::Result<()> {
    let settings = config.module(module);
    let trace = TraceLog::new(
        module,
        TraceLevel::for_settings(&settings)?,
        TraceSink::Stdout,
    );
    let rule = match ScheduleRule::from_settings(&settings) {
        Ok(rule) => rule,
        Err(e) => {
            trace.error(&format!("{module}: {e}"));
            return Err(e.into());
        }
    };
    let now = now.unwrap_or_else(|| SystemClock.now());
    let next = next_occurrence(&rule, now);
    trace.info(&format!("{module}: next run at {next}"));

    let out = serde_json::json!({
        "module": module,
        "rule": rule,
        "now": now.to_string(),
        "next_run": next.to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn purge_now(config: &CmdbConfig, older_than_days: u32, dry_run: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let cutoff = SystemClock.now() - Duration::days(i64::from(older_than_days));
    if dry_run {
        let ids = store.change_ids_before(cutoff, usize::MAX)?;
        println!("{} change(s) dated before {cutoff} would be deleted", ids.len());
        return Ok(());
    }
    let summary = store.delete_changes_before(cutoff)?;
    println!(
        "{} change(s) and {} operation(s) dated before {cutoff} deleted",
        summary.changes, summary.operations
    );
    Ok(())
}

async fn run(config: CmdbConfig) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&config)?);
    let purge = ChangePurgeProcess::from_settings(store, &config.module(purge::MODULE_CODE))?;

    let mut engine = SchedulerEngine::new(config, Arc::new(SystemClock));
    engine.register(Box::new(purge))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping scheduler");
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

fn open_store(config: &CmdbConfig) -> anyhow::Result<ChangeStore> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = rusqlite::Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(ChangeStore::new(conn)?)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
