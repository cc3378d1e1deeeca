use std::io::{self, BufWriter, Write};

use anyhow::Context;
use leaseflake::{IdService, LeaseflakeId, SlotSource, StaticSlot};
use leaseflake_lease::{LeaseCoordinator, LeaseStatus, RefreshTask, SqliteLeaseStore};

use crate::cli::config::{AppConfig, Command};
use crate::cli::output::{LeaseRow, write_decoded, write_id, write_lease_row};
use crate::shutdown_signal;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    match config.command.clone() {
        Command::Provision { slots } => provision(&config, slots),
        Command::Status { json } => status(&config, json),
        Command::Generate {
            count,
            slot: Some(slot),
            json,
        } => {
            let service = IdService::new(StaticSlot::new(slot)?);
            emit_ids(&service, count, json)
        }
        Command::Generate {
            count,
            slot: None,
            json,
        } => generate_leased(&config, count, json).await,
        Command::Decode { ids, json } => decode(&ids, json),
        Command::Hold => hold(&config).await,
    }
}

fn open_store(config: &AppConfig) -> anyhow::Result<SqliteLeaseStore> {
    SqliteLeaseStore::open(&config.database, &config.table)
        .with_context(|| format!("opening lease store {}", config.database.display()))
}

fn provision(config: &AppConfig, slots: usize) -> anyhow::Result<()> {
    let inserted = open_store(config)?.provision(slots)?;
    println!(
        "table {} ready: {inserted} new of {slots} slots",
        config.table
    );
    Ok(())
}

fn status(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let records = open_store(config)?.records()?;
    let mut out = BufWriter::new(io::stdout().lock());
    for record in records {
        write_lease_row(&mut out, &LeaseRow::from(record), json)?;
    }
    out.flush()?;
    Ok(())
}

/// Leases a slot and starts renewing it in the background.
async fn acquire(
    config: &AppConfig,
) -> anyhow::Result<(LeaseCoordinator<SqliteLeaseStore>, RefreshTask, u8)> {
    let coordinator = LeaseCoordinator::new(open_store(config)?, config.lease.clone())?;
    let task = coordinator.spawn();
    let slot = coordinator
        .wait_for_slot(config.acquire_timeout)
        .await
        .context("no slot could be leased; is the table provisioned and not exhausted?")?;
    Ok((coordinator, task, slot))
}

async fn generate_leased(config: &AppConfig, count: usize, json: bool) -> anyhow::Result<()> {
    let (coordinator, task, slot) = acquire(config).await?;
    tracing::debug!(slot, count, "generating with leased slot");

    let service = IdService::new(coordinator);
    let result = tokio::task::spawn_blocking(move || emit_ids(&service, count, json)).await;

    task.shutdown().await?;
    result?
}

fn emit_ids<S: SlotSource>(service: &IdService<S>, count: usize, json: bool) -> anyhow::Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for _ in 0..count {
        write_id(&mut out, service.next_id()?, json)?;
    }
    out.flush()?;
    Ok(())
}

fn decode(ids: &[String], json: bool) -> anyhow::Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for raw in ids {
        let value: i64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{raw:?} is not an integer"))?;
        let id = LeaseflakeId::from_i64(value)
            .with_context(|| format!("{raw} is not a valid leaseflake ID"))?;
        write_decoded(&mut out, id, json)?;
    }
    out.flush()?;
    Ok(())
}

async fn hold(config: &AppConfig) -> anyhow::Result<()> {
    let (coordinator, task, slot) = acquire(config).await?;
    tracing::info!(
        slot,
        owner = %coordinator.owner_token(),
        skew_ms = coordinator.clock_skew_millis(),
        "holding slot until shutdown"
    );

    shutdown_signal().await;

    task.shutdown().await?;
    match coordinator.status() {
        LeaseStatus::Leased { slot, remaining } | LeaseStatus::Expiring { slot, remaining } => {
            tracing::info!(
                slot,
                ?remaining,
                "stopped renewing, the row frees up once its lease runs out"
            );
        }
        LeaseStatus::Lapsed { slot } => tracing::warn!(slot, "lease had already lapsed"),
        LeaseStatus::Unassigned => tracing::warn!("no slot was held at shutdown"),
    }
    Ok(())
}
