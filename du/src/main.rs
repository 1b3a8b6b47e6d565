//! DU Cell Scheduler Application
//!
//! Entry point wiring the YAML configuration into a per-cell slot scheduler
//! and driving it at the slot cadence until shutdown.

use anyhow::Result;
use clap::Parser;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};
use tracing_subscriber::{fmt, EnvFilter};

use common::slot_point::SlotPoint;
use scheduler::harq::TxBufferPoolConfig;
use scheduler::orchestrator::CellScheduler;

mod config;
use config::DuConfig;

/// gNB DU cell scheduler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = DuConfig::from_yaml_file(&args.config)?;

    let log_level = args.log_level.as_ref().unwrap_or(&config.log.all_level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting DU cell scheduler");
    info!("Configuration loaded from: {}", args.config);

    let cell_cfg = config::build_cell_configuration(&config)?;
    info!("Cell configuration:");
    info!("  PCI: {}", cell_cfg.pci.0);
    info!("  Subcarrier spacing: {} kHz", config.cell_cfg.common_scs);
    info!("  Bandwidth: {} MHz", config.cell_cfg.channel_bandwidth_mhz);
    info!("  DL BWP CRBs: {}", cell_cfg.dl_bwp.crbs);
    info!("  RAR window: {} slots", cell_cfg.rach.ra_resp_window_slots);
    info!(
        "  Duplex: {}",
        if config.cell_cfg.tdd.is_some() { "TDD" } else { "FDD" }
    );

    let pool_cfg = TxBufferPoolConfig {
        max_codeblock_size: config.harq_pool.max_codeblock_size,
        nof_buffers: config.harq_pool.nof_buffers,
        nof_codeblocks: config.harq_pool.nof_codeblocks,
        expire_timeout_slots: config.harq_pool.expire_timeout_slots,
        external_soft_bits: config.harq_pool.external_soft_bits,
    };

    let scs = cell_cfg.scs_common;
    let start_slot = SlotPoint::from_scs(scs, 0);
    let mut cell = CellScheduler::new(cell_cfg, pool_cfg, start_slot)
        .map_err(|e| anyhow::anyhow!("Failed to create cell scheduler: {}", e))?;

    // Indication entry points for the PHY/FAPI adapter threads.
    let _rach_sender = cell.rach_sender();
    let _crc_sender = cell.crc_sender();
    let _sr_sender = cell.sr_sender();

    let slot_duration =
        std::time::Duration::from_micros(1000 / scs.slots_per_subframe() as u64);
    info!("Slot duration: {} us", slot_duration.as_micros());

    let running = Arc::new(AtomicBool::new(true));
    let slots_processed = Arc::new(AtomicU64::new(0));

    // Scheduler thread: one tick per slot boundary.
    let sched_handle = {
        let running = running.clone();
        let slots_processed = slots_processed.clone();
        tokio::task::spawn_blocking(move || {
            let mut next_tick = std::time::Instant::now();
            while running.load(Ordering::Acquire) {
                let result = cell.run_slot();
                slots_processed.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "slot result: {} dl_pdcch, {} rar, {} pusch",
                    result.dl.dl_pdcchs.len(),
                    result.dl.rar_grants.len(),
                    result.ul.puschs.len()
                );

                next_tick += slot_duration;
                let now = std::time::Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                } else {
                    // Fell behind; realign to the current slot boundary.
                    next_tick = now;
                }
            }
            cell.stop();
        })
    };

    // Periodic statistics reporting.
    let stats_handle = {
        let running = running.clone();
        let slots_processed = slots_processed.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(5));
            while running.load(Ordering::Acquire) {
                interval.tick().await;
                info!("Slots processed: {}", slots_processed.load(Ordering::Relaxed));
            }
        })
    };

    info!("DU cell scheduler initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    running.store(false, Ordering::Release);
    if let Err(e) = sched_handle.await {
        error!("Scheduler thread panicked: {}", e);
    }
    stats_handle.abort();

    info!("DU cell scheduler shutdown complete");
    Ok(())
}
