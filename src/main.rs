mod aggregator;
mod config;
mod error;
mod http;
mod input;
mod pagination;
mod provider;
mod report;
mod runner;
mod stats;
mod types;
mod window;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::{AddressAggregator, ContractStatsAggregator, WalletStatsAggregator};
use crate::config::{CompareMode, Config, CHANNEL_CAPACITY};
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use crate::input::read_addresses;
use crate::pagination::PaginationWalker;
use crate::provider::ProviderSet;
use crate::report::{render_report, write_report, BackupWriter};
use crate::runner::{ConcurrentRunner, RunProgress, ShardState};
use crate::window::{now_secs, TimeWindow};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Inputs and providers ---
    let inputs = read_addresses(&cfg.input_path, cfg.address_limit).await?;
    if inputs.is_empty() {
        warn!("No addresses in {}, the report will be empty", cfg.input_path);
    }

    let http = HttpClient::from_config(&cfg)?;
    let providers = ProviderSet::from_config(&cfg, http)?;
    if providers.is_empty() {
        return Err(AppError::Config("no provider has credentials configured".to_string()));
    }
    let kinds = providers.kinds();
    info!("Comparing {} providers in {} mode: {kinds:?}", providers.len(), cfg.mode);

    let walker = PaginationWalker::new(cfg.max_pages);
    let aggregator: Arc<dyn AddressAggregator> = match cfg.mode {
        CompareMode::Contracts => {
            let window = cfg.enable_transactions.then(|| {
                TimeWindow::lookback(now_secs(), cfg.tx_lookback_days, cfg.tx_settle_secs)
            });
            match &window {
                Some(w) => info!(
                    "Counting sales between {} and {} (last {} days)",
                    w.lookback_limit, w.start_limit, cfg.tx_lookback_days
                ),
                None => info!("Transaction pass disabled"),
            }
            Arc::new(ContractStatsAggregator::new(providers, walker, window))
        }
        CompareMode::Wallets => Arc::new(WalletStatsAggregator::new(providers, walker)),
    };

    // --- Backup writer: dedicated task, fed by the shard workers ---
    let (backup_tx, backup_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = BackupWriter::create(&cfg.backup_path, backup_rx).await?;
    let writer_handle = tokio::spawn(writer.run());

    // --- Run ---
    let progress = Arc::new(RunProgress::new(inputs.len()));
    let outcome = ConcurrentRunner::from_config(&cfg)
        .run(inputs, aggregator, Some(backup_tx), progress)
        .await;

    let failed_shards = outcome.shards.iter().filter(|s| **s == ShardState::Failed).count();
    if failed_shards > 0 {
        warn!(
            "{failed_shards}/{} shard workers died; their addresses are reported empty",
            outcome.shards.len()
        );
    }

    match writer_handle.await {
        Ok(lines) => info!("Backup written to {} ({lines} addresses)", cfg.backup_path),
        Err(e) => warn!("Backup writer task failed: {e}"),
    }

    // --- Report ---
    let global = &outcome.global;
    let text = render_report(cfg.mode, global, &outcome.records);
    write_report(&cfg.report_path, &text).await?;

    info!(
        addresses = global.total_address_count,
        provider_failures = outcome.provider_failures,
        address_failures = outcome.address_failures,
        "Report written to {}",
        cfg.report_path
    );
    for kind in &kinds {
        let Some(totals) = global.totals(*kind) else { continue };
        info!(
            provider = %kind,
            items = totals.total_items,
            metadata = totals.total_with_metadata,
            cached = totals.total_with_cached_image,
            sales = totals.total_sale_transactions,
            floor = totals.total_with_floor_price,
            failures = totals.total_failures,
            "Provider totals"
        );
    }

    Ok(())
}
