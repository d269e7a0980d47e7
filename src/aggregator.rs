use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::pagination::{PaginationWalker, WalkOutcome};
use crate::provider::{ListingTarget, Lookup, ProviderClient, ProviderSet};
use crate::types::{AddressInput, AddressRecord, ProviderKind, ProviderStats};
use crate::window::{TimeWindow, TransferFilter};

/// Produces the finished comparison for one address. Never fails: provider
/// errors are folded into the record as `failed` stats.
#[async_trait]
pub trait AddressAggregator: Send + Sync {
    fn provider_kinds(&self) -> Vec<ProviderKind>;

    async fn aggregate(&self, input: &AddressInput) -> AddressRecord;
}

// ---------------------------------------------------------------------------
// Shared walk helpers
// ---------------------------------------------------------------------------

async fn walk_listing(
    walker: &PaginationWalker,
    client: &dyn ProviderClient,
    target: ListingTarget,
    address: &str,
    stats: &mut ProviderStats,
) -> WalkOutcome {
    let label = format!("{address} [{}] listing", client.kind());
    // Providers that never cache images get a hard zero regardless of payload.
    let caches = client.capabilities().cached_images;
    walker
        .walk(
            &label,
            client.initial_cursor(target),
            |cursor| client.fetch_listing_page(target, address, cursor),
            |items| {
                for item in items {
                    stats.record_item(item.has_metadata, caches && item.has_cached_image);
                }
                ControlFlow::Continue(())
            },
        )
        .await
}

fn note_walk(address: &str, kind: ProviderKind, what: &str, outcome: &WalkOutcome, stats: &mut ProviderStats) {
    if let Some(e) = outcome.error() {
        warn!(
            address = %address,
            provider = %kind,
            pages = outcome.pages,
            "{what} walk failed, keeping partial counts: {e}"
        );
        stats.mark_failed();
    } else if outcome.hit_page_cap() {
        warn!(address = %address, provider = %kind, "{what} walk truncated at the page cap");
    } else {
        debug!(address = %address, provider = %kind, "{what} walk ended after {} pages", outcome.pages);
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Collection listing, floor price, recent sales and token supply for a contract.
pub struct ContractStatsAggregator {
    providers: ProviderSet,
    walker: PaginationWalker,
    /// `None` disables the transaction pass.
    window: Option<TimeWindow>,
}

impl ContractStatsAggregator {
    pub fn new(providers: ProviderSet, walker: PaginationWalker, window: Option<TimeWindow>) -> Self {
        Self { providers, walker, window }
    }

    async fn provider_stats(&self, client: &Arc<dyn ProviderClient>, address: &str) -> ProviderStats {
        let kind = client.kind();
        let caps = client.capabilities();
        let mut stats = ProviderStats::default();

        let outcome = walk_listing(&self.walker, client.as_ref(), ListingTarget::Collection, address, &mut stats).await;
        note_walk(address, kind, "listing", &outcome, &mut stats);

        if caps.floor_price {
            match client.fetch_floor_price(address).await {
                Ok(Lookup::Found(price)) => {
                    debug!(address = %address, provider = %kind, "floor price {price}");
                    stats.mark_floor_price();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(address = %address, provider = %kind, "floor price lookup failed: {e}");
                    stats.mark_failed();
                }
            }
        }

        if let Some(window) = self.window.filter(|_| caps.transfers) {
            let label = format!("{address} [{kind}] transfers");
            let mut filter = TransferFilter::new(window, client.transfer_order(), label.clone());
            let outcome = self
                .walker
                .walk(
                    &label,
                    client.initial_transfer_cursor(),
                    |cursor| client.fetch_transfer_page(address, cursor),
                    |records| filter.consume(records),
                )
                .await;
            stats.record_sales(filter.counted);
            note_walk(address, kind, "transfer", &outcome, &mut stats);
        }

        stats
    }

    async fn token_supply(&self, address: &str) -> Option<u64> {
        let client = self.providers.supply_source()?;
        match client.fetch_token_supply(address).await {
            Ok(lookup) => lookup.found(),
            Err(e) => {
                warn!(address = %address, provider = %client.kind(), "token supply lookup failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl AddressAggregator for ContractStatsAggregator {
    fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.kinds()
    }

    async fn aggregate(&self, input: &AddressInput) -> AddressRecord {
        let address = input.address.as_str();
        let per_provider = join_all(self.providers.iter().map(|c| async move {
            (c.kind(), self.provider_stats(c, address).await)
        }));
        let (token_supply, providers) = tokio::join!(self.token_supply(address), per_provider);

        AddressRecord {
            address: input.address.clone(),
            slug: input.slug.clone(),
            token_supply,
            providers: providers.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

/// Ownership comparison: what each provider reports a wallet holds.
pub struct WalletStatsAggregator {
    providers: ProviderSet,
    walker: PaginationWalker,
}

impl WalletStatsAggregator {
    pub fn new(providers: ProviderSet, walker: PaginationWalker) -> Self {
        Self { providers, walker }
    }

    async fn provider_stats(&self, client: &Arc<dyn ProviderClient>, address: &str) -> ProviderStats {
        let mut stats = ProviderStats::default();
        let outcome = walk_listing(&self.walker, client.as_ref(), ListingTarget::Owner, address, &mut stats).await;
        note_walk(address, client.kind(), "ownership", &outcome, &mut stats);
        stats
    }
}

#[async_trait]
impl AddressAggregator for WalletStatsAggregator {
    fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.kinds()
    }

    async fn aggregate(&self, input: &AddressInput) -> AddressRecord {
        let address = input.address.as_str();
        let providers = join_all(self.providers.iter().map(|c| async move {
            (c.kind(), self.provider_stats(c, address).await)
        }))
        .await;

        AddressRecord {
            address: input.address.clone(),
            slug: input.slug.clone(),
            token_supply: None,
            providers: providers.into_iter().collect(),
        }
    }
}
