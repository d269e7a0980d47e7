use std::collections::BTreeMap;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

/// The fixed set of providers under comparison. Ordering drives report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    NftPort,
    Alchemy,
    Moralis,
    QuickNode,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::NftPort => "nftport",
            ProviderKind::Alchemy => "alchemy",
            ProviderKind::Moralis => "moralis",
            ProviderKind::QuickNode => "quicknode",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Per-(address, provider) counters
// ---------------------------------------------------------------------------

/// Accumulator for one address on one provider. Counters only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub item_count: u64,
    pub items_with_metadata: u64,
    pub items_with_cached_image: u64,
    pub sale_transactions: u64,
    pub has_floor_price: bool,
    /// Some call for this provider failed; counters hold whatever was collected before.
    pub failed: bool,
}

impl ProviderStats {
    /// Count one listed item. A cached image is only counted alongside metadata,
    /// which keeps `item_count >= items_with_metadata >= items_with_cached_image`.
    pub fn record_item(&mut self, has_metadata: bool, has_cached_image: bool) {
        self.item_count += 1;
        if has_metadata {
            self.items_with_metadata += 1;
            if has_cached_image {
                self.items_with_cached_image += 1;
            }
        }
    }

    pub fn record_sale(&mut self) {
        self.sale_transactions += 1;
    }

    pub fn record_sales(&mut self, count: u64) {
        self.sale_transactions = self.sale_transactions.saturating_add(count);
    }

    /// One-way latch.
    pub fn mark_floor_price(&mut self) {
        self.has_floor_price = true;
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// One row of the input list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressInput {
    #[serde(alias = "contract_address", alias = "wallet_address")]
    pub address: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[cfg(test)]
impl AddressInput {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), slug: None }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

/// Finished comparison for one address across every provider in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: String,
    pub slug: Option<String>,
    pub token_supply: Option<u64>,
    pub providers: BTreeMap<ProviderKind, ProviderStats>,
}

impl AddressRecord {
    /// Record with default stats for every provider, used when an address blew up
    /// before anything could be collected.
    pub fn empty(input: &AddressInput, providers: &[ProviderKind]) -> Self {
        Self {
            address: input.address.clone(),
            slug: input.slug.clone(),
            token_supply: None,
            providers: providers
                .iter()
                .map(|&kind| (kind, ProviderStats { failed: true, ..Default::default() }))
                .collect(),
        }
    }

    pub fn stats(&self, kind: ProviderKind) -> Option<&ProviderStats> {
        self.providers.get(&kind)
    }
}
