use std::collections::BTreeMap;

use crate::types::{AddressRecord, ProviderKind, ProviderStats};

/// Run-wide sums for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderTotals {
    pub total_items: u64,
    pub total_with_metadata: u64,
    pub total_with_cached_image: u64,
    pub total_sale_transactions: u64,
    /// Addresses for which this provider reported a floor price.
    pub total_with_floor_price: u64,
    /// Addresses for which this provider returned partial data.
    pub total_failures: u64,
}

impl ProviderTotals {
    pub fn add(&mut self, stats: &ProviderStats) {
        self.total_items += stats.item_count;
        self.total_with_metadata += stats.items_with_metadata;
        self.total_with_cached_image += stats.items_with_cached_image;
        self.total_sale_transactions += stats.sale_transactions;
        self.total_with_floor_price += u64::from(stats.has_floor_price);
        self.total_failures += u64::from(stats.failed);
    }

    pub fn merge(&mut self, other: &ProviderTotals) {
        self.total_items += other.total_items;
        self.total_with_metadata += other.total_with_metadata;
        self.total_with_cached_image += other.total_with_cached_image;
        self.total_sale_transactions += other.total_sale_transactions;
        self.total_with_floor_price += other.total_with_floor_price;
        self.total_failures += other.total_failures;
    }
}

/// Fold of every `AddressRecord` in a run. Addition only, so the result does not
/// depend on how addresses were sharded or in which order they finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalStats {
    pub total_address_count: u64,
    pub total_token_supply: u64,
    pub providers: BTreeMap<ProviderKind, ProviderTotals>,
}

impl GlobalStats {
    /// Empty totals with a row for each provider, so providers that never
    /// answered still show up as zeros.
    pub fn with_providers(kinds: &[ProviderKind]) -> Self {
        Self {
            providers: kinds.iter().map(|&k| (k, ProviderTotals::default())).collect(),
            ..Default::default()
        }
    }

    pub fn from_records(kinds: &[ProviderKind], records: &[AddressRecord]) -> Self {
        records.iter().fold(Self::with_providers(kinds), |mut acc, r| {
            acc.absorb(r);
            acc
        })
    }

    pub fn absorb(&mut self, record: &AddressRecord) {
        self.total_address_count += 1;
        self.total_token_supply += record.token_supply.unwrap_or(0);
        for (kind, stats) in &record.providers {
            self.providers.entry(*kind).or_default().add(stats);
        }
    }

    pub fn merge(&mut self, other: GlobalStats) {
        self.total_address_count += other.total_address_count;
        self.total_token_supply += other.total_token_supply;
        for (kind, totals) in other.providers {
            self.providers.entry(kind).or_default().merge(&totals);
        }
    }

    pub fn totals(&self, kind: ProviderKind) -> Option<&ProviderTotals> {
        self.providers.get(&kind)
    }
}
