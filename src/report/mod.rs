pub mod backup;

use std::fmt::Write;
use std::path::Path;

use crate::config::CompareMode;
use crate::error::Result;
use crate::stats::GlobalStats;
use crate::types::{AddressRecord, ProviderKind, ProviderStats};

pub use backup::BackupWriter;

const RULE: &str = "---------------------------------------------------------";

/// Render the full text report: global totals first, then one section per address.
pub fn render_report(mode: CompareMode, global: &GlobalStats, records: &[AddressRecord]) -> String {
    let mut out = String::new();
    let kinds: Vec<ProviderKind> = global.providers.keys().copied().collect();
    // Writing into a String cannot fail.
    let _ = write_global(&mut out, mode, global);
    let _ = write_addresses(&mut out, mode, &kinds, records);
    out
}

pub async fn write_report(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

fn write_global(out: &mut String, mode: CompareMode, g: &GlobalStats) -> std::fmt::Result {
    match mode {
        CompareMode::Contracts => {
            writeln!(out, "## Report of collection stats\n")?;
            writeln!(out, "Total number of collections:   {}", g.total_address_count)?;
            writeln!(out, "Total NFT supply of all collections:   {}", g.total_token_supply)?;
        }
        CompareMode::Wallets => {
            writeln!(out, "## Report of wallet ownership stats\n")?;
            writeln!(out, "Total number of wallets:   {}", g.total_address_count)?;
        }
    }

    for (kind, t) in &g.providers {
        writeln!(out, "\n{RULE}\n\n{kind}\n")?;
        writeln!(out, "Total NFTs found:   {}", t.total_items)?;
        writeln!(out, "Total NFTs that have metadata:   {}", t.total_with_metadata)?;
        writeln!(out, "Total NFTs that have cached images:   {}", t.total_with_cached_image)?;
        if mode == CompareMode::Contracts {
            writeln!(out, "Total transactions with sale price:   {}", t.total_sale_transactions)?;
            writeln!(out, "Total collections with floor price:   {}", t.total_with_floor_price)?;
        }
        writeln!(out, "Addresses with partial data:   {}", t.total_failures)?;
    }
    Ok(())
}

fn write_addresses(
    out: &mut String,
    mode: CompareMode,
    kinds: &[ProviderKind],
    records: &[AddressRecord],
) -> std::fmt::Result {
    let heading = match mode {
        CompareMode::Contracts => "Stats for each collection",
        CompareMode::Wallets => "Stats for each wallet",
    };
    writeln!(out, "\n\n{RULE}\n{heading}\n{RULE}")?;

    for r in records {
        writeln!(out, "\nAddress:   {}", r.address)?;
        if mode == CompareMode::Contracts {
            writeln!(out, "Slug:   {}", r.slug.as_deref().unwrap_or("-"))?;
            match r.token_supply {
                Some(supply) => writeln!(out, "Token supply:   {supply}")?,
                None => writeln!(out, "Token supply:   unknown")?,
            }
        }
        for kind in kinds {
            let default = ProviderStats::default();
            let s = r.stats(*kind).unwrap_or(&default);
            writeln!(out, "\n{kind}:{}", if s.failed { "   (partial, provider errors)" } else { "" })?;
            write_provider_stats(out, mode, s)?;
        }
        writeln!(out, "\n{RULE}")?;
    }
    Ok(())
}

fn write_provider_stats(out: &mut String, mode: CompareMode, s: &ProviderStats) -> std::fmt::Result {
    writeln!(out, "Number of NFTs found:   {}", s.item_count)?;
    writeln!(out, "Number of NFTs with metadata:   {}", s.items_with_metadata)?;
    writeln!(out, "Number of NFTs with cached images:   {}", s.items_with_cached_image)?;
    if mode == CompareMode::Contracts {
        writeln!(out, "Number of transactions with sale price:   {}", s.sale_transactions)?;
        writeln!(out, "Floor price available:   {}", s.has_floor_price)?;
    }
    Ok(())
}
