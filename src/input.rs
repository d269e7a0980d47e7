//! Address list loading. CSV with a header row: `address` (or
//! `contract_address` / `wallet_address`) and an optional `slug`.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::types::AddressInput;

pub async fn read_addresses(path: impl AsRef<Path>, limit: usize) -> Result<Vec<AddressInput>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Config(format!("cannot read address list {}: {e}", path.display()))
    })?;
    let inputs = parse_addresses(&content, limit)?;
    info!("Loaded {} addresses from {}", inputs.len(), path.display());
    Ok(inputs)
}

/// Rows past `limit` are dropped, blank addresses skipped.
pub fn parse_addresses(content: &str, limit: usize) -> Result<Vec<AddressInput>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut inputs = Vec::new();
    let mut blank = 0usize;
    for row in reader.deserialize::<AddressInput>() {
        let mut input = row?;
        if input.address.is_empty() {
            blank += 1;
            continue;
        }
        if inputs.len() == limit {
            warn!("Address limit of {limit} reached, ignoring the rest of the list");
            break;
        }
        input.slug = input.slug.filter(|s| !s.is_empty());
        inputs.push(input);
    }
    if blank > 0 {
        warn!("Skipped {blank} rows with a blank address");
    }
    Ok(inputs)
}
