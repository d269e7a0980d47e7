use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::Result;
use crate::types::AddressRecord;

/// Receives finished records from the shard workers and appends one line per
/// address to the backup file. Runs as a dedicated background task so workers
/// never wait on disk.
pub struct BackupWriter {
    path: PathBuf,
    record_rx: mpsc::Receiver<AddressRecord>,
}

impl BackupWriter {
    /// Truncates any backup left by a previous run.
    pub async fn create(path: impl AsRef<Path>, record_rx: mpsc::Receiver<AddressRecord>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::write(&path, b"").await?;
        Ok(Self { path, record_rx })
    }

    /// Drains the channel until every sender is dropped. Returns the number of lines written.
    pub async fn run(mut self) -> u64 {
        let mut written = 0u64;
        while let Some(record) = self.record_rx.recv().await {
            match self.append(&record).await {
                Ok(()) => written += 1,
                Err(e) => error!(address = %record.address, "Backup write error: {e}"),
            }
        }
        info!("Backup complete: {written} lines in {}", self.path.display());
        written
    }

    async fn append(&self, record: &AddressRecord) -> Result<()> {
        let mut line = format_backup_line(record);
        line.push('\n');
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// `address | slug | supply | provider: items=.. meta=.. cached=.. sales=.. floor=.. [partial]`
pub fn format_backup_line(record: &AddressRecord) -> String {
    let mut line = format!(
        "{} | slug={} | supply={}",
        record.address,
        record.slug.as_deref().unwrap_or("-"),
        record.token_supply.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
    );
    for (kind, s) in &record.providers {
        let _ = write!(
            line,
            " | {kind}: items={} meta={} cached={} sales={} floor={}",
            s.item_count, s.items_with_metadata, s.items_with_cached_image, s.sale_transactions, s.has_floor_price,
        );
        if s.failed {
            line.push_str(" partial");
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AddressInput, ProviderKind, ProviderStats};

    fn record(address: &str) -> AddressRecord {
        let mut r = AddressRecord::empty(&AddressInput::new(address), &[ProviderKind::NftPort, ProviderKind::Moralis]);
        r.providers.insert(
            ProviderKind::NftPort,
            ProviderStats { item_count: 4, items_with_metadata: 3, items_with_cached_image: 1, ..Default::default() },
        );
        r
    }

    #[test]
    fn line_lists_every_provider() {
        let line = format_backup_line(&record("0xabc"));
        assert_eq!(
            line,
            "0xabc | slug=- | supply=unknown \
             | nftport: items=4 meta=3 cached=1 sales=0 floor=false \
             | moralis: items=0 meta=0 cached=0 sales=0 floor=false partial"
        );
    }

    #[tokio::test]
    async fn truncates_then_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(&path, "stale line from last run\n").unwrap();

        let (tx, rx) = mpsc::channel(8);
        let writer = BackupWriter::create(&path, rx).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let handle = tokio::spawn(writer.run());
        tx.send(record("0x1")).await.unwrap();
        tx.send(record("0x2")).await.unwrap();
        drop(tx);
        assert_eq!(handle.await.unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x1 | "));
        assert!(lines[1].starts_with("0x2 | "));
    }
}
