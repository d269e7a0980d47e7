//! Scripted provider used by aggregator and runner tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpClient, RetryPolicy};
use crate::provider::{
    Capabilities, ListingTarget, Lookup, NftItem, Page, PageCursor, ProviderClient, TransferOrder,
    TransferRecord,
};
use crate::types::ProviderKind;

pub struct StubProvider {
    pub kind: ProviderKind,
    pub caps: Capabilities,
    /// Listing pages served for page numbers 1..=len.
    pub listing: Vec<Vec<NftItem>>,
    pub transfers: Vec<Vec<TransferRecord>>,
    /// 1-based listing page that errors instead of answering.
    pub fail_listing_page: Option<u32>,
    pub floor: Lookup<f64>,
    pub supply: Option<u64>,
    pub fail_supply: bool,
    /// Address whose listing panics.
    pub panic_on: Option<String>,
    pub transfer_calls: AtomicU32,
}

impl StubProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            caps: Capabilities {
                transfers: true,
                floor_price: true,
                token_supply: false,
                cached_images: true,
            },
            listing: Vec::new(),
            transfers: Vec::new(),
            fail_listing_page: None,
            floor: Lookup::Missing,
            supply: None,
            fail_supply: false,
            panic_on: None,
            transfer_calls: AtomicU32::new(0),
        }
    }

    /// `pages` listing pages of `per_page` items; the first `with_metadata` of each have
    /// metadata and the first `cached` of those a cached image.
    pub fn with_listing(mut self, pages: usize, per_page: usize, with_metadata: usize, cached: usize) -> Self {
        self.listing = (0..pages).map(|_| items(per_page, with_metadata, cached)).collect();
        self
    }

    pub fn with_pages(mut self, pages: Vec<Vec<NftItem>>) -> Self {
        self.listing = pages;
        self
    }

    pub fn with_transfers(mut self, pages: Vec<Vec<TransferRecord>>) -> Self {
        self.transfers = pages;
        self
    }

    pub fn failing_on_page(mut self, page: u32) -> Self {
        self.fail_listing_page = Some(page);
        self
    }

    pub fn with_floor(mut self, price: f64) -> Self {
        self.floor = Lookup::Found(price);
        self
    }

    pub fn with_supply(mut self, supply: u64) -> Self {
        self.caps.token_supply = true;
        self.supply = Some(supply);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.caps.cached_images = false;
        self
    }

    pub fn panicking_on(mut self, address: &str) -> Self {
        self.panic_on = Some(address.to_string());
        self
    }

    fn serve<T: Clone>(pages: &[Vec<T>], cursor: &PageCursor) -> Page<T> {
        let n = cursor.page_number() as usize;
        let records = pages.get(n - 1).cloned().unwrap_or_default();
        let next = (n < pages.len()).then(|| PageCursor::Page(n as u32 + 1));
        Page::new(records, next)
    }
}

/// Real client for constructor tests; nothing in those tests sends a request.
pub fn test_http() -> HttpClient {
    let policy = RetryPolicy {
        max_attempts: 1,
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    };
    HttpClient::new(Duration::from_secs(1), policy).unwrap()
}

pub fn items(count: usize, with_metadata: usize, cached: usize) -> Vec<NftItem> {
    (0..count)
        .map(|i| NftItem {
            has_metadata: i < with_metadata,
            has_cached_image: i < cached,
        })
        .collect()
}

pub fn sale_at(ts: u64) -> TransferRecord {
    TransferRecord {
        timestamp: Some(ts),
        from: Some("0x1111111111111111111111111111111111111111".to_string()),
        to: Some("0x2222222222222222222222222222222222222222".to_string()),
        is_sale: true,
    }
}

fn bad_request() -> ProviderError {
    ProviderError::Status {
        status: StatusCode::BAD_REQUEST,
        body: "stub failure".to_string(),
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn transfer_order(&self) -> TransferOrder {
        TransferOrder::NewestFirst
    }

    fn initial_cursor(&self, _target: ListingTarget) -> PageCursor {
        PageCursor::Page(1)
    }

    fn initial_transfer_cursor(&self) -> PageCursor {
        PageCursor::Page(1)
    }

    async fn fetch_listing_page(
        &self,
        _target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>> {
        if self.panic_on.as_deref() == Some(address) {
            panic!("stub provider panic for {address}");
        }
        if self.fail_listing_page == Some(cursor.page_number()) {
            return Err(bad_request());
        }
        Ok(Self::serve(&self.listing, &cursor))
    }

    async fn fetch_transfer_page(
        &self,
        _address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<TransferRecord>> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::serve(&self.transfers, &cursor))
    }

    async fn fetch_floor_price(&self, _address: &str) -> ProviderResult<Lookup<f64>> {
        if !self.caps.floor_price {
            return Ok(Lookup::Unsupported);
        }
        Ok(self.floor.clone())
    }

    async fn fetch_token_supply(&self, _address: &str) -> ProviderResult<Lookup<u64>> {
        if self.fail_supply {
            return Err(bad_request());
        }
        if !self.caps.token_supply {
            return Ok(Lookup::Unsupported);
        }
        Ok(self.supply.into())
    }
}
