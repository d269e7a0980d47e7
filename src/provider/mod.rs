pub mod alchemy;
pub mod moralis;
pub mod nftport;
pub mod quicknode;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::{ProviderResult, Result};
use crate::http::HttpClient;
use crate::types::ProviderKind;

pub use alchemy::AlchemyClient;
pub use moralis::MoralisClient;
pub use nftport::NftPortClient;
pub use quicknode::QuickNodeClient;

// ---------------------------------------------------------------------------
// Pagination state
// ---------------------------------------------------------------------------

/// Continuation state for the three pagination schemes providers use.
/// An empty token/cursor string is the "first page" value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// 1-based page number.
    Page(u32),
    /// Opaque continuation token / page key.
    Token(String),
    /// Cursor string.
    Cursor(String),
}

impl PageCursor {
    pub fn start_token() -> Self {
        PageCursor::Token(String::new())
    }

    pub fn start_cursor() -> Self {
        PageCursor::Cursor(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PageCursor::Page(_) => false,
            PageCursor::Token(s) | PageCursor::Cursor(s) => s.is_empty(),
        }
    }

    pub fn page_number(&self) -> u32 {
        match self {
            PageCursor::Page(n) => *n,
            _ => 1,
        }
    }

    /// Token or cursor value to send, `None` on the first page.
    pub fn as_param(&self) -> Option<String> {
        match self {
            PageCursor::Page(n) => Some(n.to_string()),
            PageCursor::Token(s) | PageCursor::Cursor(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// One fetched page. `next == None` ends the walk.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    /// Empty continuation strings are normalised to "no next page".
    pub fn new(records: Vec<T>, next: Option<PageCursor>) -> Self {
        let next = next.filter(|c| !c.is_empty());
        Self { records, next }
    }

    pub fn last(records: Vec<T>) -> Self {
        Self { records, next: None }
    }
}

// ---------------------------------------------------------------------------
// Normalised records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NftItem {
    pub has_metadata: bool,
    pub has_cached_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Unix seconds.
    pub timestamp: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// The provider classified this transfer as a priced sale.
    pub is_sale: bool,
}

/// Result of a single-value lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    /// The provider has no endpoint for this.
    Unsupported,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(v: Option<T>) -> Self {
        v.map(Lookup::Found).unwrap_or(Lookup::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub transfers: bool,
    pub floor_price: bool,
    pub token_supply: bool,
    pub cached_images: bool,
}

/// Order in which a provider returns transfer history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOrder {
    /// Descending by timestamp; the first record older than the window ends the walk.
    NewestFirst,
    /// No usable order; the whole history is walked and filtered.
    Unordered,
}

/// What a listing walk enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTarget {
    /// Every token of a contract.
    Collection,
    /// Every token held by a wallet.
    Owner,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities;

    fn transfer_order(&self) -> TransferOrder {
        TransferOrder::NewestFirst
    }

    fn initial_cursor(&self, target: ListingTarget) -> PageCursor;

    fn initial_transfer_cursor(&self) -> PageCursor {
        PageCursor::start_token()
    }

    async fn fetch_listing_page(
        &self,
        target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>>;

    async fn fetch_transfer_page(
        &self,
        _address: &str,
        _cursor: PageCursor,
    ) -> ProviderResult<Page<TransferRecord>> {
        Ok(Page::last(Vec::new()))
    }

    async fn fetch_floor_price(&self, _address: &str) -> ProviderResult<Lookup<f64>> {
        Ok(Lookup::Unsupported)
    }

    async fn fetch_token_supply(&self, _address: &str) -> ProviderResult<Lookup<u64>> {
        Ok(Lookup::Unsupported)
    }
}

// ---------------------------------------------------------------------------
// Provider set
// ---------------------------------------------------------------------------

/// Explicit mapping from provider kind to client, in report order.
#[derive(Clone, Default)]
pub struct ProviderSet {
    clients: Vec<Arc<dyn ProviderClient>>,
}

impl ProviderSet {
    pub fn new(mut clients: Vec<Arc<dyn ProviderClient>>) -> Self {
        clients.sort_by_key(|c| c.kind());
        clients.dedup_by_key(|c| c.kind());
        Self { clients }
    }

    /// Build every provider that has credentials configured; the rest are skipped.
    /// Credentials that are set but unusable are a configuration error.
    pub fn from_config(cfg: &Config, http: HttpClient) -> Result<Self> {
        let creds = &cfg.providers;
        let mut clients: Vec<Arc<dyn ProviderClient>> = Vec::new();

        match &creds.nftport_api_key {
            Some(key) => clients.push(Arc::new(NftPortClient::new(
                http.clone(),
                creds.nftport_url.clone(),
                key.clone(),
            )?)),
            None => warn!("NFTPORT_API_KEY not set, skipping nftport"),
        }
        match &creds.alchemy_api_key {
            Some(key) => clients.push(Arc::new(AlchemyClient::new(
                http.clone(),
                &creds.alchemy_nft_url,
                &creds.alchemy_rpc_url,
                key,
            )?)),
            None => warn!("ALCHEMY_API_KEY not set, skipping alchemy"),
        }
        match &creds.moralis_api_key {
            Some(key) => clients.push(Arc::new(MoralisClient::new(
                http.clone(),
                creds.moralis_url.clone(),
                key.clone(),
            )?)),
            None => warn!("MORALIS_API_KEY not set, skipping moralis"),
        }
        match &creds.quicknode_url {
            Some(url) => clients.push(Arc::new(QuickNodeClient::new(http, url.clone())?)),
            None => warn!("QUICKNODE_URL not set, skipping quicknode"),
        }

        Ok(Self::new(clients))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProviderClient>> {
        self.clients.iter()
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.clients.iter().map(|c| c.kind()).collect()
    }

    /// First provider able to report a contract's token supply.
    pub fn supply_source(&self) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.iter().find(|c| c.capabilities().token_supply)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ---------------------------------------------------------------------------
// JSON helpers shared by the clients
// ---------------------------------------------------------------------------

/// Presence test for loosely-typed provider fields: null, empty strings,
/// empty arrays/objects, `false` and zero all count as absent.
pub(crate) fn is_present(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

/// Numeric field that may arrive as a JSON number or a decimal string.
pub(crate) fn as_f64_lenient(v: Option<&Value>) -> Option<f64> {
    v.and_then(|x| x.as_f64().or_else(|| x.as_str().and_then(|s| s.trim().parse().ok())))
}

pub(crate) fn as_u64_lenient(v: Option<&Value>) -> Option<u64> {
    v.and_then(|x| {
        x.as_u64()
            .or_else(|| x.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

pub(crate) fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Array at `key`, or an empty slice if the key is absent or null.
pub(crate) fn array_field<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key)
        .and_then(|a| a.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_continuation_ends_pagination() {
        let page: Page<NftItem> = Page::new(vec![], Some(PageCursor::Token(String::new())));
        assert!(page.next.is_none());
        let page: Page<NftItem> = Page::new(vec![], Some(PageCursor::Cursor("abc".into())));
        assert_eq!(page.next, Some(PageCursor::Cursor("abc".into())));
        let page: Page<NftItem> = Page::new(vec![], Some(PageCursor::Page(2)));
        assert_eq!(page.next, Some(PageCursor::Page(2)));
    }

    #[test]
    fn start_cursors_send_no_param() {
        assert_eq!(PageCursor::start_token().as_param(), None);
        assert_eq!(PageCursor::start_cursor().as_param(), None);
        assert_eq!(PageCursor::Page(3).as_param(), Some("3".to_string()));
    }

    #[test]
    fn presence_follows_loose_truthiness() {
        let v = json!({"a": null, "b": "", "c": {}, "d": [], "e": 0, "f": "x", "g": {"k": 1}, "h": 2.5});
        for key in ["a", "b", "c", "d", "e", "missing"] {
            assert!(!is_present(v.get(key)), "{key} should be absent");
        }
        for key in ["f", "g", "h"] {
            assert!(is_present(v.get(key)), "{key} should be present");
        }
    }

    #[test]
    fn lenient_numbers_accept_strings() {
        let v = json!({"a": "12", "b": 7, "c": "1.5", "d": "n/a"});
        assert_eq!(as_u64_lenient(v.get("a")), Some(12));
        assert_eq!(as_u64_lenient(v.get("b")), Some(7));
        assert_eq!(as_f64_lenient(v.get("c")), Some(1.5));
        assert_eq!(as_f64_lenient(v.get("d")), None);
    }
}
