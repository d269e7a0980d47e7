use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{AppError, ProviderError, ProviderResult, Result};
use crate::http::HttpClient;
use crate::provider::{
    as_f64_lenient, is_present, str_field, Capabilities, ListingTarget, Lookup, NftItem, Page,
    PageCursor, ProviderClient, TransferRecord,
};
use crate::types::ProviderKind;
use crate::window::parse_iso_to_unix_secs;

const CHAIN: &str = "eth";

/// Moralis Web3 API. Everything pages by cursor string; there is no image cache.
pub struct MoralisClient {
    http: HttpClient,
    base_url: String,
    headers: HeaderMap,
}

impl MoralisClient {
    pub fn new(http: HttpClient, base_url: String, api_key: String) -> Result<Self> {
        let key = HeaderValue::from_str(&api_key).map_err(|_| {
            AppError::Config("MORALIS_API_KEY contains characters not allowed in a header".to_string())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", key);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn paged_query(cursor: &PageCursor) -> Vec<(&'static str, String)> {
        let mut query = vec![("chain", CHAIN.to_string()), ("format", "decimal".to_string())];
        if let Some(c) = cursor.as_param() {
            query.push(("cursor", c));
        }
        query
    }
}

#[async_trait]
impl ProviderClient for MoralisClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Moralis
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transfers: true,
            floor_price: true,
            token_supply: false,
            cached_images: false,
        }
    }

    fn initial_cursor(&self, _target: ListingTarget) -> PageCursor {
        PageCursor::start_cursor()
    }

    fn initial_transfer_cursor(&self) -> PageCursor {
        PageCursor::start_cursor()
    }

    async fn fetch_listing_page(
        &self,
        target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>> {
        let (label, url) = match target {
            ListingTarget::Collection => ("moralis nft", format!("{}/nft/{address}", self.base_url)),
            ListingTarget::Owner => ("moralis wallet nft", format!("{}/{address}/nft", self.base_url)),
        };
        let resp = self
            .http
            .get_json(label, &url, &self.headers, &Self::paged_query(&cursor))
            .await?;
        parse_listing_page(&resp)
    }

    async fn fetch_transfer_page(
        &self,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<TransferRecord>> {
        let url = format!("{}/nft/{address}/transfers", self.base_url);
        let resp = self
            .http
            .get_json("moralis transfers", &url, &self.headers, &Self::paged_query(&cursor))
            .await?;
        parse_transfer_page(&resp)
    }

    async fn fetch_floor_price(&self, address: &str) -> ProviderResult<Lookup<f64>> {
        let url = format!("{}/nft/{address}/lowestprice", self.base_url);
        let query = [("chain", CHAIN.to_string())];
        match self.http.get_json("moralis lowestprice", &url, &self.headers, &query).await {
            Ok(resp) => Ok(parse_floor_price(&resp)),
            // Collections with no recorded trades answer 404.
            Err(ProviderError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Ok(Lookup::Missing)
            }
            Err(e) => Err(e),
        }
    }
}

fn result_array(resp: &Value) -> ProviderResult<&Vec<Value>> {
    resp.get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| ProviderError::Malformed("moralis response missing `result` array".to_string()))
}

pub(crate) fn parse_listing_page(resp: &Value) -> ProviderResult<Page<NftItem>> {
    let records = result_array(resp)?
        .iter()
        .map(|nft| NftItem {
            has_metadata: is_present(nft.get("metadata")),
            has_cached_image: false,
        })
        .collect();
    Ok(Page::new(records, str_field(resp, "cursor").map(PageCursor::Cursor)))
}

/// Moralis mixes sales into plain transfers; a non-zero value marks a sale.
pub(crate) fn parse_transfer_page(resp: &Value) -> ProviderResult<Page<TransferRecord>> {
    let records = result_array(resp)?
        .iter()
        .map(|t| TransferRecord {
            timestamp: t
                .get("block_timestamp")
                .and_then(|ts| ts.as_str())
                .and_then(parse_iso_to_unix_secs),
            from: str_field(t, "from_address"),
            to: str_field(t, "to_address"),
            is_sale: as_f64_lenient(t.get("value")).map(|v| v > 0.0).unwrap_or(false),
        })
        .collect();
    Ok(Page::new(records, str_field(resp, "cursor").map(PageCursor::Cursor)))
}

pub(crate) fn parse_floor_price(resp: &Value) -> Lookup<f64> {
    let price = resp.get("price");
    if !is_present(price) {
        return Lookup::Missing;
    }
    as_f64_lenient(price).into()
}
