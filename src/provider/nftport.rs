use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::error::{AppError, ProviderError, ProviderResult, Result};
use crate::http::HttpClient;
use crate::provider::{
    as_f64_lenient, is_present, str_field, Capabilities, ListingTarget, Lookup, NftItem, Page,
    PageCursor, ProviderClient, TransferRecord,
};
use crate::types::ProviderKind;
use crate::window::parse_iso_to_unix_secs;

const CHAIN: &str = "ethereum";

/// NFTPort REST client. Collection listings page by number, owner listings and
/// transactions by continuation token.
pub struct NftPortClient {
    http: HttpClient,
    base_url: String,
    headers: HeaderMap,
}

impl NftPortClient {
    pub fn new(http: HttpClient, base_url: String, api_key: String) -> Result<Self> {
        let key = HeaderValue::from_str(&api_key).map_err(|_| {
            AppError::Config("NFTPORT_API_KEY contains characters not allowed in a header".to_string())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, key);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }
}

#[async_trait]
impl ProviderClient for NftPortClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NftPort
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transfers: true,
            floor_price: true,
            token_supply: false,
            cached_images: true,
        }
    }

    fn initial_cursor(&self, target: ListingTarget) -> PageCursor {
        match target {
            ListingTarget::Collection => PageCursor::Page(1),
            ListingTarget::Owner => PageCursor::start_token(),
        }
    }

    async fn fetch_listing_page(
        &self,
        target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>> {
        let mut query = vec![("chain", CHAIN.to_string()), ("include", "metadata".to_string())];
        let (label, url) = match target {
            ListingTarget::Collection => {
                query.push(("page_number", cursor.page_number().to_string()));
                ("nftport nfts", format!("{}/nfts/{address}", self.base_url))
            }
            ListingTarget::Owner => {
                if let Some(token) = cursor.as_param() {
                    query.push(("continuation", token));
                }
                ("nftport accounts", format!("{}/accounts/{address}", self.base_url))
            }
        };
        let resp = self.http.get_json(label, &url, &self.headers, &query).await?;
        parse_listing_page(&resp, target, &cursor)
    }

    async fn fetch_transfer_page(
        &self,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<TransferRecord>> {
        let url = format!("{}/transactions/nfts/{address}", self.base_url);
        let mut query = vec![("chain", CHAIN.to_string()), ("type", "sale".to_string())];
        if let Some(token) = cursor.as_param() {
            query.push(("continuation", token));
        }
        let resp = self.http.get_json("nftport transactions", &url, &self.headers, &query).await?;
        parse_transfer_page(&resp)
    }

    async fn fetch_floor_price(&self, address: &str) -> ProviderResult<Lookup<f64>> {
        let url = format!("{}/transactions/stats/{address}", self.base_url);
        let query = [("chain", CHAIN.to_string())];
        let resp = self.http.get_json("nftport stats", &url, &self.headers, &query).await?;
        Ok(parse_floor_price(&resp))
    }
}

pub(crate) fn parse_listing_page(
    resp: &Value,
    target: ListingTarget,
    cursor: &PageCursor,
) -> ProviderResult<Page<NftItem>> {
    let nfts = resp
        .get("nfts")
        .and_then(|n| n.as_array())
        .ok_or_else(|| ProviderError::Malformed("nftport listing missing `nfts` array".to_string()))?;

    let records: Vec<NftItem> = nfts
        .iter()
        .map(|nft| NftItem {
            has_metadata: is_present(nft.get("metadata")),
            has_cached_image: is_present(nft.get("cached_file_url")),
        })
        .collect();

    let next = match target {
        // Page-number listings run until a page comes back empty.
        ListingTarget::Collection if !records.is_empty() => {
            Some(PageCursor::Page(cursor.page_number() + 1))
        }
        ListingTarget::Collection => None,
        ListingTarget::Owner => str_field(resp, "continuation").map(PageCursor::Token),
    };

    Ok(Page::new(records, next))
}

pub(crate) fn parse_transfer_page(resp: &Value) -> ProviderResult<Page<TransferRecord>> {
    let txs = resp.get("transactions").and_then(|t| t.as_array()).ok_or_else(|| {
        ProviderError::Malformed("nftport transactions missing `transactions` array".to_string())
    })?;

    let records = txs
        .iter()
        .map(|t| TransferRecord {
            timestamp: t
                .get("transaction_date")
                .and_then(|d| d.as_str())
                .and_then(parse_iso_to_unix_secs),
            from: str_field(t, "seller_address").or_else(|| str_field(t, "transfer_from")),
            to: str_field(t, "buyer_address").or_else(|| str_field(t, "transfer_to")),
            is_sale: t.get("type").and_then(|s| s.as_str()) == Some("sale")
                && is_present(t.get("price_details")),
        })
        .collect();

    let next = str_field(resp, "continuation").map(PageCursor::Token);
    Ok(Page::new(records, next))
}

pub(crate) fn parse_floor_price(resp: &Value) -> Lookup<f64> {
    let floor = resp.get("statistics").and_then(|s| s.get("floor_price"));
    if !is_present(floor) {
        return Lookup::Missing;
    }
    as_f64_lenient(floor).into()
}
