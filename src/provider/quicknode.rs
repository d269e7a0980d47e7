use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::error::{AppError, ProviderError, ProviderResult, Result};
use crate::http::HttpClient;
use crate::provider::{
    as_u64_lenient, is_present, Capabilities, ListingTarget, NftItem, Page, PageCursor,
    ProviderClient,
};
use crate::types::ProviderKind;

const PER_PAGE: u32 = 100;

/// QuickNode NFT add-on over JSON-RPC. Listings only: no transfers by contract,
/// no floor price, no raw metadata and no image cache.
pub struct QuickNodeClient {
    http: HttpClient,
    url: String,
    headers: HeaderMap,
}

impl QuickNodeClient {
    pub fn new(http: HttpClient, url: String) -> Result<Self> {
        reqwest::Url::parse(&url)
            .map_err(|e| AppError::Config(format!("QUICKNODE_URL is not a valid URL: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-qn-api-version", HeaderValue::from_static("1"));
        Ok(Self { http, url, headers })
    }
}

#[async_trait]
impl ProviderClient for QuickNodeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::QuickNode
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transfers: false,
            floor_price: false,
            token_supply: false,
            cached_images: false,
        }
    }

    fn initial_cursor(&self, _target: ListingTarget) -> PageCursor {
        PageCursor::Page(1)
    }

    async fn fetch_listing_page(
        &self,
        target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>> {
        let page = cursor.page_number();
        let body = listing_request(target, address, page);
        let resp = self
            .http
            .post_json("quicknode fetchNFTs", &self.url, &self.headers, &body)
            .await?;
        parse_listing_page(&resp, page)
    }
}

pub(crate) fn listing_request(target: ListingTarget, address: &str, page: u32) -> Value {
    let (method, params) = match target {
        ListingTarget::Collection => (
            "qn_fetchNFTsByCollection",
            json!({"collection": address, "page": page, "perPage": PER_PAGE}),
        ),
        ListingTarget::Owner => (
            "qn_fetchNFTs",
            json!({"wallet": address, "page": page, "perPage": PER_PAGE}),
        ),
    };
    json!({"id": 0, "jsonrpc": "2.0", "method": method, "params": params})
}

/// Collection results list `tokens`, wallet results list `assets`.
pub(crate) fn parse_listing_page(resp: &Value, page: u32) -> ProviderResult<Page<NftItem>> {
    if let Some(err) = resp.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown JSON-RPC error");
        return Err(ProviderError::Malformed(format!("quicknode: {msg}")));
    }
    let result = resp
        .get("result")
        .ok_or_else(|| ProviderError::Malformed("quicknode response missing `result`".to_string()))?;

    let tokens = result
        .get("tokens")
        .or_else(|| result.get("assets"))
        .and_then(|t| t.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    // No raw metadata is returned; an image or traits is the best signal.
    let records: Vec<NftItem> = tokens
        .iter()
        .map(|t| NftItem {
            has_metadata: is_present(t.get("imageUrl")) || is_present(t.get("traits")),
            has_cached_image: false,
        })
        .collect();

    let total_pages = as_u64_lenient(result.get("totalPages"));
    let more = !records.is_empty() && total_pages.map_or(true, |total| u64::from(page) < total);
    let next = more.then(|| PageCursor::Page(page + 1));

    Ok(Page::new(records, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_http;

    #[test]
    fn endpoint_must_parse_as_url() {
        let bad = QuickNodeClient::new(test_http(), "not a url".to_string());
        assert!(matches!(bad, Err(AppError::Config(_))));
        let good = QuickNodeClient::new(test_http(), "https://x.quiknode.pro/token/".to_string());
        assert!(good.is_ok());
    }

    #[test]
    fn collection_request_shape() {
        let body = listing_request(ListingTarget::Collection, "0xabc", 3);
        assert_eq!(body["method"], "qn_fetchNFTsByCollection");
        assert_eq!(body["params"]["collection"], "0xabc");
        assert_eq!(body["params"]["page"], 3);
        assert_eq!(body["params"]["perPage"], 100);

        let body = listing_request(ListingTarget::Owner, "0xdef", 1);
        assert_eq!(body["method"], "qn_fetchNFTs");
        assert_eq!(body["params"]["wallet"], "0xdef");
    }

    #[test]
    fn metadata_from_image_or_traits() {
        let resp = json!({"result": {
            "tokens": [
                {"imageUrl": "https://x/1.png", "traits": []},
                {"imageUrl": null, "traits": [{"trait_type": "bg", "value": "red"}]},
                {"imageUrl": "", "traits": []}
            ],
            "pageNumber": 1,
            "totalPages": 2
        }});
        let page = parse_listing_page(&resp, 1).unwrap();
        let meta: Vec<_> = page.records.iter().map(|r| r.has_metadata).collect();
        assert_eq!(meta, vec![true, true, false]);
        assert!(page.records.iter().all(|r| !r.has_cached_image));
        assert_eq!(page.next, Some(PageCursor::Page(2)));
    }

    #[test]
    fn stops_on_last_reported_page() {
        let resp = json!({"result": {"tokens": [{"imageUrl": "a"}], "totalPages": 2}});
        assert!(parse_listing_page(&resp, 2).unwrap().next.is_none());
    }

    #[test]
    fn stops_on_empty_page_without_total() {
        let resp = json!({"result": {"tokens": []}});
        assert!(parse_listing_page(&resp, 7).unwrap().next.is_none());
        let resp = json!({"result": {"assets": [{"imageUrl": "a"}]}});
        assert_eq!(parse_listing_page(&resp, 7).unwrap().next, Some(PageCursor::Page(8)));
    }
}
