use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::error::{AppError, ProviderError, ProviderResult, Result};
use crate::http::HttpClient;
use crate::provider::{
    array_field, as_f64_lenient, as_u64_lenient, is_present, str_field, Capabilities,
    ListingTarget, Lookup, NftItem, Page, PageCursor, ProviderClient, TransferRecord,
};
use crate::types::ProviderKind;
use crate::window::parse_iso_to_unix_secs;

/// Only media re-hosted on this CDN is an actual cache; other gateways are IPFS proxies.
const CACHE_CDN_HOST: &str = "res.cloudinary.com";

/// Alchemy NFT API (REST) plus the `alchemy_getAssetTransfers` JSON-RPC method.
pub struct AlchemyClient {
    http: HttpClient,
    nft_url: String,
    rpc_url: String,
    headers: HeaderMap,
}

impl AlchemyClient {
    /// The key becomes a path segment of every URL, so it must be URL-safe as is.
    pub fn new(http: HttpClient, nft_base: &str, rpc_base: &str, api_key: &str) -> Result<Self> {
        let url_safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if api_key.is_empty() || !api_key.chars().all(url_safe) {
            return Err(AppError::Config(
                "ALCHEMY_API_KEY must be non-empty and contain only letters, digits, '-' or '_'"
                    .to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            http,
            nft_url: format!("{}/{api_key}", nft_base.trim_end_matches('/')),
            rpc_url: format!("{}/{api_key}", rpc_base.trim_end_matches('/')),
            headers,
        })
    }
}

#[async_trait]
impl ProviderClient for AlchemyClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Alchemy
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transfers: true,
            floor_price: true,
            token_supply: true,
            cached_images: true,
        }
    }

    fn initial_cursor(&self, _target: ListingTarget) -> PageCursor {
        PageCursor::start_token()
    }

    async fn fetch_listing_page(
        &self,
        target: ListingTarget,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<NftItem>> {
        let mut query = vec![("withMetadata", "true".to_string())];
        let method = match target {
            ListingTarget::Collection => {
                query.push(("contractAddress", address.to_string()));
                if let Some(token) = cursor.as_param() {
                    query.push(("startToken", token));
                }
                "getNFTsForCollection"
            }
            ListingTarget::Owner => {
                query.push(("owner", address.to_string()));
                if let Some(key) = cursor.as_param() {
                    query.push(("pageKey", key));
                }
                "getNFTs"
            }
        };
        let url = format!("{}/{method}", self.nft_url);
        let label = format!("alchemy {method}");
        let resp = self.http.get_json(&label, &url, &self.headers, &query).await?;
        parse_listing_page(&resp, target)
    }

    async fn fetch_transfer_page(
        &self,
        address: &str,
        cursor: PageCursor,
    ) -> ProviderResult<Page<TransferRecord>> {
        let body = transfers_request(address, &cursor);
        let resp = self
            .http
            .post_json("alchemy getAssetTransfers", &self.rpc_url, &self.headers, &body)
            .await?;
        parse_transfer_page(&resp)
    }

    async fn fetch_floor_price(&self, address: &str) -> ProviderResult<Lookup<f64>> {
        let url = format!("{}/getFloorPrice", self.nft_url);
        let query = [("contractAddress", address.to_string())];
        let resp = self.http.get_json("alchemy getFloorPrice", &url, &self.headers, &query).await?;
        Ok(parse_floor_price(&resp))
    }

    async fn fetch_token_supply(&self, address: &str) -> ProviderResult<Lookup<u64>> {
        let url = format!("{}/getContractMetadata", self.nft_url);
        let query = [("contractAddress", address.to_string())];
        let resp = self
            .http
            .get_json("alchemy getContractMetadata", &url, &self.headers, &query)
            .await?;
        Ok(parse_token_supply(&resp))
    }
}

/// Newest-first so the time window can stop the walk early.
pub(crate) fn transfers_request(address: &str, cursor: &PageCursor) -> Value {
    let mut params = json!({
        "fromBlock": "0x0",
        "contractAddresses": [address],
        "category": ["erc721", "erc1155"],
        "order": "desc",
        "withMetadata": true,
    });
    if let Some(key) = cursor.as_param() {
        params["pageKey"] = Value::String(key);
    }
    json!({
        "id": 1,
        "jsonrpc": "2.0",
        "method": "alchemy_getAssetTransfers",
        "params": [params],
    })
}

pub(crate) fn parse_listing_page(resp: &Value, target: ListingTarget) -> ProviderResult<Page<NftItem>> {
    let (list_key, next_key) = match target {
        ListingTarget::Collection => ("nfts", "nextToken"),
        ListingTarget::Owner => ("ownedNfts", "pageKey"),
    };
    let nfts = resp.get(list_key).and_then(|n| n.as_array()).ok_or_else(|| {
        ProviderError::Malformed(format!("alchemy listing missing `{list_key}` array"))
    })?;

    let records = nfts
        .iter()
        .map(|nft| NftItem {
            has_metadata: is_present(nft.get("metadata")),
            has_cached_image: is_cached_media(nft),
        })
        .collect();

    Ok(Page::new(records, str_field(resp, next_key).map(PageCursor::Token)))
}

fn is_cached_media(nft: &Value) -> bool {
    array_field(nft, "media")
        .first()
        .and_then(|m| m.get("gateway"))
        .and_then(|g| g.as_str())
        .map(|g| g.contains(CACHE_CDN_HOST))
        .unwrap_or(false)
}

pub(crate) fn parse_transfer_page(resp: &Value) -> ProviderResult<Page<TransferRecord>> {
    if let Some(err) = resp.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown JSON-RPC error");
        return Err(ProviderError::Malformed(format!("alchemy_getAssetTransfers: {msg}")));
    }
    let result = resp
        .get("result")
        .ok_or_else(|| ProviderError::Malformed("alchemy transfers missing `result`".to_string()))?;

    let records = array_field(result, "transfers")
        .iter()
        .map(|t| TransferRecord {
            timestamp: t
                .get("metadata")
                .and_then(|m| m.get("blockTimestamp"))
                .and_then(|ts| ts.as_str())
                .and_then(parse_iso_to_unix_secs),
            from: str_field(t, "from"),
            to: str_field(t, "to"),
            is_sale: as_f64_lenient(t.get("value")).map(|v| v > 0.0).unwrap_or(false),
        })
        .collect();

    Ok(Page::new(records, str_field(result, "pageKey").map(PageCursor::Token)))
}

pub(crate) fn parse_floor_price(resp: &Value) -> Lookup<f64> {
    let floor = resp.get("openSea").and_then(|o| o.get("floorPrice"));
    if !is_present(floor) {
        return Lookup::Missing;
    }
    as_f64_lenient(floor).into()
}

pub(crate) fn parse_token_supply(resp: &Value) -> Lookup<u64> {
    as_u64_lenient(resp.get("contractMetadata").and_then(|m| m.get("totalSupply")))
        .filter(|&s| s > 0)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use crate::testing::test_http;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn api_key_must_be_url_safe() {
        let nft = "https://eth-mainnet.g.alchemy.com/nft/v2";
        let rpc = "https://eth-mainnet.g.alchemy.com/v2";
        for key in ["", "a/b", "key with space", "k?x=1"] {
            let client = AlchemyClient::new(test_http(), nft, rpc, key);
            assert!(matches!(client, Err(AppError::Config(_))), "{key:?} accepted");
        }
        assert!(AlchemyClient::new(test_http(), nft, rpc, "aB3_x-9").is_ok());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn api_key_stays_out_of_logs_and_errors() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let http = HttpClient::new(Duration::from_secs(2), policy).unwrap();
        // Nothing listens on port 1.
        let client = AlchemyClient::new(
            http,
            "http://127.0.0.1:1/nft/v2",
            "http://127.0.0.1:1/v2",
            "SUPERSECRETKEY",
        )
        .unwrap();

        let err = client.fetch_floor_price("0xabc").await.unwrap_err();
        let logged = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();

        assert!(logged.contains("alchemy getFloorPrice: attempt 1/2 failed"), "{logged}");
        assert!(!logged.contains("SUPERSECRETKEY"), "{logged}");
        assert!(!err.to_string().contains("SUPERSECRETKEY"), "{err}");
    }

    #[test]
    fn only_cloudinary_media_counts_as_cached() {
        let resp = json!({
            "nfts": [
                {"metadata": {"name": "a"}, "media": [{"gateway": "https://res.cloudinary.com/alchemy/image/1.png"}]},
                {"metadata": {"name": "b"}, "media": [{"gateway": "https://ipfs.io/ipfs/Qm"}]},
                {"metadata": {}, "media": []}
            ],
            "nextToken": "0x10"
        });
        let page = parse_listing_page(&resp, ListingTarget::Collection).unwrap();
        assert_eq!(page.records.len(), 3);
        assert!(page.records[0].has_metadata && page.records[0].has_cached_image);
        assert!(page.records[1].has_metadata && !page.records[1].has_cached_image);
        assert!(!page.records[2].has_metadata);
        assert_eq!(page.next, Some(PageCursor::Token("0x10".into())));
    }

    #[test]
    fn owner_listing_uses_page_key() {
        let resp = json!({"ownedNfts": [{"metadata": {"a": 1}}], "totalCount": 1});
        let page = parse_listing_page(&resp, ListingTarget::Owner).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next.is_none());
    }

    #[test]
    fn transfers_request_carries_page_key_and_order() {
        let body = transfers_request("0xabc", &PageCursor::Token("key-2".into()));
        assert_eq!(body["method"], "alchemy_getAssetTransfers");
        assert_eq!(body["params"][0]["order"], "desc");
        assert_eq!(body["params"][0]["pageKey"], "key-2");
        assert_eq!(body["params"][0]["contractAddresses"][0], "0xabc");

        let first = transfers_request("0xabc", &PageCursor::start_token());
        assert!(first["params"][0].get("pageKey").is_none());
    }

    #[test]
    fn transfers_with_value_are_sales() {
        let resp = json!({
            "jsonrpc": "2.0",
            "result": {
                "transfers": [
                    {"from": "0xaaa", "to": "0xbbb", "value": 1.5, "metadata": {"blockTimestamp": "2022-05-01T10:00:00.000Z"}},
                    {"from": "0xaaa", "to": "0xbbb", "value": null, "metadata": {"blockTimestamp": "2022-05-01T09:00:00.000Z"}}
                ],
                "pageKey": "pk"
            }
        });
        let page = parse_transfer_page(&resp).unwrap();
        assert!(page.records[0].is_sale);
        assert!(!page.records[1].is_sale);
        assert_eq!(page.records[0].timestamp, Some(1_651_399_200));
        assert_eq!(page.next, Some(PageCursor::Token("pk".into())));
    }

    #[test]
    fn rpc_error_is_malformed() {
        let resp = json!({"jsonrpc": "2.0", "error": {"code": -32602, "message": "invalid params"}});
        let err = parse_transfer_page(&resp).unwrap_err();
        assert!(err.to_string().contains("invalid params"));
    }

    #[test]
    fn supply_and_floor_lookups() {
        assert_eq!(parse_token_supply(&json!({"contractMetadata": {"totalSupply": "10000"}})), Lookup::Found(10_000));
        assert_eq!(parse_token_supply(&json!({"contractMetadata": {}})), Lookup::Missing);
        assert_eq!(parse_floor_price(&json!({"openSea": {"floorPrice": 12.5}})), Lookup::Found(12.5));
        assert_eq!(parse_floor_price(&json!({"openSea": {"error": "unavailable"}})), Lookup::Missing);
    }
}
