//! Thin client for the opaque wallet-metadata capability (§1: `WalletMetadata`) and the
//! market search surface it also exposes. Treated as best-effort: callers degrade
//! gracefully (see `resolver.rs`) rather than fail on a non-2xx or malformed response.

use serde_json::Value;

use crate::config::Config;
use crate::error::AppError;
use crate::models::SearchResult;

pub struct WalletMetadataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WalletMetadataClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.dome_base_url.clone(),
            api_key: config.dome_api_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Returns `None` (not an error) when the wallet has no metadata on file, or the
    /// capability is unreachable — resolver.rs treats that as a direct-EOA fallback.
    pub async fn get_wallet(&self, eoa_address: &str) -> Option<Value> {
        let path = format!("/polymarket/wallet?eoa={}", urlencoding::encode(eoa_address));
        let response = self.request(reqwest::Method::GET, &path).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<Value>().await.ok()
    }

    pub async fn search_markets(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        let path = format!(
            "/polymarket/markets?search={}&status=open&limit={}",
            urlencoding::encode(query),
            limit
        );
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| AppError::upstream(502, format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::upstream(502, format!("unparseable search response: {e}")))?;

        let items = body
            .get("markets")
            .or_else(|| body.as_array().map(|_| &body))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results: Vec<SearchResult> = items.iter().filter_map(parse_search_result).collect();
        results.sort_by(|a, b| b.opportunity_score.total_cmp(&a.opportunity_score));
        Ok(results)
    }
}

/// Fallback token-id source when a market isn't present in `WalletMetadata`'s search index
/// (§6: `GammaMarkets`). Unauthenticated, public, read-only.
pub struct GammaMarketsClient {
    http: reqwest::Client,
}

impl GammaMarketsClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn get_market_by_id(&self, market_id: &str) -> Option<Value> {
        let url = format!(
            "https://gamma-api.polymarket.com/markets?id={}",
            urlencoding::encode(market_id)
        );
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        match body {
            Value::Array(items) => items.into_iter().next(),
            other => Some(other),
        }
    }
}

fn parse_search_result(item: &Value) -> Option<SearchResult> {
    let market_id = item.get("id").or_else(|| item.get("market_id"))?.as_str()?.to_string();
    let title = item
        .get("title")
        .or_else(|| item.get("question"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let liquidity = item
        .get("liquidity")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let yes_token_id = item
        .get("tokens")
        .and_then(|v| v.as_array())
        .and_then(|tokens| tokens.iter().find(|t| is_outcome(t, "yes")))
        .and_then(|t| t.get("token_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let no_token_id = item
        .get("tokens")
        .and_then(|v| v.as_array())
        .and_then(|tokens| tokens.iter().find(|t| is_outcome(t, "no")))
        .and_then(|t| t.get("token_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let volume_week = number_field(item, "volume_1_week").unwrap_or(0.0);
    let volume_month = number_field(item, "volume_1_month").unwrap_or(0.0);
    let volume_24h = if volume_week > 0.0 { volume_week / 7.0 } else { volume_month / 30.0 };

    let yes_price = number_field(item, "current_yes_price")
        .or_else(|| number_field(item, "yes_price"))
        .unwrap_or(0.5);

    // Supplemented from the original search ranking, not present in the distilled spec's
    // search section: liquidity depth, price uncertainty (near-0.5 markets are the live
    // ones), and recent volume blended into a single rank.
    let liquidity_score = (liquidity / 10_000.0).min(1.0);
    let price_uncertainty = (1.0 - (0.5 - yes_price).abs() * 2.0).max(0.0);
    let volume_score = (volume_24h / 5_000.0).min(1.0);
    let opportunity_score = liquidity_score * 0.4 + price_uncertainty * 0.3 + volume_score * 0.3;

    let yes_label = string_field(item, "yes_label")
        .or_else(|| string_field(item, "yes_outcome"))
        .or_else(|| nested_str(item, "dome_raw", "side_a_label"))
        .unwrap_or_else(|| "Yes".to_string());
    let no_label = string_field(item, "no_label")
        .or_else(|| string_field(item, "no_outcome"))
        .or_else(|| nested_str(item, "dome_raw", "side_b_label"))
        .unwrap_or_else(|| "No".to_string());

    Some(SearchResult {
        market_id,
        title: title.clone(),
        question: item.get("question").and_then(|v| v.as_str()).map(|s| s.to_string()),
        liquidity,
        opportunity_score,
        yes_token_id,
        no_token_id,
        yes_label: Some(yes_label),
        no_label: Some(no_label),
        source: "wallet-metadata".to_string(),
    })
}

fn number_field(item: &Value, key: &str) -> Option<f64> {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn nested_str(item: &Value, scope: &str, key: &str) -> Option<String> {
    item.get(scope)?.get(key)?.as_str().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)?.as_str().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

fn is_outcome(token: &Value, outcome: &str) -> bool {
    token
        .get("outcome")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case(outcome))
        .unwrap_or(false)
}
