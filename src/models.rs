//! Wire types for the HTTP surface and the in-memory data model (§3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn is_valid_eth_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Deserialize)]
pub struct NonceRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub message: String,
    pub chain_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub address: String,
    pub nonce: String,
    pub message: String,
    pub signature: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    pub clob_auth_signature: String,
    pub clob_auth_timestamp: i64,
    pub clob_auth_nonce: u64,
}

fn default_chain_id() -> u64 {
    137
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub market_id: String,
    pub title: String,
    pub question: Option<String>,
    pub liquidity: f64,
    pub opportunity_score: f64,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub yes_label: Option<String>,
    pub no_label: Option<String>,
    pub source: String,
}

/// The client-signed order as submitted by the browser. Field types are intentionally
/// permissive (`Value`) here; `OrderValidator::normalize_signed_order` is the single
/// place that narrows them into the canonical `SignedOrder`.
pub type RawSignedOrder = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub side: String,
    pub signature_type: u8,
    pub signature: String,
}

impl SignedOrder {
    /// Upstream CLOB API expects camelCase field names.
    pub fn to_upstream_json(&self) -> Value {
        serde_json::json!({
            "salt": self.salt,
            "maker": self.maker,
            "signer": self.signer,
            "taker": self.taker,
            "tokenId": self.token_id,
            "makerAmount": self.maker_amount,
            "takerAmount": self.taker_amount,
            "expiration": self.expiration,
            "nonce": self.nonce,
            "feeRateBps": self.fee_rate_bps,
            "side": self.side,
            "signatureType": self.signature_type,
            "signature": self.signature,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitOrderRequest {
    pub token_id: String,
    pub side: String,
    #[serde(default)]
    pub outcome: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub size_usdc: Option<f64>,
    #[serde(default)]
    pub size_tokens: Option<f64>,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub signed_order: RawSignedOrder,
}

fn default_order_type() -> String {
    "GTC".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TpLevel {
    pub price: f64,
    pub size_pct: f64,
}

#[derive(Debug, Deserialize)]
pub struct SignedTpOrder {
    pub level_index: usize,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    pub signed_order: RawSignedOrder,
}

#[derive(Debug, Deserialize)]
pub struct TpArmRequest {
    pub entry_order_id: String,
    pub token_id: String,
    pub entry_size_tokens: f64,
    pub mode: String,
    pub levels: Vec<TpLevel>,
    pub signed_tp_orders: Vec<SignedTpOrder>,
    #[serde(default)]
    pub max_minutes: Option<u64>,
}

impl TpArmRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.levels.is_empty() || self.levels.len() > 3 {
            return Err("levels must contain between 1 and 3 entries".into());
        }
        let total: f64 = self.levels.iter().map(|l| l.size_pct).sum();
        if (total - 100.0).abs() > 0.2 {
            return Err("TP level percentages must sum to 100".into());
        }
        if self.signed_tp_orders.is_empty() || self.signed_tp_orders.len() > 3 {
            return Err("signed_tp_orders must contain between 1 and 3 entries".into());
        }
        if !matches!(self.mode.as_str(), "single" | "ladder") {
            return Err("mode must be 'single' or 'ladder'".into());
        }
        Ok(())
    }
}

pub fn validate_eth_address(address: &str) -> Result<String, String> {
    if address.is_empty() || !is_valid_eth_address(address) {
        return Err("Invalid EVM address".to_string());
    }
    Ok(address.to_string())
}

/// EIP-55 checksum an address string. Falls back to the input unchanged if it does not
/// parse as a 20-byte address (callers validate shape separately).
pub fn checksum_address(address: &str) -> String {
    match address.parse::<alloy::primitives::Address>() {
        Ok(addr) => addr.to_checksum(None),
        Err(_) => address.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct TokenMetaResponse {
    pub token_id: String,
    pub chain_id: u64,
    pub neg_risk: bool,
    pub tick_size: String,
    pub fee_rate_bps: String,
    pub exchange_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_order_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenAllowanceResponse {
    pub token_id: String,
    pub collateral: Value,
    pub conditional: Value,
}

#[derive(Debug, Serialize)]
pub struct LimitOrderResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_size_tokens: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TpArmResponse {
    pub status: String,
    pub arm_id: String,
    pub entry_order_id: String,
}
