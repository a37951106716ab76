//! `ContextResolver` (§4.3): derives a `TradingContext` from the opaque wallet-metadata
//! blob returned by the wallet-metadata capability. Resolution is best-effort — any
//! failure here is captured as a warning on the session, never raised to fail login.

use serde_json::Value;

use crate::config::{self, Config};
use crate::store::{TradingContext, WalletSummary};

/// Keys that, anywhere in the wallet-metadata blob, point at a proxy/Safe trading address.
const PROXY_ADDRESS_KEYS: &[&str] = &[
    "proxy",
    "proxyWallet",
    "proxy_wallet",
    "proxyAddress",
    "proxy_address",
    "safe",
    "safeAddress",
    "safe_address",
    "smartWallet",
    "smart_wallet",
    "tradingAddress",
    "trading_address",
    "polyAddress",
    "poly_address",
];

/// Keys that scope a sub-object to USDC balance figures.
const USDC_SCOPE_KEYS: &[&str] = &["usdc", "USDC", "usd", "cash", "stablecoin", "balances", "balance"];

const AVAILABLE_BALANCE_KEYS: &[&str] =
    &["available", "availableBalance", "free", "spendable", "buying_power", "buyingPower"];
const TOTAL_BALANCE_KEYS: &[&str] =
    &["total", "totalBalance", "balance", "amount", "collateral", "equity"];

/// Depth-first, first-match search for any of `keys` in `value`, returning the string
/// stored there. Arrays are walked index by index; objects are walked in serde_json's
/// natural (insertion) order.
fn find_string_key(value: &Value, keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(found) = map.get(*key) {
                    if let Some(s) = found.as_str() {
                        if !s.is_empty() {
                            return Some(s.to_string());
                        }
                    }
                }
            }
            for (_, v) in map.iter() {
                if let Some(found) = find_string_key(v, keys) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => {
            for item in items {
                if let Some(found) = find_string_key(item, keys) {
                    return Some(found);
                }
            }
            None
        }
        _ => None,
    }
}

/// Recursively finds any EVM address in the blob other than `eoa` itself, depth-first.
fn find_alternative_address(value: &Value, eoa_lower: &str) -> Option<String> {
    match value {
        Value::String(s) => {
            if crate::models::validate_eth_address(s).is_ok() && s.to_lowercase() != eoa_lower {
                Some(s.clone())
            } else {
                None
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter() {
                if let Some(found) = find_alternative_address(v, eoa_lower) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => {
            for item in items {
                if let Some(found) = find_alternative_address(item, eoa_lower) {
                    return Some(found);
                }
            }
            None
        }
        _ => None,
    }
}

fn find_scoped_object<'a>(value: &'a Value, scope_keys: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            for key in scope_keys {
                if let Some(found) = map.get(*key) {
                    if found.is_object() {
                        return Some(found);
                    }
                }
            }
            for (_, v) in map.iter() {
                if let Some(found) = find_scoped_object(v, scope_keys) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_scoped_object(item, scope_keys)),
        _ => None,
    }
}

fn find_number_key(value: &Value, keys: &[&str]) -> Option<f64> {
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(found) = map.get(*key) {
                    if let Some(n) = found.as_f64() {
                        return Some(n);
                    }
                    if let Some(s) = found.as_str() {
                        if let Ok(n) = s.parse::<f64>() {
                            return Some(n);
                        }
                    }
                }
            }
            for (_, v) in map.iter() {
                if let Some(found) = find_number_key(v, keys) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_number_key(item, keys)),
        _ => None,
    }
}

fn resolve_balances(blob: &Value) -> WalletSummary {
    let scope = find_scoped_object(blob, USDC_SCOPE_KEYS).unwrap_or(blob);
    let available = find_number_key(scope, AVAILABLE_BALANCE_KEYS)
        .or_else(|| find_number_key(blob, AVAILABLE_BALANCE_KEYS));
    let total = find_number_key(scope, TOTAL_BALANCE_KEYS)
        .or_else(|| find_number_key(blob, TOTAL_BALANCE_KEYS));
    WalletSummary { available_usdc: available, total_usdc: total }
}

/// Builds the `TradingContext` for a freshly-authenticated EOA. `wallet_blob` is `None`
/// when the wallet-metadata capability could not be reached at all; in that case the
/// context degrades to direct (EOA-as-trading-address) mode with a warning, not a failure.
pub fn resolve_trading_context(
    config: &Config,
    eoa_address: &str,
    wallet_blob: Option<Value>,
) -> TradingContext {
    let eoa_lower = eoa_address.to_lowercase();
    let exchange_address = config::contract_config(config.chain_id, false).to_string();

    let Some(blob) = wallet_blob else {
        return TradingContext {
            eoa_address: eoa_address.to_string(),
            trading_address: eoa_address.to_string(),
            funder_address: None,
            signature_type: 0,
            mode: "eoa".to_string(),
            chain_id: config.chain_id,
            exchange_address,
            wallet_blob: None,
            wallet_summary: None,
            resolver_warning: Some("wallet metadata unavailable; falling back to direct EOA trading".to_string()),
        };
    };

    let (trading_address, mode, signature_type, warning) =
        match find_string_key(&blob, PROXY_ADDRESS_KEYS) {
            Some(addr) if crate::models::validate_eth_address(&addr).is_ok() => {
                (addr, "proxy".to_string(), 2u8, None)
            }
            _ => match find_alternative_address(&blob, &eoa_lower) {
                Some(addr) => (
                    addr,
                    "proxy".to_string(),
                    2u8,
                    Some("proxy address resolved via generic blob scan, not a known key".to_string()),
                ),
                None => (
                    eoa_address.to_string(),
                    "eoa".to_string(),
                    0u8,
                    Some("no proxy/trading address found in wallet metadata; using EOA directly".to_string()),
                ),
            },
        };

    let wallet_summary = resolve_balances(&blob);

    let funder_address = if mode == "proxy" { Some(trading_address.clone()) } else { None };

    TradingContext {
        eoa_address: eoa_address.to_string(),
        trading_address,
        funder_address,
        signature_type,
        mode,
        chain_id: config.chain_id,
        exchange_address,
        wallet_blob: Some(blob),
        wallet_summary: Some(wallet_summary),
        resolver_warning: warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            clob_host: "https://clob.polymarket.com".into(),
            chain_id: 137,
            dome_api_key: None,
            dome_base_url: "https://api.domeapi.io/v1".into(),
            builder_api_key: None,
            builder_api_secret: None,
            builder_api_passphrase: None,
            builder_signing_url: None,
            session_cookie_name: "session".into(),
            session_ttl_seconds: 86_400,
            nonce_ttl_seconds: 300,
            auth_rate_limit_max_requests: 10,
            auth_rate_limit_window_seconds: 60,
            tp_poll_seconds: 4,
            tp_max_minutes: 60,
            bind_addr: "0.0.0.0:3000".into(),
        }
    }

    #[test]
    fn resolves_proxy_wallet_key() {
        let cfg = test_config();
        let eoa = "0x0000000000000000000000000000000000001d";
        let blob = json!({ "proxyWallet": "0x00000000000000000000000000000000000002" });
        let ctx = resolve_trading_context(&cfg, eoa, Some(blob));
        assert_eq!(ctx.mode, "proxy");
        assert_eq!(ctx.signature_type, 2);
        assert_eq!(ctx.funder_address.as_deref(), Some(ctx.trading_address.as_str()));
        assert_ne!(ctx.trading_address.to_lowercase(), eoa.to_lowercase());
    }

    #[test]
    fn falls_back_to_direct_when_no_metadata() {
        let cfg = test_config();
        let ctx = resolve_trading_context(&cfg, "0xabc", None);
        assert_eq!(ctx.mode, "eoa");
        assert_eq!(ctx.signature_type, 0);
        assert!(ctx.funder_address.is_none());
        assert!(ctx.resolver_warning.is_some());
    }

    #[test]
    fn extracts_nested_usdc_balance() {
        let cfg = test_config();
        let blob = json!({
            "proxyWallet": "0x00000000000000000000000000000000000002",
            "balances": { "usdc": { "available": 12.5, "total": 30.0 } }
        });
        let ctx = resolve_trading_context(&cfg, "0x0000000000000000000000000000000000001", Some(blob));
        let summary = ctx.wallet_summary.unwrap();
        assert_eq!(summary.available_usdc, Some(12.5));
        assert_eq!(summary.total_usdc, Some(30.0));
    }
}
