//! Normalizes and validates client-signed CLOB orders (§4.4). The client signs an order
//! off-chain but never tells us which CTF Exchange contract (regular vs neg-risk) it
//! targeted, so signature recovery is tried against both domains; either match is accepted.

use alloy::primitives::{keccak256, Address, B256, U256};
use serde_json::Value;

use crate::config::{self, Config};
use crate::error::AppError;
use crate::models::{checksum_address, RawSignedOrder, SignedOrder};
use crate::store::TradingContext;

/// JSON numbers above this lose integer precision once round-tripped through an `f64`
/// in a browser; `salt` is bounded to stay JSON-number-safe end to end.
const MAX_JSON_SAFE_INT: u64 = (1u64 << 53) - 1;

fn field_str(raw: &RawSignedOrder, key: &str) -> Result<String, AppError> {
    match raw.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(AppError::ValidationFailed(format!("signed_order missing field '{key}'"))),
    }
}

fn field_u64(raw: &RawSignedOrder, key: &str) -> Result<u64, AppError> {
    match raw.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| AppError::ValidationFailed(format!("signed_order field '{key}' not an integer"))),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| AppError::ValidationFailed(format!("signed_order field '{key}' not an integer"))),
        _ => Err(AppError::ValidationFailed(format!("signed_order missing field '{key}'"))),
    }
}

fn field_u8_opt(raw: &RawSignedOrder, key: &str, default: u8) -> u8 {
    match raw.get(key) {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as u8).unwrap_or(default),
        Some(Value::String(s)) => s.parse::<u8>().unwrap_or(default),
        _ => default,
    }
}

fn normalize_side(raw: &str) -> Result<String, AppError> {
    match raw.to_uppercase().as_str() {
        "BUY" | "0" => Ok("BUY".to_string()),
        "SELL" | "1" => Ok("SELL".to_string()),
        other => Err(AppError::ValidationFailed(format!("invalid order side '{other}'"))),
    }
}

/// Narrows the permissive client payload into the canonical `SignedOrder`, mirroring the
/// reference implementation's payload normalization: amounts and ids are always carried
/// as decimal strings (they exceed u64/f64-safe precision on the wire), side is coerced
/// to BUY/SELL, and `signatureType` defaults to 0 (EOA) when absent.
pub fn normalize_signed_order(raw: &RawSignedOrder) -> Result<SignedOrder, AppError> {
    let side_raw = field_str(raw, "side")?;
    let salt = field_u64(raw, "salt")?;
    if salt > MAX_JSON_SAFE_INT {
        return Err(AppError::ValidationFailed(format!(
            "salt {salt} exceeds the JSON-safe integer bound (2^53-1)"
        )));
    }
    Ok(SignedOrder {
        salt,
        maker: checksum_address(&field_str(raw, "maker")?),
        signer: checksum_address(&field_str(raw, "signer")?),
        taker: checksum_address(
            &field_str(raw, "taker").unwrap_or_else(|_| "0x0000000000000000000000000000000000000000".to_string()),
        ),
        token_id: field_str(raw, "tokenId").or_else(|_| field_str(raw, "token_id"))?,
        maker_amount: field_str(raw, "makerAmount").or_else(|_| field_str(raw, "maker_amount"))?,
        taker_amount: field_str(raw, "takerAmount").or_else(|_| field_str(raw, "taker_amount"))?,
        expiration: field_str(raw, "expiration").unwrap_or_else(|_| "0".to_string()),
        nonce: field_str(raw, "nonce").unwrap_or_else(|_| "0".to_string()),
        fee_rate_bps: field_str(raw, "feeRateBps").unwrap_or_else(|_| "0".to_string()),
        side: normalize_side(&side_raw)?,
        signature_type: field_u8_opt(raw, "signatureType", 0),
        signature: field_str(raw, "signature")?,
    })
}

fn pad_left_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    out
}

fn abi_address(addr: &Address) -> [u8; 32] {
    pad_left_32(addr.as_slice())
}

/// `tokenId`/amount fields are full 256-bit integers on chain (conditional-token ids in
/// particular routinely exceed `u128::MAX`), so the ABI word is built from `U256`, not a
/// narrower machine integer.
fn abi_decimal_str(s: &str) -> Result<[u8; 32], AppError> {
    let v = U256::from_str_radix(s, 10)
        .map_err(|_| AppError::ValidationFailed(format!("invalid integer field '{s}'")))?;
    Ok(v.to_be_bytes::<32>())
}

fn abi_u64(v: u64) -> [u8; 32] {
    pad_left_32(&v.to_be_bytes())
}

fn abi_u8(v: u8) -> [u8; 32] {
    pad_left_32(&[v])
}

fn side_code(side: &str) -> u8 {
    if side == "SELL" {
        1
    } else {
        0
    }
}

const ORDER_TYPEHASH_PREIMAGE: &[u8] =
    b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";

fn order_domain_separator(chain_id: u64, verifying_contract: &Address) -> B256 {
    let domain_typehash =
        keccak256(b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)");
    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(domain_typehash.as_slice());
    buf.extend_from_slice(keccak256(b"Polymarket CTF Exchange").as_slice());
    buf.extend_from_slice(keccak256(b"1").as_slice());
    buf.extend_from_slice(&abi_u64(chain_id));
    buf.extend_from_slice(&abi_address(verifying_contract));
    keccak256(&buf)
}

fn order_struct_hash(order: &SignedOrder) -> Result<B256, AppError> {
    let maker: Address = order
        .maker
        .parse()
        .map_err(|_| AppError::ValidationFailed("invalid maker address".to_string()))?;
    let signer: Address = order
        .signer
        .parse()
        .map_err(|_| AppError::ValidationFailed("invalid signer address".to_string()))?;
    let taker: Address = order
        .taker
        .parse()
        .map_err(|_| AppError::ValidationFailed("invalid taker address".to_string()))?;

    let typehash = keccak256(ORDER_TYPEHASH_PREIMAGE);

    let mut buf = Vec::with_capacity(32 * 13);
    buf.extend_from_slice(typehash.as_slice());
    buf.extend_from_slice(&abi_u64(order.salt));
    buf.extend_from_slice(&abi_address(&maker));
    buf.extend_from_slice(&abi_address(&signer));
    buf.extend_from_slice(&abi_address(&taker));
    buf.extend_from_slice(&abi_decimal_str(&order.token_id)?);
    buf.extend_from_slice(&abi_decimal_str(&order.maker_amount)?);
    buf.extend_from_slice(&abi_decimal_str(&order.taker_amount)?);
    buf.extend_from_slice(&abi_decimal_str(&order.expiration)?);
    buf.extend_from_slice(&abi_decimal_str(&order.nonce)?);
    buf.extend_from_slice(&abi_decimal_str(&order.fee_rate_bps)?);
    buf.extend_from_slice(&abi_u8(side_code(&order.side)));
    buf.extend_from_slice(&abi_u8(order.signature_type));
    Ok(keccak256(&buf))
}

fn order_digest(order: &SignedOrder, chain_id: u64, verifying_contract: &Address) -> Result<B256, AppError> {
    let domain_separator = order_domain_separator(chain_id, verifying_contract);
    let struct_hash = order_struct_hash(order)?;
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain_separator.as_slice());
    buf.extend_from_slice(struct_hash.as_slice());
    Ok(keccak256(&buf))
}

/// Tries both the regular and neg-risk exchange domains, returning every address that
/// the order signature recovers to. The caller accepts the order iff the authenticated
/// EOA appears in this set.
pub fn recover_order_signer_candidates(
    order: &SignedOrder,
    chain_id: u64,
) -> Result<Vec<Address>, AppError> {
    let mut candidates = Vec::with_capacity(2);
    for neg_risk in [false, true] {
        let contract_str = config::contract_config(chain_id, neg_risk);
        let contract: Address = contract_str
            .parse()
            .map_err(|_| AppError::InternalError("invalid configured exchange contract address".to_string()))?;
        let digest = order_digest(order, chain_id, &contract)?;
        if let Ok(addr) = crate::auth::recover_from_digest(digest, &order.signature) {
            candidates.push(addr);
        }
    }
    Ok(candidates)
}

/// Full validation pipeline for a client-signed order (§4.4): signer/maker/signatureType
/// checks against the session's trading context, tokenId/side checks against the request,
/// then dual-domain EIP-712 signature recovery against the authenticated session EOA.
pub fn validate_signed_order(
    config: &Config,
    order: &SignedOrder,
    session_eoa: &str,
    trading_context: &TradingContext,
    expected_token_id: &str,
    expected_side: &str,
) -> Result<(), AppError> {
    let eoa_lower = session_eoa.to_lowercase();

    if order.signer.to_lowercase() != eoa_lower {
        return Err(AppError::ValidationFailed("signed_order signer does not match authenticated session".to_string()));
    }
    if order.maker.to_lowercase() != trading_context.trading_address.to_lowercase() {
        return Err(AppError::ValidationFailed("signed_order maker does not match trading address".to_string()));
    }
    if order.signature_type != trading_context.signature_type {
        return Err(AppError::ValidationFailed("signed_order signatureType does not match trading context".to_string()));
    }
    if order.token_id != expected_token_id {
        return Err(AppError::ValidationFailed("signed_order tokenId does not match request".to_string()));
    }
    if order.side != expected_side {
        return Err(AppError::ValidationFailed("signed_order side does not match request".to_string()));
    }

    let candidates = recover_order_signer_candidates(order, config.chain_id)?;
    let matched = candidates.iter().any(|addr| addr.to_string().to_lowercase() == eoa_lower);

    if !matched {
        return Err(AppError::OrderSignatureMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw_order() -> RawSignedOrder {
        let mut m = HashMap::new();
        m.insert("salt".to_string(), Value::from(12345));
        m.insert("maker".to_string(), Value::from("0x0000000000000000000000000000000000000001"));
        m.insert("signer".to_string(), Value::from("0x0000000000000000000000000000000000000001"));
        m.insert("taker".to_string(), Value::from("0x0000000000000000000000000000000000000000"));
        m.insert("tokenId".to_string(), Value::from("123456789"));
        m.insert("makerAmount".to_string(), Value::from("1000000"));
        m.insert("takerAmount".to_string(), Value::from("2000000"));
        m.insert("expiration".to_string(), Value::from("0"));
        m.insert("nonce".to_string(), Value::from("0"));
        m.insert("feeRateBps".to_string(), Value::from("0"));
        m.insert("side".to_string(), Value::from("BUY"));
        m.insert("signatureType".to_string(), Value::from(0));
        m.insert("signature".to_string(), Value::from("0x".to_string() + &"11".repeat(65)));
        m
    }

    #[test]
    fn normalizes_side_and_defaults() {
        let order = normalize_signed_order(&raw_order()).unwrap();
        assert_eq!(order.side, "BUY");
        assert_eq!(order.signature_type, 0);
    }

    #[test]
    fn normalize_is_idempotent() {
        let order = normalize_signed_order(&raw_order()).unwrap();
        let rehashed_raw: RawSignedOrder = order.to_upstream_json().as_object().unwrap().clone().into_iter().collect();
        let twice = normalize_signed_order(&rehashed_raw).unwrap();
        assert_eq!(order.maker, twice.maker);
        assert_eq!(order.salt, twice.salt);
        assert_eq!(order.side, twice.side);
    }

    #[test]
    fn salt_above_json_safe_bound_is_rejected() {
        let mut raw = raw_order();
        raw.insert("salt".to_string(), Value::from(u64::MAX));
        assert!(normalize_signed_order(&raw).is_err());
    }

    #[test]
    fn rejects_maker_mismatch_against_trading_context() {
        let config = Config {
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
        };
        let order = normalize_signed_order(&raw_order()).unwrap();
        let ctx = TradingContext {
            eoa_address: order.signer.clone(),
            trading_address: "0x000000000000000000000000000000000000ff".to_string(),
            funder_address: None,
            signature_type: 0,
            mode: "eoa".to_string(),
            chain_id: 137,
            exchange_address: "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E".to_string(),
            wallet_blob: None,
            wallet_summary: None,
            resolver_warning: None,
        };
        let err = validate_signed_order(&config, &order, &order.signer, &ctx, &order.token_id, "BUY").unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn rejects_mismatched_token_id() {
        let order = normalize_signed_order(&raw_order()).unwrap();
        let cfg_chain_id = 137;
        let digest_ok = order_digest(
            &order,
            cfg_chain_id,
            &"0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E".parse().unwrap(),
        );
        assert!(digest_ok.is_ok());
    }
}
