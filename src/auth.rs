//! Authentication handshake (§4.2): SIWE challenge, CLOB-auth EIP-712 verification,
//! and L2 API credential derivation. EIP-712 hashing is hand-rolled (domain separator +
//! struct hash via keccak256) rather than going through a typed-data derive macro, the
//! same way the CTF Safe-transaction hashing in this codebase is built up field by field.

use alloy::primitives::{eip191_hash_message, keccak256, Address, B256};
use chrono::Utc;
use reqwest::Client;

use crate::config::{CLOB_AUTH_DOMAIN_NAME, CLOB_AUTH_DOMAIN_VERSION, CLOB_AUTH_MESSAGE};
use crate::error::AppError;
use crate::store::ClobCreds;

pub fn build_siwe_message(address: &str, nonce_placeholder: &str, chain_id: u64) -> String {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    format!(
        "OpiPoliX Web Experiment\nSign this message to authenticate.\n\nAddress: {address}\nChain ID: {chain_id}\nNonce: {nonce_placeholder}\nIssued At: {now}Z"
    )
}

pub(crate) fn recover_from_digest(digest: B256, signature_hex: &str) -> Result<Address, AppError> {
    let sig_bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| AppError::AuthInvalid(format!("Invalid signature: {e}")))?;
    if sig_bytes.len() != 65 {
        return Err(AppError::AuthInvalid("Invalid signature: expected 65 bytes".to_string()));
    }
    let signature = alloy::primitives::PrimitiveSignature::from_bytes_and_parity(
        &sig_bytes[..64],
        normalize_v(sig_bytes[64]),
    );
    signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| AppError::AuthInvalid(format!("Invalid signature: {e}")))
}

fn normalize_v(v: u8) -> bool {
    match v {
        27 => false,
        28 => true,
        0 => false,
        1 => true,
        other => other % 2 == 1,
    }
}

pub fn recover_personal_signer(message: &str, signature: &str) -> Result<Address, AppError> {
    let digest = eip191_hash_message(message.as_bytes());
    recover_from_digest(digest, signature)
}

fn pad_left_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    out
}

fn abi_address(addr: &Address) -> [u8; 32] {
    pad_left_32(addr.as_slice())
}

fn abi_u256(v: u64) -> [u8; 32] {
    pad_left_32(&v.to_be_bytes())
}

/// keccak256(0x1901 ++ domainSeparator ++ structHash)
fn typed_data_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain_separator.as_slice());
    buf.extend_from_slice(struct_hash.as_slice());
    keccak256(&buf)
}

/// Builds the ClobAuth EIP-712 digest. Domain is `{name, version, chainId}` — no
/// verifyingContract, unlike the order-signing domain in `order_validator.rs`.
pub fn clob_auth_digest(address: &Address, timestamp: &str, nonce: u64, chain_id: u64) -> B256 {
    let domain_typehash = keccak256(b"EIP712Domain(string name,string version,uint256 chainId)");
    let domain_separator = {
        let mut buf = Vec::with_capacity(32 * 4);
        buf.extend_from_slice(domain_typehash.as_slice());
        buf.extend_from_slice(keccak256(CLOB_AUTH_DOMAIN_NAME.as_bytes()).as_slice());
        buf.extend_from_slice(keccak256(CLOB_AUTH_DOMAIN_VERSION.as_bytes()).as_slice());
        buf.extend_from_slice(&abi_u256(chain_id));
        keccak256(&buf)
    };

    let struct_typehash =
        keccak256(b"ClobAuth(address address,string timestamp,uint256 nonce,string message)");
    let struct_hash = {
        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(struct_typehash.as_slice());
        buf.extend_from_slice(&abi_address(address));
        buf.extend_from_slice(keccak256(timestamp.as_bytes()).as_slice());
        buf.extend_from_slice(&abi_u256(nonce));
        buf.extend_from_slice(keccak256(CLOB_AUTH_MESSAGE.as_bytes()).as_slice());
        keccak256(&buf)
    };

    typed_data_digest(domain_separator, struct_hash)
}

pub fn recover_clob_auth_signer(
    address: &str,
    signature: &str,
    timestamp: i64,
    nonce: u64,
    chain_id: u64,
) -> Result<(), AppError> {
    let addr: Address = address
        .parse()
        .map_err(|_| AppError::ValidationFailed("Invalid EVM address".to_string()))?;
    let digest = clob_auth_digest(&addr, &timestamp.to_string(), nonce, chain_id);
    let recovered = recover_from_digest(digest, signature)
        .map_err(|_| AppError::AuthInvalid("Invalid CLOB auth signature".to_string()))?;

    if recovered.to_string().to_lowercase() != address.to_lowercase() {
        return Err(AppError::AuthInvalid("CLOB auth signer mismatch".to_string()));
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct CredentialPayload {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    secret: Option<String>,
    passphrase: Option<String>,
}

/// POST `/auth/api-key`, falling back to GET `/auth/derive-api-key` on non-2xx (§4.2).
pub async fn derive_clob_api_creds(
    http: &Client,
    clob_host: &str,
    address: &str,
    signature: &str,
    timestamp: i64,
    nonce: u64,
) -> Result<ClobCreds, AppError> {
    let headers = [
        ("POLY_ADDRESS", address.to_string()),
        ("POLY_SIGNATURE", signature.to_string()),
        ("POLY_TIMESTAMP", timestamp.to_string()),
        ("POLY_NONCE", nonce.to_string()),
    ];

    let apply_headers = |mut b: reqwest::RequestBuilder| {
        for (k, v) in headers.iter() {
            b = b.header(*k, v);
        }
        b
    };

    let create_url = format!("{clob_host}/auth/api-key");
    let create_resp = apply_headers(http.post(&create_url))
        .send()
        .await
        .map_err(|e| AppError::CredentialDerivationFailed(format!("create request failed: {e}")))?;

    let payload = if create_resp.status().is_success() {
        create_resp
            .json::<CredentialPayload>()
            .await
            .map_err(|e| AppError::CredentialPayloadInvalid(e.to_string()))?
    } else {
        let create_status = create_resp.status().as_u16();
        let derive_url = format!("{clob_host}/auth/derive-api-key");
        let derive_resp = apply_headers(http.get(&derive_url))
            .send()
            .await
            .map_err(|e| AppError::CredentialDerivationFailed(format!("derive request failed: {e}")))?;

        if !derive_resp.status().is_success() {
            return Err(AppError::CredentialDerivationFailed(format!(
                "Failed to derive CLOB API credentials. create={}, derive={}",
                create_status,
                derive_resp.status().as_u16()
            )));
        }
        derive_resp
            .json::<CredentialPayload>()
            .await
            .map_err(|e| AppError::CredentialPayloadInvalid(e.to_string()))?
    };

    match (payload.api_key, payload.secret, payload.passphrase) {
        (Some(api_key), Some(api_secret), Some(api_passphrase))
            if !api_key.is_empty() && !api_secret.is_empty() && !api_passphrase.is_empty() =>
        {
            Ok(ClobCreds { api_key, api_secret, api_passphrase })
        }
        _ => Err(AppError::CredentialPayloadInvalid(
            "CLOB credential payload missing fields".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siwe_message_contains_address_and_nonce_lines() {
        let msg = build_siwe_message("0xabc", "{nonce}", 137);
        assert!(msg.contains("Address: 0xabc"));
        assert!(msg.contains("Chain ID: 137"));
        assert!(msg.contains("Nonce: {nonce}"));
    }

    #[test]
    fn clob_auth_digest_is_deterministic() {
        let addr: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        let a = clob_auth_digest(&addr, "1700000000", 42, 137);
        let b = clob_auth_digest(&addr, "1700000000", 42, 137);
        assert_eq!(a, b);
    }
}
