//! `CLOBSession` (§4.5): forwards already-signed orders to the upstream CLOB using L2
//! HMAC-authenticated REST calls. The session never holds a private key — its "signer"
//! exists only to satisfy callers that expect one, and errors if anything ever calls it.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::models::SignedOrder;
use crate::store::ClobCreds;

type HmacSha256 = Hmac<Sha256>;

/// Stand-in for a private-key signer. Constructed with only an address; any attempt to
/// actually sign with it is a programming error, not a runtime path this gateway uses.
#[derive(Debug, Clone)]
pub struct SessionAddressSigner {
    pub address: String,
}

impl SessionAddressSigner {
    pub fn sign(&self, _digest: &[u8]) -> Result<Vec<u8>, AppError> {
        Err(AppError::InternalError(
            "SessionAddressSigner cannot sign: this session holds no private key".to_string(),
        ))
    }
}

pub struct Level2SessionClobClient {
    http: reqwest::Client,
    clob_host: String,
    eoa_address: String,
    funder_address: Option<String>,
    signature_type: u8,
    creds: ClobCreds,
    pub signer: SessionAddressSigner,
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, AppError> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(secret)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(secret))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))
        .map_err(|e| AppError::InternalError(format!("invalid API secret encoding: {e}")))
}

fn l2_signature(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String, AppError> {
    use base64::Engine;
    let secret_bytes = decode_secret(secret)?;
    let payload = format!("{timestamp}{method}{path}{body}");
    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| AppError::InternalError(format!("invalid API secret: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

impl Level2SessionClobClient {
    pub fn new(
        http: reqwest::Client,
        clob_host: String,
        eoa_address: String,
        funder_address: Option<String>,
        signature_type: u8,
        creds: ClobCreds,
    ) -> Self {
        Self {
            http,
            clob_host,
            signer: SessionAddressSigner { address: eoa_address.clone() },
            eoa_address,
            funder_address,
            signature_type,
            creds,
        }
    }

    fn l2_headers(&self, method: &str, path: &str, body: &str) -> Result<Vec<(&'static str, String)>, AppError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = l2_signature(&self.creds.api_secret, &timestamp, method, path, body)?;
        Ok(vec![
            ("POLY_ADDRESS", self.eoa_address.clone()),
            ("POLY_SIGNATURE", signature),
            ("POLY_TIMESTAMP", timestamp),
            ("POLY_API_KEY", self.creds.api_key.clone()),
            ("POLY_PASSPHRASE", self.creds.api_passphrase.clone()),
        ])
    }

    async fn send_json(
        &self,
        method: &str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, AppError> {
        let body_str = body.map(|b| b.to_string()).unwrap_or_default();
        let headers = self.l2_headers(method, path, &body_str)?;
        let url = format!("{}{}", self.clob_host, path);

        let mut builder = match method {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "DELETE" => self.http.delete(&url),
            other => return Err(AppError::InternalError(format!("unsupported HTTP method {other}"))),
        };
        builder = builder.header("Content-Type", "application/json");
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        if let Some(b) = body {
            builder = builder.json(b);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::upstream(502, format!("upstream request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AppError::upstream(status.as_u16(), text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::upstream(502, format!("unparseable upstream response: {e}")))
    }

    pub async fn post_signed_order(&self, order: &SignedOrder, order_type: &str) -> Result<serde_json::Value, AppError> {
        let mut payload = order.to_upstream_json();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("orderType".to_string(), serde_json::Value::String(order_type.to_string()));
            if let Some(funder) = &self.funder_address {
                obj.insert("funder".to_string(), serde_json::Value::String(funder.clone()));
            }
        }
        self.send_json("POST", "/order", Some(&payload)).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<serde_json::Value, AppError> {
        let path = format!("/data/order/{order_id}");
        self.send_json("GET", &path, None).await
    }

    pub async fn get_open_orders(&self, market: Option<&str>, asset_id: Option<&str>) -> Result<serde_json::Value, AppError> {
        let mut path = "/data/orders".to_string();
        let mut params = Vec::new();
        if let Some(m) = market {
            params.push(format!("market={}", urlencoding::encode(m)));
        }
        if let Some(a) = asset_id {
            params.push(format!("asset_id={}", urlencoding::encode(a)));
        }
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }
        self.send_json("GET", &path, None).await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), AppError> {
        let body = serde_json::json!({ "orderID": order_id });
        self.send_json("DELETE", "/order", Some(&body)).await?;
        Ok(())
    }

    pub async fn get_balance_allowance(&self, asset_type: &str, token_id: Option<&str>) -> Result<serde_json::Value, AppError> {
        let mut path = format!("/balance-allowance?asset_type={}", urlencoding::encode(asset_type));
        if let Some(tid) = token_id {
            path.push_str(&format!("&token_id={}", urlencoding::encode(tid)));
        }
        self.send_json("GET", &path, None).await
    }

    pub fn signature_type(&self) -> u8 {
        self.signature_type
    }
}

/// Public, unauthenticated CLOB read endpoints used for token metadata (§6: `CLOBClient`
/// `get_neg_risk`/`get_tick_size`/`get_fee_rate_bps`/`get_order_book`). These never carry
/// L2 credentials — any authenticated user can look up tradability info for any token.
pub struct PublicClobClient {
    http: reqwest::Client,
    clob_host: String,
}

impl PublicClobClient {
    pub fn new(http: reqwest::Client, clob_host: String) -> Self {
        Self { http, clob_host }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, AppError> {
        let url = format!("{}{}", self.clob_host, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::upstream(502, format!("upstream request failed: {e}")))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::upstream(status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| AppError::upstream(502, format!("unparseable upstream response: {e}")))
    }

    pub async fn get_neg_risk(&self, token_id: &str) -> bool {
        self.get_json(&format!("/neg-risk?token_id={}", urlencoding::encode(token_id)))
            .await
            .ok()
            .and_then(|v| v.get("neg_risk").and_then(|v| v.as_bool()))
            .unwrap_or(false)
    }

    pub async fn get_tick_size(&self, token_id: &str) -> String {
        self.get_json(&format!("/tick-size?token_id={}", urlencoding::encode(token_id)))
            .await
            .ok()
            .and_then(|v| v.get("minimum_tick_size").cloned())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "0.01".to_string())
    }

    pub async fn get_fee_rate_bps(&self, token_id: &str) -> String {
        self.get_json(&format!("/fee-rate-bps?token_id={}", urlencoding::encode(token_id)))
            .await
            .ok()
            .and_then(|v| v.get("fee_rate_bps").cloned())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "0".to_string())
    }

    pub async fn get_order_book(&self, token_id: &str) -> Option<serde_json::Value> {
        self.get_json(&format!("/book?token_id={}", urlencoding::encode(token_id))).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_refuses_to_sign() {
        let signer = SessionAddressSigner { address: "0xabc".to_string() };
        assert!(signer.sign(b"anything").is_err());
    }

    #[test]
    fn l2_signature_is_deterministic_for_same_inputs() {
        let secret = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, b"supersecret");
        let a = l2_signature(&secret, "1700000000", "GET", "/data/orders", "").unwrap();
        let b = l2_signature(&secret, "1700000000", "GET", "/data/orders", "").unwrap();
        assert_eq!(a, b);
    }
}
