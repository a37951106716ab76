//! Process-local state container (§3, §4.1). No durable storage: everything here is lost
//! on restart, by design. A single `Mutex` stands in for the reference implementation's
//! `threading.RLock` — none of the critical sections below ever re-enter the lock or cross
//! an `.await`, so a plain mutex gives the same guarantee without async-aware machinery.

use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::TpLevel;

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64()
}

#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub nonce: String,
    pub message: String,
    pub created_at: f64,
    pub expires_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClobCreds {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradingContext {
    pub eoa_address: String,
    pub trading_address: String,
    pub funder_address: Option<String>,
    pub signature_type: u8,
    pub mode: String,
    pub chain_id: u64,
    pub exchange_address: String,
    pub wallet_blob: Option<serde_json::Value>,
    pub wallet_summary: Option<WalletSummary>,
    pub resolver_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub available_usdc: Option<f64>,
    pub total_usdc: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub eoa_address: String,
    pub clob_creds: ClobCreds,
    pub trading_context: TradingContext,
    pub created_at: f64,
    pub expires_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedLevel {
    pub status: String,
    pub tp_order_id: Option<String>,
    pub fill_ratio_trigger: Option<f64>,
    pub error: Option<String>,
    pub ts: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TpEvent {
    pub ts: f64,
    pub event: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedTpOrderConfig {
    pub order_type: String,
    pub signed_order: crate::models::SignedOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct TpArm {
    pub arm_id: String,
    pub eoa_address: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub entry_order_id: String,
    pub token_id: String,
    pub entry_size_tokens: f64,
    pub mode: String,
    pub levels: Vec<TpLevel>,
    pub signed_tp_orders: HashMap<usize, SignedTpOrderConfig>,
    pub placed_levels: HashMap<usize, PlacedLevel>,
    pub status: String,
    pub last_filled_tokens: f64,
    pub poll_seconds: u64,
    pub max_minutes: u64,
    pub events: Vec<TpEvent>,
    #[serde(skip)]
    pub clob_creds: ClobCreds,
    pub trading_context: TradingContext,
}

impl TpArm {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "cancelled" | "error" | "timeout")
    }
}

#[derive(Default)]
struct StoreInner {
    nonces: HashMap<String, NonceRecord>,
    sessions: HashMap<String, Session>,
    rate_limits: HashMap<String, Vec<f64>>,
    tp_arms: HashMap<String, TpArm>,
    idempotency_keys: std::collections::HashSet<String>,
}

pub struct Store {
    inner: Mutex<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self { inner: Mutex::new(StoreInner::default()) }
    }

    pub fn create_nonce(&self, address: &str, message_template: &str, ttl_seconds: u64) -> (String, String) {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        let now = now_secs();
        let message = message_template.replace("{nonce}", &nonce);

        let record = NonceRecord {
            nonce: nonce.clone(),
            message: message_template.to_string(),
            created_at: now,
            expires_at: now + ttl_seconds as f64,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.nonces.insert(address.to_lowercase(), record);
        (nonce, message)
    }

    pub fn consume_nonce(&self, address: &str, nonce: &str) -> Option<NonceRecord> {
        let key = address.to_lowercase();
        let mut inner = self.inner.lock().unwrap();
        let record = inner.nonces.get(&key)?.clone();
        if record.expires_at < now_secs() {
            inner.nonces.remove(&key);
            return None;
        }
        if record.nonce != nonce {
            return None;
        }
        inner.nonces.remove(&key);
        Some(record)
    }

    pub fn create_session(&self, eoa_address: String, clob_creds: ClobCreds, trading_context: TradingContext, ttl_seconds: u64) -> Session {
        let mut bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut bytes);
        use base64::Engine as _;
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        let now = now_secs();

        let session = Session {
            token: token.clone(),
            eoa_address,
            clob_creds,
            trading_context,
            created_at: now,
            expires_at: now + ttl_seconds as f64,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(token, session.clone());
        session
    }

    pub fn get_session(&self, token: &str) -> Option<Session> {
        if token.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.get(token)?.clone();
        if session.expires_at < now_secs() {
            inner.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    #[allow(dead_code)]
    pub fn delete_session(&self, token: &str) {
        self.inner.lock().unwrap().sessions.remove(token);
    }

    /// Sliding-window rate limiter: prunes entries older than `now - window_s`, then admits
    /// the request iff the remaining count is still under `max`.
    pub fn allow_rate_limit(&self, key: &str, max: u32, window_s: u64) -> bool {
        let now = now_secs();
        let floor = now - window_s as f64;
        let mut inner = self.inner.lock().unwrap();
        let entries = inner.rate_limits.entry(key.to_string()).or_default();
        entries.retain(|ts| *ts >= floor);
        if entries.len() as u32 >= max {
            return false;
        }
        entries.push(now);
        true
    }

    pub fn mark_idempotent(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.idempotency_keys.insert(key.to_string())
    }

    pub fn save_tp_arm(&self, arm: TpArm) {
        self.inner.lock().unwrap().tp_arms.insert(arm.arm_id.clone(), arm);
    }

    pub fn get_tp_arm(&self, arm_id: &str) -> Option<TpArm> {
        self.inner.lock().unwrap().tp_arms.get(arm_id).cloned()
    }

    pub fn update_tp_arm<F: FnOnce(&mut TpArm)>(&self, arm_id: &str, patch: F) -> Option<TpArm> {
        let mut inner = self.inner.lock().unwrap();
        let arm = inner.tp_arms.get_mut(arm_id)?;
        patch(arm);
        Some(arm.clone())
    }

    pub fn append_tp_event(&self, arm_id: &str, event: &str, fields: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(arm) = inner.tp_arms.get_mut(arm_id) {
            arm.events.push(TpEvent { ts: now_secs(), event: event.to_string(), fields });
        }
    }

    pub fn get_tp_arms_for_user(&self, eoa_address: &str) -> Vec<TpArm> {
        let target = eoa_address.to_lowercase();
        self.inner
            .lock()
            .unwrap()
            .tp_arms
            .values()
            .filter(|arm| arm.eoa_address.to_lowercase() == target)
            .cloned()
            .collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_consumed_exactly_once() {
        let store = Store::new();
        let (nonce, _msg) = store.create_nonce("0xabc", "tmpl {nonce}", 300);
        assert!(store.consume_nonce("0xabc", &nonce).is_some());
        assert!(store.consume_nonce("0xabc", &nonce).is_none());
    }

    #[test]
    fn nonce_mismatch_rejected() {
        let store = Store::new();
        store.create_nonce("0xabc", "tmpl {nonce}", 300);
        assert!(store.consume_nonce("0xabc", "wrong").is_none());
    }

    #[test]
    fn rate_limit_admits_up_to_max() {
        let store = Store::new();
        for _ in 0..3 {
            assert!(store.allow_rate_limit("nonce:1.2.3.4", 3, 60));
        }
        assert!(!store.allow_rate_limit("nonce:1.2.3.4", 3, 60));
    }

    #[test]
    fn idempotency_marks_once() {
        let store = Store::new();
        assert!(store.mark_idempotent("k"));
        assert!(!store.mark_idempotent("k"));
    }
}
