//! Take-profit automation (§4.6). One `tokio::spawn`ed monitor task per armed TP,
//! polling the entry order's fill state and placing ladder levels as they become due.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde_json::Value;
use tracing::{info, warn};

use crate::clob_session::Level2SessionClobClient;
use crate::config::Config;
use crate::models::TpArmRequest;
use crate::store::{ClobCreds, PlacedLevel, SignedTpOrderConfig, Store, TpArm, TradingContext};

/// Tolerant extraction of "how many tokens of the entry order have filled" from an
/// upstream order payload whose shape is not guaranteed. Tried in order:
/// 1. an explicit status/state field containing "filled" but not "partial" -> full size
/// 2. the first percentage-like numeric field (0-1 or 1-100) -> scaled to tokens
/// 3. the largest amount-like numeric field, descaled from base-6 fixed point if needed
/// Always clamped to `[0, entry_size_tokens]`.
pub fn extract_filled_tokens(order: &Value, entry_size_tokens: f64) -> f64 {
    let clamp = |v: f64| v.clamp(0.0, entry_size_tokens);

    for key in ["status", "state", "order_status", "orderStatus"] {
        if let Some(s) = order.get(key).and_then(|v| v.as_str()) {
            let lower = s.to_lowercase();
            if lower.contains("filled") && !lower.contains("partial") {
                return clamp(entry_size_tokens);
            }
        }
    }

    for key in [
        "fill_pct",
        "filled_pct",
        "fillPercentage",
        "filledpercentage",
        "percent_filled",
        "pct_filled",
        "completion",
    ] {
        if let Some(n) = order.get(key).and_then(number_of) {
            let fraction = if n > 1.0 { n / 100.0 } else { n };
            return clamp(fraction * entry_size_tokens);
        }
    }

    let mut best: f64 = 0.0;
    for key in [
        "filled",
        "size_matched",
        "sizeMatched",
        "matched_amount",
        "matched_size",
        "executed_size",
        "filledAmount",
        "filled_size",
    ] {
        if let Some(n) = order.get(key).and_then(number_of) {
            let descaled = if n > entry_size_tokens * 1000.0 { n / 1_000_000.0 } else { n };
            best = best.max(descaled);
        }
    }
    clamp(best)
}

fn number_of(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str().and_then(|s| s.parse::<f64>().ok())
}

pub struct TpEngine {
    store: Arc<Store>,
}

fn generate_arm_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("tp_{}", hex::encode(bytes))
}

impl TpEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Arm construction (§4.6): snapshots creds/context into the arm record (the monitor
    /// outlives the HTTP request and must not depend on the session that created it),
    /// indexes the pre-signed TP orders by level, persists the arm, and spawns its monitor.
    pub fn construct_and_arm(
        &self,
        config: &Config,
        eoa_address: String,
        clob_creds: ClobCreds,
        trading_context: TradingContext,
        req: TpArmRequest,
    ) -> TpArm {
        let arm_id = generate_arm_id();
        let now = now_secs();

        let mut signed_tp_orders = HashMap::new();
        for signed in &req.signed_tp_orders {
            if let Ok(order) = crate::order_validator::normalize_signed_order(&signed.signed_order) {
                signed_tp_orders.insert(
                    signed.level_index,
                    SignedTpOrderConfig { order_type: signed.order_type.clone(), signed_order: order },
                );
            }
        }

        let arm = TpArm {
            arm_id: arm_id.clone(),
            eoa_address,
            created_at: now,
            updated_at: now,
            entry_order_id: req.entry_order_id,
            token_id: req.token_id,
            entry_size_tokens: req.entry_size_tokens,
            mode: req.mode,
            levels: req.levels,
            signed_tp_orders,
            placed_levels: HashMap::new(),
            status: "armed".to_string(),
            last_filled_tokens: 0.0,
            poll_seconds: config.tp_poll_seconds,
            max_minutes: req.max_minutes.unwrap_or(config.tp_max_minutes),
            events: Vec::new(),
            clob_creds: clob_creds.clone(),
            trading_context: trading_context.clone(),
        };

        self.store.save_tp_arm(arm.clone());
        self.store.append_tp_event(&arm_id, "armed", serde_json::json!({}));

        let clob = Arc::new(Level2SessionClobClient::new(
            reqwest::Client::builder()
                .timeout(config.http_timeout())
                .build()
                .expect("failed to build monitor HTTP client"),
            config.clob_host.clone(),
            arm.eoa_address.clone(),
            trading_context.funder_address.clone(),
            trading_context.signature_type,
            clob_creds,
        ));
        self.arm(arm_id, clob);
        arm
    }

    /// Spawns the monitor loop for an already-saved arm and returns immediately.
    pub fn arm(&self, arm_id: String, clob: Arc<Level2SessionClobClient>) {
        let store = self.store.clone();
        tokio::spawn(async move {
            monitor_arm(store, clob, arm_id).await;
        });
    }
}

async fn monitor_arm(store: Arc<Store>, clob: Arc<Level2SessionClobClient>, arm_id: String) {
    info!(arm_id = %arm_id, "tp-monitor started");

    loop {
        let arm = match store.get_tp_arm(&arm_id) {
            Some(arm) => arm,
            None => {
                warn!(arm_id = %arm_id, "tp-monitor: arm vanished from store, stopping");
                return;
            }
        };

        if arm.is_terminal() {
            info!(arm_id = %arm_id, status = %arm.status, "tp-monitor stopping: arm is terminal");
            return;
        }

        let now = now_secs();
        if now >= arm.created_at + (arm.max_minutes as f64 * 60.0) {
            store.update_tp_arm(&arm_id, |a| a.status = "timeout".to_string());
            store.append_tp_event(&arm_id, "timeout", serde_json::json!({}));
            info!(arm_id = %arm_id, "tp-monitor: arm timed out");
            return;
        }

        if let Err(e) = poll_once(&store, &clob, &arm).await {
            store.append_tp_event(&arm_id, "poll_error", serde_json::json!({ "error": e }));
            warn!(arm_id = %arm_id, error = %e, "tp-monitor poll error, continuing");
        }

        tokio::time::sleep(Duration::from_secs(arm.poll_seconds.max(1))).await;
    }
}

async fn poll_once(store: &Arc<Store>, clob: &Level2SessionClobClient, arm: &TpArm) -> Result<(), String> {
    let order = clob
        .get_order(&arm.entry_order_id)
        .await
        .map_err(|e| e.to_string())?;

    let filled_tokens = extract_filled_tokens(&order, arm.entry_size_tokens);
    store.update_tp_arm(&arm.arm_id, |a| a.last_filled_tokens = filled_tokens);

    if arm.entry_size_tokens <= 0.0 {
        return Ok(());
    }
    let cumulative_pct = (filled_tokens / arm.entry_size_tokens) * 100.0;

    let mut running_pct = 0.0;
    for (idx, level) in arm.levels.iter().enumerate() {
        running_pct += level.size_pct;

        if arm.placed_levels.contains_key(&idx) {
            continue;
        }
        if cumulative_pct + 1e-9 < running_pct {
            break;
        }

        let Some(config) = arm.signed_tp_orders.get(&idx) else {
            store.update_tp_arm(&arm.arm_id, |a| {
                a.placed_levels.insert(
                    idx,
                    PlacedLevel {
                        status: "error".to_string(),
                        tp_order_id: None,
                        fill_ratio_trigger: Some(cumulative_pct),
                        error: Some("no pre-signed order for this level".to_string()),
                        ts: now_secs(),
                    },
                );
            });
            store.append_tp_event(
                &arm.arm_id,
                "level_error",
                serde_json::json!({ "level": idx, "error": "no pre-signed order for this level" }),
            );
            continue;
        };

        let idem_key = format!("{}:{}:{}", arm.arm_id, idx, config.signed_order.signature);
        if !store.mark_idempotent(&idem_key) {
            continue;
        }

        match clob.post_signed_order(&config.signed_order, &config.order_type).await {
            Ok(resp) => {
                let tp_order_id = resp
                    .get("orderID")
                    .or_else(|| resp.get("orderId"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                store.update_tp_arm(&arm.arm_id, |a| {
                    a.placed_levels.insert(
                        idx,
                        PlacedLevel {
                            status: "placed".to_string(),
                            tp_order_id: tp_order_id.clone(),
                            fill_ratio_trigger: Some(cumulative_pct),
                            error: None,
                            ts: now_secs(),
                        },
                    );
                });
                store.append_tp_event(
                    &arm.arm_id,
                    "level_placed",
                    serde_json::json!({ "level": idx, "tp_order_id": tp_order_id }),
                );
            }
            Err(e) => {
                store.update_tp_arm(&arm.arm_id, |a| {
                    a.placed_levels.insert(
                        idx,
                        PlacedLevel {
                            status: "error".to_string(),
                            tp_order_id: None,
                            fill_ratio_trigger: Some(cumulative_pct),
                            error: Some(e.to_string()),
                            ts: now_secs(),
                        },
                    );
                });
                store.append_tp_event(
                    &arm.arm_id,
                    "level_error",
                    serde_json::json!({ "level": idx, "error": e.to_string() }),
                );
            }
        }
    }

    if let Some(fresh) = store.get_tp_arm(&arm.arm_id) {
        if fresh.levels.len() == fresh.placed_levels.len() {
            let all_placed = fresh.placed_levels.values().all(|l| l.status == "placed");
            if all_placed {
                store.update_tp_arm(&arm.arm_id, |a| a.status = "completed".to_string());
                store.append_tp_event(&arm.arm_id, "completed", serde_json::json!({}));
            } else {
                store.update_tp_arm(&arm.arm_id, |a| a.status = "error".to_string());
                store.append_tp_event(&arm.arm_id, "error", serde_json::json!({}));
            }
        }
    }

    Ok(())
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filled_status_string_returns_full_size() {
        let order = json!({ "status": "FILLED" });
        assert_eq!(extract_filled_tokens(&order, 100.0), 100.0);
    }

    #[test]
    fn partial_status_does_not_trigger_full_size() {
        let order = json!({ "status": "partially_filled", "size_matched": 40.0 });
        assert_eq!(extract_filled_tokens(&order, 100.0), 40.0);
    }

    #[test]
    fn percentage_field_in_0_to_1_range_is_scaled() {
        let order = json!({ "fill_pct": 0.25 });
        assert_eq!(extract_filled_tokens(&order, 100.0), 25.0);
    }

    #[test]
    fn percentage_field_in_1_to_100_range_is_scaled() {
        let order = json!({ "percent_filled": 60 });
        assert_eq!(extract_filled_tokens(&order, 200.0), 120.0);
    }

    #[test]
    fn amount_field_descaled_from_base6_fixed_point() {
        let order = json!({ "size_matched": 50_000_000 });
        assert_eq!(extract_filled_tokens(&order, 10.0), 10.0);
    }

    #[test]
    fn result_is_clamped_to_entry_size() {
        let order = json!({ "size_matched": 999.0 });
        assert_eq!(extract_filled_tokens(&order, 10.0), 10.0);
    }
}
