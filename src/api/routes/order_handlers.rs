//! `POST /api/order/limit` (§6, §4.4, §4.5): validate a client-signed limit order against
//! the session's trading context, then forward it to the CLOB exactly once.

use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::api::server::AppState;
use crate::api::session::AuthSession;
use crate::error::AppError;
use crate::models::{LimitOrderRequest, LimitOrderResponse};
use crate::order_validator::{normalize_signed_order, validate_signed_order};

pub async fn place_limit_order(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Json(req): Json<LimitOrderRequest>,
) -> Result<Json<LimitOrderResponse>, AppError> {
    let side = req.side.to_uppercase();
    if side != "BUY" && side != "SELL" {
        return Err(AppError::ValidationFailed(format!("invalid order side '{}'", req.side)));
    }

    let order = normalize_signed_order(&req.signed_order)?;

    validate_signed_order(
        &state.config,
        &order,
        &session.eoa_address,
        &session.trading_context,
        &req.token_id,
        &side,
    )?;

    if let Some(key) = &req.idempotency_key {
        let bucket = format!("order:{}:{key}", session.eoa_address.to_lowercase());
        if !state.store.mark_idempotent(&bucket) {
            return Ok(Json(LimitOrderResponse {
                status: "duplicate".to_string(),
                order_id: None,
                entry_size_tokens: None,
                raw: None,
            }));
        }
    }

    let clob = state.clob_session_for(&session);
    let response = clob.post_signed_order(&order, &req.order_type).await?;

    let order_id = response
        .get("orderID")
        .or_else(|| response.get("orderId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    info!(
        eoa = %session.eoa_address,
        token_id = %req.token_id,
        side = %side,
        order_id = ?order_id,
        "limit order forwarded"
    );

    Ok(Json(LimitOrderResponse {
        status: "success".to_string(),
        order_id,
        entry_size_tokens: req.size_tokens,
        raw: Some(response),
    }))
}
