//! `POST /api/tp/arm` and `GET /api/tp/status` (§6, §4.6): arm a take-profit ladder behind
//! an already-placed entry order, and let the client poll its progress.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::server::AppState;
use crate::api::session::AuthSession;
use crate::error::AppError;
use crate::models::{TpArmRequest, TpArmResponse};
use crate::order_validator::{normalize_signed_order, validate_signed_order};

/// TP orders close an existing long; the ladder always exits with a SELL.
const TP_EXIT_SIDE: &str = "SELL";

pub async fn arm(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Json(req): Json<TpArmRequest>,
) -> Result<Json<TpArmResponse>, AppError> {
    req.validate().map_err(AppError::ValidationFailed)?;

    for signed in &req.signed_tp_orders {
        if signed.level_index >= req.levels.len() {
            return Err(AppError::ValidationFailed(format!(
                "signed_tp_orders level_index {} has no matching TP level",
                signed.level_index
            )));
        }
        let order = normalize_signed_order(&signed.signed_order)?;
        validate_signed_order(
            &state.config,
            &order,
            &session.eoa_address,
            &session.trading_context,
            &req.token_id,
            TP_EXIT_SIDE,
        )?;
    }

    let entry_order_id = req.entry_order_id.clone();
    let arm = state.tp_engine.construct_and_arm(
        &state.config,
        session.eoa_address.clone(),
        session.clob_creds.clone(),
        session.trading_context.clone(),
        req,
    );

    Ok(Json(TpArmResponse { status: "armed".to_string(), arm_id: arm.arm_id, entry_order_id }))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub arm_id: Option<String>,
}

pub async fn status(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(params): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(arm_id) = params.arm_id {
        let arm = state
            .store
            .get_tp_arm(&arm_id)
            .filter(|a| a.eoa_address.to_lowercase() == session.eoa_address.to_lowercase())
            .ok_or_else(|| AppError::ValidationFailed("no such arm for this session".to_string()))?;
        return Ok(Json(json!({ "arms": [arm] })));
    }

    let arms = state.store.get_tp_arms_for_user(&session.eoa_address);
    Ok(Json(json!({ "arms": arms })))
}
