//! `GET /api/token/meta` and `GET /api/token/allowance` (§6): read-only tradability and
//! balance/allowance lookups a client needs before it can construct and sign an order.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::server::AppState;
use crate::api::session::AuthSession;
use crate::config;
use crate::error::AppError;
use crate::models::{TokenAllowanceResponse, TokenMetaResponse};

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token_id: String,
}

pub async fn token_meta(
    State(state): State<AppState>,
    AuthSession(_session): AuthSession,
    Query(params): Query<TokenQuery>,
) -> Result<Json<TokenMetaResponse>, AppError> {
    let public_clob = state.public_clob();

    let neg_risk = public_clob.get_neg_risk(&params.token_id).await;
    let tick_size = public_clob.get_tick_size(&params.token_id).await;
    let fee_rate_bps = public_clob.get_fee_rate_bps(&params.token_id).await;
    let exchange_address = config::contract_config(state.config.chain_id, neg_risk).to_string();

    let book = public_clob.get_order_book(&params.token_id).await;
    let (best_bid, best_ask) = book
        .as_ref()
        .map(|b| (best_price(b, "bids"), best_price(b, "asks")))
        .unwrap_or((None, None));

    let market = state.gamma_markets.get_market_by_id(&params.token_id).await;
    let min_order_size = market
        .as_ref()
        .and_then(|m| m.get("orderMinSize").or_else(|| m.get("minimum_order_size")))
        .map(|v| v.to_string());

    Ok(Json(TokenMetaResponse {
        token_id: params.token_id,
        chain_id: state.config.chain_id,
        neg_risk,
        tick_size,
        fee_rate_bps,
        exchange_address,
        market,
        min_order_size,
        best_bid,
        best_ask,
    }))
}

/// Order books list levels worst-to-best; the best price for either side is the last entry.
fn best_price(book: &serde_json::Value, side: &str) -> Option<String> {
    book.get(side)
        .and_then(|v| v.as_array())
        .and_then(|levels| levels.last())
        .and_then(|level| level.get("price"))
        .map(|v| v.to_string().trim_matches('"').to_string())
}

pub async fn token_allowance(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(params): Query<TokenQuery>,
) -> Result<Json<TokenAllowanceResponse>, AppError> {
    let clob = state.clob_session_for(&session);

    let collateral = clob.get_balance_allowance("COLLATERAL", None).await?;
    let conditional = clob.get_balance_allowance("CONDITIONAL", Some(&params.token_id)).await?;

    Ok(Json(TokenAllowanceResponse { token_id: params.token_id, collateral, conditional }))
}
