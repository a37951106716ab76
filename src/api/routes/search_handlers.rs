//! `GET /api/search` (§6): market search, backed by the `WalletMetadata` capability's
//! market-search surface (§10.6 of the expanded spec — kept as a best-effort enrichment,
//! never a hard dependency of login or trading).

use axum::{extract::{Query, State}, Json};
use serde::Deserialize;

use crate::api::server::AppState;
use crate::api::session::AuthSession;
use crate::error::AppError;
use crate::models::SearchResult;

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn search(
    State(state): State<AppState>,
    AuthSession(_session): AuthSession,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    match state.wallet_metadata.search_markets(&params.query, params.limit).await {
        Ok(results) => Ok(Json(results)),
        Err(_) => Ok(Json(Vec::new())),
    }
}
