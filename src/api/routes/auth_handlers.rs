//! `/auth/*` and `/me` (§6, §4.2): the SIWE + CLOB-auth handshake that binds a wallet to a
//! server session, and the session-introspection endpoint consumers poll after login.

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use serde_json::json;
use time::Duration as CookieDuration;
use tracing::info;

use crate::api::server::AppState;
use crate::api::session::{client_ip, AuthSession};
use crate::auth;
use crate::error::AppError;
use crate::models::{validate_eth_address, NonceRequest, NonceResponse, VerifyRequest};
use crate::resolver::resolve_trading_context;

const NONCE_RATE_BUCKET: &str = "auth-nonce";
const VERIFY_RATE_BUCKET: &str = "auth-verify";

fn check_rate_limit(state: &AppState, bucket: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let ip = client_ip(headers);
    let key = format!("{bucket}:{ip}");
    if !state.store.allow_rate_limit(
        &key,
        state.config.auth_rate_limit_max_requests,
        state.config.auth_rate_limit_window_seconds,
    ) {
        return Err(AppError::RateLimited);
    }
    Ok(())
}

pub async fn nonce(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NonceRequest>,
) -> Result<Json<NonceResponse>, AppError> {
    check_rate_limit(&state, NONCE_RATE_BUCKET, &headers)?;

    let address = validate_eth_address(&req.address).map_err(AppError::ValidationFailed)?;
    let template = auth::build_siwe_message(&address, "{nonce}", state.config.chain_id);
    let (nonce, message) = state.store.create_nonce(&address, &template, state.config.nonce_ttl_seconds);

    Ok(Json(NonceResponse { nonce, message, chain_id: state.config.chain_id }))
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub eoa_address: String,
    pub trading_context: crate::store::TradingContext,
}

pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<VerifyRequest>,
) -> Result<(CookieJar, Json<VerifyResponse>), AppError> {
    check_rate_limit(&state, VERIFY_RATE_BUCKET, &headers)?;

    let address = validate_eth_address(&req.address).map_err(AppError::ValidationFailed)?;

    let record = state
        .store
        .consume_nonce(&address, &req.nonce)
        .ok_or_else(|| AppError::AuthInvalid("Nonce is invalid or expired".to_string()))?;

    let expected_message = record.message.replace("{nonce}", &record.nonce);
    if expected_message != req.message {
        return Err(AppError::AuthInvalid("SIWE message does not match the issued challenge".to_string()));
    }

    let recovered = auth::recover_personal_signer(&req.message, &req.signature)
        .map_err(|_| AppError::AuthInvalid("Invalid SIWE signature".to_string()))?;
    if recovered.to_string().to_lowercase() != address.to_lowercase() {
        return Err(AppError::AuthInvalid("SIWE signer does not match the claimed address".to_string()));
    }

    auth::recover_clob_auth_signer(
        &address,
        &req.clob_auth_signature,
        req.clob_auth_timestamp,
        req.clob_auth_nonce,
        req.chain_id,
    )?;

    let clob_creds = auth::derive_clob_api_creds(
        &state.http,
        &state.config.clob_host,
        &address,
        &req.clob_auth_signature,
        req.clob_auth_timestamp,
        req.clob_auth_nonce,
    )
    .await?;

    let wallet_blob = state.wallet_metadata.get_wallet(&address).await;
    let trading_context = resolve_trading_context(&state.config, &address, wallet_blob);

    let session = state.store.create_session(
        crate::models::checksum_address(&address),
        clob_creds,
        trading_context.clone(),
        state.config.session_ttl_seconds,
    );

    info!(eoa = %session.eoa_address, mode = %trading_context.mode, "auth verified, session created");

    let cookie = Cookie::build((state.config.session_cookie_name.clone(), session.token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::seconds(state.config.session_ttl_seconds as i64))
        .build();

    let response = VerifyResponse { ok: true, eoa_address: session.eoa_address.clone(), trading_context };
    Ok((jar.add(cookie), Json(response)))
}

pub async fn me(AuthSession(session): AuthSession) -> Json<serde_json::Value> {
    Json(json!({
        "eoa_address": session.eoa_address,
        "trading_context": session.trading_context,
    }))
}
