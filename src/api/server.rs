//! Axum app assembly: shared state, router, and middleware stack.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::clob_session::{Level2SessionClobClient, PublicClobClient};
use crate::config::Config;
use crate::store::{Session, Store};
use crate::tp_engine::TpEngine;
use crate::wallet_metadata::{GammaMarketsClient, WalletMetadataClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub http: reqwest::Client,
    pub wallet_metadata: Arc<WalletMetadataClient>,
    pub gamma_markets: Arc<GammaMarketsClient>,
    pub tp_engine: Arc<TpEngine>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build shared HTTP client");

        let wallet_metadata = Arc::new(WalletMetadataClient::new(http.clone(), &config));
        let gamma_markets = Arc::new(GammaMarketsClient::new(http.clone()));
        let store = Arc::new(Store::new());
        let tp_engine = Arc::new(TpEngine::new(store.clone()));

        Self {
            config: Arc::new(config),
            store,
            http,
            wallet_metadata,
            gamma_markets,
            tp_engine,
        }
    }

    /// Builds a session-scoped `CLOBSession` facade for an authenticated request. Never
    /// holds a private key — only the session's derived L2 API credentials.
    pub fn clob_session_for(&self, session: &Session) -> Level2SessionClobClient {
        Level2SessionClobClient::new(
            self.http.clone(),
            self.config.clob_host.clone(),
            session.eoa_address.clone(),
            session.trading_context.funder_address.clone(),
            session.trading_context.signature_type,
            session.clob_creds.clone(),
        )
    }

    pub fn public_clob(&self) -> PublicClobClient {
        PublicClobClient::new(self.http.clone(), self.config.clob_host.clone())
    }
}

/// `AllowOrigin::mirror_request` reflects whatever Origin the browser sent, which is the
/// only way to combine a permissive dev-mode CORS policy with credentialed (cookie)
/// requests — a wildcard origin cannot be paired with `allow_credentials`.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/auth/nonce", post(routes::auth_handlers::nonce))
        .route("/auth/verify", post(routes::auth_handlers::verify))
        .route("/me", get(routes::auth_handlers::me))
        .route("/search", get(routes::search_handlers::search))
        .route("/token/meta", get(routes::token_handlers::token_meta))
        .route("/token/allowance", get(routes::token_handlers::token_allowance))
        .route("/order/limit", post(routes::order_handlers::place_limit_order))
        .route("/tp/arm", post(routes::tp_handlers::arm))
        .route("/tp/status", get(routes::tp_handlers::status));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
