//! A session-oriented trading gateway fronting a prediction-market CLOB.
//!
//! Authenticated users sign orders in their browser with an Ethereum key; the gateway
//! validates those signatures server-side, forwards them to the CLOB using derived
//! Level-2 API credentials, and runs a per-user take-profit automation engine that
//! watches an entry order's fill progress and submits pre-signed exit orders as ladder
//! thresholds are crossed. The gateway never holds a private key.

pub mod api;
pub mod auth;
pub mod clob_session;
pub mod config;
pub mod error;
pub mod models;
pub mod order_validator;
pub mod resolver;
pub mod services;
pub mod store;
pub mod tp_engine;
pub mod wallet_metadata;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use store::Store;
pub use tp_engine::TpEngine;
