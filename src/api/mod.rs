//! HTTP surface for the trading gateway.

pub mod routes;
pub mod server;
pub mod session;

pub use server::{create_app, AppState};
