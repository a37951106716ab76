//! API route handlers

pub mod auth_handlers;
pub mod order_handlers;
pub mod search_handlers;
pub mod token_handlers;
pub mod tp_handlers;
