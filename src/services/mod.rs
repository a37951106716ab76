//! Supporting services for the trading gateway.
