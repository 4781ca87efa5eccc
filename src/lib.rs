//! Core library for the price-display client.
//!
//! The client connects to a price-streaming WebSocket endpoint, greets the
//! server once, and renders every `priceIndex` it receives into a display
//! target as `USD <value>` with eight decimals.

pub mod client;
pub mod config;
pub mod display;
pub mod errors;
pub mod models;
pub mod utils;
