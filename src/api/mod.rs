//! HTTP API
//!
//! Read-only JSON views of bets, prize lots, payouts and fee state, plus
//! health, status and Prometheus metrics.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
