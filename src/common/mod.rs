//! Common utilities and shared functionality
//!
//! Value types, collaborator traits and the configuration loader used across
//! the wager engine.

pub mod types;
pub mod config;
pub mod traits;
