//! Library crate for imposter-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Storage records and the session store.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Error types and their HTTP mapping.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business operations behind the routes.
pub mod services;
/// Shared state and game rules.
pub mod state;
