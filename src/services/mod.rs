/// Simulated players that vote on their own.
pub mod bot_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Ephemeral notifications on the shared event feed.
pub mod event_service;
/// Health check service.
pub mod health_service;
/// Session coordinator operations.
pub mod session_service;
/// Live subscriptions and their Server-Sent Events adapters.
pub mod sync_service;
