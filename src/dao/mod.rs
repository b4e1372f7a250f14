/// Record definitions and field-scoped patches.
pub mod models;
/// Session/player/event store abstraction and its in-memory implementation.
pub mod session_store;
/// Storage error types shared by every store.
pub mod storage;
