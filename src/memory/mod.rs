//! Session memory
//!
//! Bounded, time-expiring per-session state: message history, recently
//! presented categories/agents and free-form context data, with
//! export/import and aggregate statistics.

pub mod session;
pub mod store;

pub use session::{
    MessageEntry, MessageRole, SessionExport, SessionRecord, SessionStatus,
};
pub use store::{
    InMemorySessionStore, SessionSnapshot, SessionStore, StoreConfig, StoreStats,
    DEFAULT_SWEEP_MAX_IDLE,
};
