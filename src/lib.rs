//! Support Agent Orchestrator
//!
//! Classifies incoming conversational messages into a fixed taxonomy of
//! discourse categories, routes each one to a specialized agent, and decides
//! whether the conversation must be escalated to a human, using bounded,
//! expiring per-session memory to resolve context-dependent follow-ups that
//! cannot be classified from the message text alone.
//!
//! PIPELINE:
//! MESSAGE → SESSION CONTEXT → FOLLOW-UP? → PRIMARY DETECTION →
//! SEQUENCE VALIDATION → AGENT ROUTING → ESCALATION → PERSIST

pub mod api;
pub mod detection;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod taxonomy;

pub use error::Result;

// Re-export common types
pub use detection::{DetectionEngine, FinancingType, Profile};
pub use orchestrator::{ClassificationBundle, Orchestrator};
pub use taxonomy::{AgentKind, Category, Priority, Taxonomy};
