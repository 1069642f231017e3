//! Per-session state
//!
//! The data half of session memory: the session record, message history and
//! the bounded rings of recently presented categories and agents. Everything
//! here is plain data with explicit capacities; the store wraps it for
//! concurrent access.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::detection::Profile;
use crate::taxonomy::{AgentKind, Category};

/// Slots in the record's recently-presented-category ring
pub const RECENT_CATEGORY_CAP: usize = 5;
/// Slots in the timestamped category/agent event rings
pub const EVENT_RING_CAP: usize = 10;
/// Default per-session message history bound
pub const DEFAULT_MESSAGE_HISTORY_CAP: usize = 50;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Session lifecycle status. Transitions never lead back to `Active`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Escalated,
    Completed,
}

/// A single message in the session history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEntry {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    pub category: Option<Category>,
    pub agent: Option<AgentKind>,
}

impl MessageEntry {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            category: None,
            agent: None,
        }
    }

    /// A message stamped with the classification it received
    pub fn tagged(
        role: MessageRole,
        content: impl Into<String>,
        category: Category,
        agent: AgentKind,
    ) -> Self {
        Self {
            category: Some(category),
            agent: Some(agent),
            ..Self::new(role, content)
        }
    }
}

/// Timestamped category presentation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CategoryEvent {
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

/// Timestamped agent selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub agent: AgentKind,
    pub timestamp: DateTime<Utc>,
}

/// The session record proper: status, activity timestamps and the
/// 5-slot ring of recently presented categories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub profile: Option<Profile>,
    pub current_category: Option<Category>,
    pub recent_categories: VecDeque<Category>,
    pub message_count: u64,
    pub escalation_count: u64,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            profile: None,
            current_category: None,
            recent_categories: VecDeque::with_capacity(RECENT_CATEGORY_CAP),
            message_count: 0,
            escalation_count: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, cap: usize, value: T) {
    while ring.len() >= cap {
        ring.pop_front();
    }
    ring.push_back(value);
}

/// Keep only the newest `cap` entries of an imported ring
fn clamp_ring<T>(ring: VecDeque<T>, cap: usize) -> VecDeque<T> {
    let skip = ring.len().saturating_sub(cap);
    ring.into_iter().skip(skip).collect()
}

/// Full per-session aggregate: record, bounded history and rings,
/// free-form context data
#[derive(Debug)]
pub struct SessionState {
    record: SessionRecord,
    messages: VecDeque<MessageEntry>,
    message_cap: usize,
    category_events: VecDeque<CategoryEvent>,
    agent_events: VecDeque<AgentEvent>,
    context: HashMap<String, Value>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, message_cap: usize) -> Self {
        Self {
            record: SessionRecord::new(session_id),
            messages: VecDeque::with_capacity(message_cap.min(DEFAULT_MESSAGE_HISTORY_CAP)),
            message_cap,
            category_events: VecDeque::with_capacity(EVENT_RING_CAP),
            agent_events: VecDeque::with_capacity(EVENT_RING_CAP),
            context: HashMap::new(),
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn touch(&mut self) {
        self.record.touch();
    }

    /// Append to the history, evicting the oldest entry past the cap
    pub fn append_message(&mut self, entry: MessageEntry) {
        push_bounded(&mut self.messages, self.message_cap, entry);
        self.record.message_count += 1;
        self.record.touch();
    }

    /// Record a presented category: event ring, recent ring and the
    /// record's current category
    pub fn record_category(&mut self, category: Category) {
        push_bounded(
            &mut self.category_events,
            EVENT_RING_CAP,
            CategoryEvent {
                category,
                timestamp: Utc::now(),
            },
        );
        push_bounded(
            &mut self.record.recent_categories,
            RECENT_CATEGORY_CAP,
            category,
        );
        self.record.current_category = Some(category);
        self.record.touch();
    }

    pub fn record_agent(&mut self, agent: AgentKind) {
        push_bounded(
            &mut self.agent_events,
            EVENT_RING_CAP,
            AgentEvent {
                agent,
                timestamp: Utc::now(),
            },
        );
        self.record.touch();
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.record.profile = Some(profile);
        self.record.touch();
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
        self.record.touch();
    }

    pub fn get_context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn mark_escalated(&mut self) {
        self.record.status = SessionStatus::Escalated;
        self.record.escalation_count += 1;
        self.record.touch();
    }

    pub fn mark_completed(&mut self) {
        self.record.status = SessionStatus::Completed;
        self.record.touch();
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageEntry> {
        self.messages.iter()
    }

    pub fn history_len(&self) -> usize {
        self.messages.len()
    }

    pub fn last_category(&self) -> Option<Category> {
        self.category_events.back().map(|e| e.category)
    }

    /// Last `n` presented categories, oldest first
    pub fn recent_categories(&self, n: usize) -> Vec<Category> {
        let skip = self.category_events.len().saturating_sub(n);
        self.category_events
            .iter()
            .skip(skip)
            .map(|e| e.category)
            .collect()
    }

    pub fn last_agent(&self) -> Option<AgentKind> {
        self.agent_events.back().map(|e| e.agent)
    }

    /// Last `n` selected agents, oldest first
    pub fn recent_agents(&self, n: usize) -> Vec<AgentKind> {
        let skip = self.agent_events.len().saturating_sub(n);
        self.agent_events.iter().skip(skip).map(|e| e.agent).collect()
    }

    pub fn export(&self, access_count: u64) -> SessionExport {
        SessionExport {
            record: self.record.clone(),
            messages: self.messages.iter().cloned().collect(),
            category_events: self.category_events.iter().cloned().collect(),
            agent_events: self.agent_events.iter().cloned().collect(),
            context: self.context.clone(),
            access_count,
        }
    }

    /// Rebuild a session from an export blob. Every collection goes through
    /// the bounded appends, so the capacity invariants hold even for
    /// oversized blobs; the record's scalar fields are restored afterwards.
    pub fn from_export(export: SessionExport, message_cap: usize) -> Self {
        let SessionExport {
            record,
            messages,
            category_events,
            agent_events,
            context,
            access_count: _,
        } = export;

        let mut state = SessionState::new(record.session_id.clone(), message_cap);
        for entry in messages {
            push_bounded(&mut state.messages, message_cap, entry);
        }
        for event in category_events {
            push_bounded(&mut state.category_events, EVENT_RING_CAP, event);
        }
        for event in agent_events {
            push_bounded(&mut state.agent_events, EVENT_RING_CAP, event);
        }
        state.context = context;
        state.record = SessionRecord {
            recent_categories: clamp_ring(record.recent_categories.clone(), RECENT_CATEGORY_CAP),
            ..record
        };
        state
    }
}

/// Serializable round-trip image of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionExport {
    pub record: SessionRecord,
    pub messages: Vec<MessageEntry>,
    pub category_events: Vec<CategoryEvent>,
    pub agent_events: Vec<AgentEvent>,
    pub context: HashMap<String, Value>,
    pub access_count: u64,
}
