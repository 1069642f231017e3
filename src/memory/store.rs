//! Session store
//!
//! Bounded, time-expiring per-session storage behind a trait seam.
//! The index lives under an async `RwLock`; each session sits behind its own
//! mutex so mutation of one session is serialized while different sessions
//! proceed independently. Expired sessions are dropped on access or by the
//! sweep; inserting past the capacity evicts the least-recently-accessed
//! session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::detection::Profile;
use crate::error::Result;
use crate::memory::session::{
    MessageEntry, SessionExport, SessionRecord, SessionState, DEFAULT_MESSAGE_HISTORY_CAP,
    RECENT_CATEGORY_CAP,
};
use crate::taxonomy::{AgentKind, Category};

/// Default idle bound for the periodic sweep
pub const DEFAULT_SWEEP_MAX_IDLE: Duration = Duration::from_secs(1800);

/// Stats window for "recently active" sessions
const RECENT_WINDOW: Duration = Duration::from_secs(300);

/// How many recent agents a snapshot carries
const SNAPSHOT_AGENT_WINDOW: usize = 3;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Hard cap on concurrent sessions
    pub max_sessions: usize,
    /// Idle time after which a session expires on access
    pub session_ttl: Duration,
    /// Per-session message history bound
    pub message_history_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            session_ttl: Duration::from_secs(3600),
            message_history_cap: DEFAULT_MESSAGE_HISTORY_CAP,
        }
    }
}

/// Point-in-time view of one session, as the orchestrator consumes it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub record: SessionRecord,
    pub last_category: Option<Category>,
    /// Recently presented categories, oldest first
    pub recent_categories: Vec<Category>,
    pub last_agent: Option<AgentKind>,
    pub recent_agents: Vec<AgentKind>,
    pub context: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostAccessed {
    pub session_id: String,
    pub access_count: u64,
}

/// Aggregate store counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_sessions: usize,
    /// Sessions active within the last five minutes
    pub recent_sessions: usize,
    pub total_messages: usize,
    pub total_created: u64,
    pub total_cleared: u64,
    pub current_active: u64,
    pub most_accessed_session: Option<MostAccessed>,
}

/// Trait seam for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load (lazily creating) a session and return its full context
    async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot>;
    async fn append_message(&self, session_id: &str, entry: MessageEntry) -> Result<()>;
    async fn record_category(&self, session_id: &str, category: Category) -> Result<()>;
    async fn record_agent(&self, session_id: &str, agent: AgentKind) -> Result<()>;
    async fn set_profile(&self, session_id: &str, profile: Profile) -> Result<()>;
    async fn set_context(&self, session_id: &str, key: &str, value: Value) -> Result<()>;
    async fn get_context(&self, session_id: &str, key: &str) -> Result<Option<Value>>;
    async fn mark_escalated(&self, session_id: &str) -> Result<()>;
    async fn mark_completed(&self, session_id: &str) -> Result<()>;
    /// Remove a session and all its state; false when unknown
    async fn clear_session(&self, session_id: &str) -> Result<bool>;
    /// Remove every session idle longer than `max_idle`; returns the count
    async fn sweep_inactive(&self, max_idle: Duration) -> Result<usize>;
    async fn export_session(&self, session_id: &str) -> Result<Option<SessionExport>>;
    async fn import_session(&self, session_id: &str, export: SessionExport) -> Result<bool>;
    async fn stats(&self) -> Result<StoreStats>;
}

struct Entry {
    state: Mutex<SessionState>,
    /// Wall-clock of the last access, for TTL expiry and the sweep
    last_seen_ms: AtomicI64,
    /// Monotonic access ordinal, for LRU eviction
    touch_seq: AtomicU64,
    access_count: AtomicU64,
}

impl Entry {
    fn new(state: SessionState, now_ms: i64, seq: u64) -> Self {
        Self {
            state: Mutex::new(state),
            last_seen_ms: AtomicI64::new(now_ms),
            touch_seq: AtomicU64::new(seq),
            access_count: AtomicU64::new(0),
        }
    }

    fn touch(&self, now_ms: i64, seq: u64) {
        self.last_seen_ms.store(now_ms, Ordering::Relaxed);
        self.touch_seq.store(seq, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    fn idle_longer_than(&self, now_ms: i64, max_idle: Duration) -> bool {
        now_ms - self.last_seen_ms.load(Ordering::Relaxed) > max_idle.as_millis() as i64
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// In-memory store, the only backend in this process-local system
pub struct InMemorySessionStore {
    config: StoreConfig,
    sessions: RwLock<HashMap<String, Arc<Entry>>>,
    access_clock: AtomicU64,
    total_created: AtomicU64,
    total_cleared: AtomicU64,
}

impl InMemorySessionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            access_clock: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_cleared: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fetch a live entry, expiring and recreating as needed
    async fn entry(&self, session_id: &str) -> Arc<Entry> {
        let now = now_ms();

        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(session_id) {
                if !entry.idle_longer_than(now, self.config.session_ttl) {
                    entry.touch(now, self.next_seq());
                    return Arc::clone(entry);
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        // Re-check under the write lock; another task may have raced us here
        if let Some(entry) = sessions.get(session_id) {
            if !entry.idle_longer_than(now, self.config.session_ttl) {
                entry.touch(now, self.next_seq());
                return Arc::clone(entry);
            }
            sessions.remove(session_id);
            self.total_cleared.fetch_add(1, Ordering::Relaxed);
            info!(session_id, "session expired");
        }

        self.evict_for_capacity(&mut sessions);

        let entry = Arc::new(Entry::new(
            SessionState::new(session_id, self.config.message_history_cap),
            now,
            self.next_seq(),
        ));
        entry.access_count.fetch_add(1, Ordering::Relaxed);
        sessions.insert(session_id.to_string(), Arc::clone(&entry));
        self.total_created.fetch_add(1, Ordering::Relaxed);
        info!(session_id, "session created");
        entry
    }

    /// Drop the least-recently-accessed session when the cap is reached
    fn evict_for_capacity(&self, sessions: &mut HashMap<String, Arc<Entry>>) {
        while sessions.len() >= self.config.max_sessions {
            let lru = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touch_seq.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            match lru {
                Some(id) => {
                    sessions.remove(&id);
                    self.total_cleared.fetch_add(1, Ordering::Relaxed);
                    debug!(session_id = %id, "evicted least-recently-accessed session");
                }
                None => break,
            }
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        let entry = self.entry(session_id).await;
        let mut state = entry.state.lock().await;
        state.touch();

        Ok(SessionSnapshot {
            record: state.record().clone(),
            last_category: state.last_category(),
            recent_categories: state.recent_categories(RECENT_CATEGORY_CAP),
            last_agent: state.last_agent(),
            recent_agents: state.recent_agents(SNAPSHOT_AGENT_WINDOW),
            context: state.context().clone(),
        })
    }

    async fn append_message(&self, session_id: &str, entry: MessageEntry) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.append_message(entry);
        Ok(())
    }

    async fn record_category(&self, session_id: &str, category: Category) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.record_category(category);
        debug!(session_id, category = %category, "category recorded");
        Ok(())
    }

    async fn record_agent(&self, session_id: &str, agent: AgentKind) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.record_agent(agent);
        debug!(session_id, agent = %agent, "agent recorded");
        Ok(())
    }

    async fn set_profile(&self, session_id: &str, profile: Profile) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.set_profile(profile);
        Ok(())
    }

    async fn set_context(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.set_context(key, value);
        Ok(())
    }

    async fn get_context(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let session = self.entry(session_id).await;
        let state = session.state.lock().await;
        Ok(state.get_context(key).cloned())
    }

    async fn mark_escalated(&self, session_id: &str) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.mark_escalated();
        info!(session_id, "session escalated");
        Ok(())
    }

    async fn mark_completed(&self, session_id: &str) -> Result<()> {
        let session = self.entry(session_id).await;
        session.state.lock().await.mark_completed();
        info!(session_id, "session completed");
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<bool> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            self.total_cleared.fetch_add(1, Ordering::Relaxed);
            info!(session_id, "session cleared");
        }
        Ok(removed)
    }

    async fn sweep_inactive(&self, max_idle: Duration) -> Result<usize> {
        let now = now_ms();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.idle_longer_than(now, max_idle));
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            self.total_cleared.fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, "inactive sessions swept");
        }
        Ok(removed)
    }

    async fn export_session(&self, session_id: &str) -> Result<Option<SessionExport>> {
        let sessions = self.sessions.read().await;
        let Some(entry) = sessions.get(session_id) else {
            return Ok(None);
        };
        if entry.idle_longer_than(now_ms(), self.config.session_ttl) {
            return Ok(None);
        }
        let entry = Arc::clone(entry);
        drop(sessions);

        let state = entry.state.lock().await;
        Ok(Some(state.export(entry.access_count.load(Ordering::Relaxed))))
    }

    async fn import_session(&self, session_id: &str, mut export: SessionExport) -> Result<bool> {
        // Rebind to the id the caller addressed, whatever the blob says
        export.record.session_id = session_id.to_string();
        let access_count = export.access_count;
        let state = SessionState::from_export(export, self.config.message_history_cap);

        let now = now_ms();
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(session_id) {
            self.evict_for_capacity(&mut sessions);
            self.total_created.fetch_add(1, Ordering::Relaxed);
        }
        let entry = Arc::new(Entry::new(state, now, self.next_seq()));
        entry.access_count.store(access_count, Ordering::Relaxed);
        sessions.insert(session_id.to_string(), entry);
        info!(session_id, "session imported");
        Ok(true)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let now = now_ms();
        let sessions = self.sessions.read().await;

        let total_sessions = sessions.len();
        let recent_sessions = sessions
            .values()
            .filter(|entry| !entry.idle_longer_than(now, RECENT_WINDOW))
            .count();

        let mut total_messages = 0;
        for entry in sessions.values() {
            total_messages += entry.state.lock().await.history_len();
        }

        let most_accessed_session = sessions
            .iter()
            .max_by_key(|(_, entry)| entry.access_count.load(Ordering::Relaxed))
            .map(|(id, entry)| MostAccessed {
                session_id: id.clone(),
                access_count: entry.access_count.load(Ordering::Relaxed),
            });

        let total_created = self.total_created.load(Ordering::Relaxed);
        let total_cleared = self.total_cleared.load(Ordering::Relaxed);

        Ok(StoreStats {
            total_sessions,
            recent_sessions,
            total_messages,
            total_created,
            total_cleared,
            current_active: total_created.saturating_sub(total_cleared),
            most_accessed_session,
        })
    }
}
