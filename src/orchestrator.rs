//! Orchestrator
//!
//! The per-message state machine: loads session context, resolves the
//! follow-up override versus a fresh classification, validates sequence
//! legality, routes to an agent and persists the outcome. Any internal
//! failure is downgraded to a safe fallback bundle; this layer never
//! propagates an error to its caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::detection::{
    DetectionEngine, EscalationTarget, FinancingType, FollowUpSignals, ParsedDuration, Profile,
};
use crate::error::{OrchestrationError, Result};
use crate::memory::{MessageEntry, MessageRole, SessionExport, SessionStore, StoreStats};
use crate::taxonomy::{AgentKind, Category, Priority, Taxonomy};

const MIN_MESSAGE_CHARS: usize = 2;
const MAX_MESSAGE_CHARS: usize = 1000;

/// Session context key carrying the payment sub-context across turns
const PAYMENT_CONTEXT_KEY: &str = "payment_context";

/// Everything the transport returns for one classified message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationBundle {
    pub category: Category,
    pub agent: AgentKind,
    pub escalate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_type: Option<EscalationTarget>,
    pub priority: Priority,
    pub profile: Profile,
    pub financing_type: FinancingType,
    pub context_data: Value,
    pub processing_ms: f64,
}

/// Payment sub-context persisted for multi-turn payment flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentContext {
    pub financing_type: FinancingType,
    pub parsed_duration: ParsedDuration,
    pub total_days: u32,
    pub recorded_at: DateTime<Utc>,
}

pub struct Orchestrator {
    taxonomy: Arc<Taxonomy>,
    detection: DetectionEngine,
    store: Box<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        detection: DetectionEngine,
        store: Box<dyn SessionStore>,
    ) -> Self {
        Self {
            taxonomy,
            detection,
            store,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Input bounds, checked by the transport before `classify` is entered
    pub fn validate_message(message: &str) -> Result<()> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(OrchestrationError::InvalidMessage("empty message".into()));
        }
        if trimmed.chars().count() < MIN_MESSAGE_CHARS {
            return Err(OrchestrationError::InvalidMessage("message too short".into()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(OrchestrationError::InvalidMessage("message too long".into()));
        }
        Ok(())
    }

    /// Classify one message within its session. Always produces a bundle.
    pub async fn classify(&self, message: &str, session_id: &str) -> ClassificationBundle {
        let started = Instant::now();

        match self.run_pipeline(message, session_id).await {
            Ok(mut bundle) => {
                bundle.processing_ms = started.elapsed().as_secs_f64() * 1000.0;
                info!(
                    session_id,
                    category = %bundle.category,
                    agent = %bundle.agent,
                    escalate = bundle.escalate,
                    "message classified"
                );
                bundle
            }
            Err(error) => {
                warn!(session_id, %error, "classification failed, returning fallback");
                Self::fallback_bundle(started.elapsed())
            }
        }
    }

    async fn run_pipeline(&self, message: &str, session_id: &str) -> Result<ClassificationBundle> {
        // 1. Session context
        let snapshot = self.store.snapshot(session_id).await?;

        // 2. History
        self.store
            .append_message(session_id, MessageEntry::new(MessageRole::User, message))
            .await?;

        // 3. Follow-up override, otherwise primary detection
        let signals = FollowUpSignals {
            last_category: snapshot.last_category,
            recent_categories: &snapshot.recent_categories,
        };
        let mut category = match self.detection.detect_follow_up(message, &signals) {
            Some(category) => {
                info!(session_id, %category, "follow-up override");
                category
            }
            None => self.detection.detect_primary_category(message),
        };

        // 4. Sequence legality
        if let Some(previous) = snapshot.last_category {
            if !self.detection.validate_sequence(category, Some(previous)) {
                warn!(
                    session_id,
                    %category,
                    %previous,
                    "invalid category sequence, overriding to general"
                );
                category = Category::General;
            }
        }

        // 5. Agent routing
        let agent = self.taxonomy.agent_for(category);

        // 6. Classification bundle
        let profile = self.detection.detect_profile(message);
        let financing_type = self.detection.detect_financing_type(message);
        let mut context_data = serde_json::Map::new();

        let mut payment_total_days = None;
        if category == Category::PaymentTracking {
            let payment = self.payment_context(message, financing_type, &snapshot.context);
            payment_total_days = Some(payment.total_days);
            let payment = serde_json::to_value(&payment)?;
            self.store
                .set_context(session_id, PAYMENT_CONTEXT_KEY, payment.clone())
                .await?;
            context_data.insert(PAYMENT_CONTEXT_KEY.into(), payment);
        }

        let escalate = self.detection.should_escalate(category, payment_total_days);
        let escalation_type = escalate.then(|| self.detection.escalation_target(category));

        // 7. Persist the outcome
        self.store.record_category(session_id, category).await?;
        self.store.record_agent(session_id, agent).await?;
        if profile != Profile::Unknown {
            self.store.set_profile(session_id, profile).await?;
        }
        if escalate {
            self.store.mark_escalated(session_id).await?;
        }

        Ok(ClassificationBundle {
            category,
            agent,
            escalate,
            escalation_type,
            priority: self.taxonomy.tier(category),
            profile,
            financing_type,
            context_data: Value::Object(context_data),
            processing_ms: 0.0,
        })
    }

    /// Payment sub-context for the current turn. Prefers the duration parsed
    /// from this message; a message with no duration falls back to the
    /// context stored by an earlier turn.
    fn payment_context(
        &self,
        message: &str,
        financing_type: FinancingType,
        stored: &std::collections::HashMap<String, Value>,
    ) -> PaymentContext {
        let parsed = self.detection.extract_duration(message);

        if parsed.is_empty() {
            if let Some(previous) = stored
                .get(PAYMENT_CONTEXT_KEY)
                .and_then(|v| serde_json::from_value::<PaymentContext>(v.clone()).ok())
            {
                return previous;
            }
        }

        let total_days = DetectionEngine::duration_to_days(&parsed);
        PaymentContext {
            financing_type,
            parsed_duration: parsed,
            total_days,
            recorded_at: Utc::now(),
        }
    }

    fn fallback_bundle(elapsed: Duration) -> ClassificationBundle {
        ClassificationBundle {
            category: Category::General,
            agent: AgentKind::General,
            escalate: false,
            escalation_type: None,
            priority: Priority::Low,
            profile: Profile::Unknown,
            financing_type: FinancingType::Unknown,
            context_data: Value::Object(serde_json::Map::new()),
            processing_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    // =============================
    // Management Operations
    // =============================

    pub async fn sweep_inactive(&self, max_idle: Duration) -> Result<usize> {
        self.store.sweep_inactive(max_idle).await
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<bool> {
        self.store.clear_session(session_id).await
    }

    pub async fn export_session(&self, session_id: &str) -> Result<Option<SessionExport>> {
        self.store.export_session(session_id).await
    }

    /// Import a raw blob. A structurally invalid blob fails before any
    /// store mutation.
    pub async fn import_session(&self, session_id: &str, blob: Value) -> Result<bool> {
        let export: SessionExport = serde_json::from_value(blob)?;
        self.store.import_session(session_id, export).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemorySessionStore, SessionSnapshot, SessionStatus};
    use serde_json::json;

    fn orchestrator() -> Orchestrator {
        let taxonomy = Arc::new(Taxonomy::load().unwrap());
        let detection = DetectionEngine::new(Arc::clone(&taxonomy)).unwrap();
        Orchestrator::new(
            taxonomy,
            detection,
            Box::new(InMemorySessionStore::default()),
        )
    }

    #[tokio::test]
    async fn test_payment_scenario_at_threshold() {
        let orchestrator = orchestrator();
        let bundle = orchestrator
            .classify("Je n'ai pas été payé depuis 3 mois", "s1")
            .await;

        assert_eq!(bundle.category, Category::PaymentTracking);
        assert_eq!(bundle.agent, AgentKind::Payment);
        assert_eq!(bundle.priority, Priority::High);
        // 90 days is not strictly above the threshold
        assert!(!bundle.escalate);
        assert_eq!(
            bundle.context_data["payment_context"]["total_days"],
            json!(90)
        );
    }

    #[tokio::test]
    async fn test_payment_scenario_past_threshold_escalates() {
        let orchestrator = orchestrator();
        let bundle = orchestrator
            .classify("Je n'ai pas été payé depuis 4 mois", "s1")
            .await;

        assert_eq!(bundle.category, Category::PaymentTracking);
        assert!(bundle.escalate);
        assert_eq!(bundle.escalation_type, Some(EscalationTarget::General));
        assert_eq!(
            bundle.context_data["payment_context"]["total_days"],
            json!(120)
        );

        let export = orchestrator.export_session("s1").await.unwrap().unwrap();
        assert_eq!(export.record.status, SessionStatus::Escalated);
    }

    #[tokio::test]
    async fn test_aggressive_scenario() {
        let orchestrator = orchestrator();
        let bundle = orchestrator
            .classify("Vous êtes nuls, je suis énervé", "s1")
            .await;

        assert_eq!(bundle.category, Category::AggressiveBehavior);
        assert_eq!(bundle.agent, AgentKind::Quality);
        assert!(bundle.escalate);
        assert_eq!(bundle.escalation_type, Some(EscalationTarget::Quality));
        assert_eq!(bundle.priority, Priority::Critical);
    }

    #[tokio::test]
    async fn test_catalog_then_selection_follow_up() {
        let orchestrator = orchestrator();

        let first = orchestrator
            .classify("Quelles sont vos formations ?", "s1")
            .await;
        assert_eq!(first.category, Category::Catalog);
        assert_eq!(first.agent, AgentKind::Learner);

        let second = orchestrator
            .classify("Je prends la formation marketing, je la choisis", "s1")
            .await;
        assert_eq!(second.category, Category::PostSelection);
        assert_eq!(second.agent, AgentKind::Learner);
    }

    #[tokio::test]
    async fn test_payment_then_delay_follow_up() {
        let orchestrator = orchestrator();

        let first = orchestrator.classify("Je n'ai pas été payé", "s1").await;
        assert_eq!(first.category, Category::PaymentTracking);
        assert!(!first.escalate);

        let second = orchestrator
            .classify("ça fait très longtemps que j'attends", "s1")
            .await;
        assert_eq!(second.category, Category::DelayExceeded);
        assert_eq!(second.agent, AgentKind::Payment);
    }

    #[tokio::test]
    async fn test_invalid_sequence_overrides_to_general() {
        let orchestrator = orchestrator();

        let first = orchestrator.classify("Bonjour", "s1").await;
        assert_eq!(first.category, Category::General);

        // delay-exceeded requires payment-tracking as its predecessor
        let second = orchestrator.classify("Mon délai est dépassé", "s1").await;
        assert_eq!(second.category, Category::General);
        assert_eq!(second.agent, AgentKind::General);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let orchestrator = orchestrator();

        orchestrator
            .classify("Quelles sont vos formations ?", "s1")
            .await;
        // Same wording as the follow-up, but in a session that never saw
        // the catalog: the generic offers keywords win
        let other = orchestrator
            .classify("Je prends la formation marketing, je la choisis", "s2")
            .await;
        assert_eq!(other.category, Category::Offers);
    }

    #[tokio::test]
    async fn test_profile_is_persisted() {
        let orchestrator = orchestrator();
        let bundle = orchestrator
            .classify("Je veux devenir ambassadeur", "s1")
            .await;
        assert_eq!(bundle.profile, Profile::Ambassador);

        let export = orchestrator.export_session("s1").await.unwrap().unwrap();
        assert_eq!(export.record.profile, Some(Profile::Ambassador));
    }

    #[test]
    fn test_validate_message_bounds() {
        assert!(Orchestrator::validate_message("Bonjour").is_ok());
        assert!(Orchestrator::validate_message("").is_err());
        assert!(Orchestrator::validate_message("   ").is_err());
        assert!(Orchestrator::validate_message("a").is_err());
        assert!(Orchestrator::validate_message(&"x".repeat(1001)).is_err());
        assert!(Orchestrator::validate_message(&"x".repeat(1000)).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_import_fails_closed() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .import_session("s1", json!({"record": "not a record"}))
            .await;
        assert!(result.is_err());
        assert!(orchestrator.export_session("s1").await.unwrap().is_none());
    }

    // Store stub whose every operation fails, driving the fallback path
    struct FailingStore;

    #[async_trait::async_trait]
    impl SessionStore for FailingStore {
        async fn snapshot(&self, _: &str) -> Result<SessionSnapshot> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn append_message(&self, _: &str, _: MessageEntry) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn record_category(&self, _: &str, _: Category) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn record_agent(&self, _: &str, _: AgentKind) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn set_profile(&self, _: &str, _: Profile) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn set_context(&self, _: &str, _: &str, _: Value) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn get_context(&self, _: &str, _: &str) -> Result<Option<Value>> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn mark_escalated(&self, _: &str) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn mark_completed(&self, _: &str) -> Result<()> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn clear_session(&self, _: &str) -> Result<bool> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn sweep_inactive(&self, _: Duration) -> Result<usize> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn export_session(&self, _: &str) -> Result<Option<SessionExport>> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn import_session(&self, _: &str, _: SessionExport) -> Result<bool> {
            Err(OrchestrationError::StoreError("down".into()))
        }
        async fn stats(&self) -> Result<StoreStats> {
            Err(OrchestrationError::StoreError("down".into()))
        }
    }

    #[tokio::test]
    async fn test_internal_failure_degrades_to_fallback_bundle() {
        let taxonomy = Arc::new(Taxonomy::load().unwrap());
        let detection = DetectionEngine::new(Arc::clone(&taxonomy)).unwrap();
        let orchestrator = Orchestrator::new(taxonomy, detection, Box::new(FailingStore));

        let bundle = orchestrator
            .classify("Vous êtes nuls, je suis énervé", "s1")
            .await;

        assert_eq!(bundle.category, Category::General);
        assert_eq!(bundle.agent, AgentKind::General);
        assert!(!bundle.escalate);
        assert_eq!(bundle.priority, Priority::Low);
    }
}
