//! Detection engine
//!
//! Pure keyword and pattern matching over a message plus session signals:
//! primary/follow-up category, aggressiveness, profile, financing type,
//! duration extraction and the escalation decision. Stateless apart from the
//! patterns compiled at construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::taxonomy::{Category, Taxonomy};

/// Payment delays strictly above this many days escalate
pub const PAYMENT_DELAY_THRESHOLD_DAYS: u32 = 90;

/// How many recently presented categories the follow-up rules look back over
const FOLLOW_UP_WINDOW: usize = 3;

// =============================
// Indicator keyword lists
//
// First match wins in the declared precedence order; the sets are not
// mutually exclusive.
// =============================

const AMBASSADOR_INDICATORS: &[&str] =
    &["ambassadeur", "affiliation", "commission", "programme affiliation"];

const LEARNER_INDICATORS: &[&str] =
    &["formation", "apprenant", "étudiant", "cours", "apprentissage"];

const PROSPECT_INDICATORS: &[&str] = &["devis", "tarif", "prix", "coût", "prospect", "nouveau"];

const CPF_INDICATORS: &[&str] = &["cpf", "compte personnel formation"];

const OPCO_INDICATORS: &[&str] = &["opco", "opérateur compétences"];

const DIRECT_INDICATORS: &[&str] = &["direct", "immédiat", "maintenant"];

/// Phrases expressing interest in a specific training
const INTEREST_INDICATORS: &[&str] = &[
    "intéressé par", "je choisis", "je veux", "m'intéresse", "ça m'intéresse",
    "je prends", "je sélectionne", "je souhaite", "je voudrais",
];

/// Training domains the catalog covers
const DOMAIN_KEYWORDS: &[&str] = &[
    "comptabilité", "marketing", "langues", "web", "3d", "vente", "développement",
    "bureautique", "informatique", "écologie", "bilan", "anglais", "français",
    "espagnol", "allemand", "italien",
];

/// Clarifying questions after an ambassador introduction
const CLARIFYING_TOKENS: &[&str] = &["comment", "quand", "où", "combien"];

/// References to elapsed time after a payment inquiry
const DURATION_REFERENCE_TOKENS: &[&str] = &["depuis", "ça fait", "délai", "attendre"];

/// Answers to a blocked-funding filtering question
const ACKNOWLEDGEMENT_TOKENS: &[&str] = &["oui", "non", "bloqué", "informé"];

// =============================
// Derived per-message types
// =============================

/// User profile derived from indicator keywords
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Ambassador,
    LearnerInfluencer,
    Prospect,
    Unknown,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Ambassador => "ambassador",
            Profile::LearnerInfluencer => "learner_influencer",
            Profile::Prospect => "prospect",
            Profile::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Funding channel referenced by the user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinancingType {
    Direct,
    Opco,
    Cpf,
    Unknown,
}

impl FinancingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinancingType::Direct => "direct",
            FinancingType::Opco => "opco",
            FinancingType::Cpf => "cpf",
            FinancingType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FinancingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units recognized by the duration extractor
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    const ALL: [DurationUnit; 4] = [
        DurationUnit::Days,
        DurationUnit::Weeks,
        DurationUnit::Months,
        DurationUnit::Years,
    ];

    fn pattern(&self) -> &'static str {
        match self {
            DurationUnit::Days => r"(\d+)\s*jour",
            DurationUnit::Weeks => r"(\d+)\s*semaine",
            DurationUnit::Months => r"(\d+)\s*mois",
            DurationUnit::Years => r"(\d+)\s*année",
        }
    }

    /// Fixed, non-calendar-exact day equivalent
    fn in_days(&self) -> u32 {
        match self {
            DurationUnit::Days => 1,
            DurationUnit::Weeks => 7,
            DurationUnit::Months => 30,
            DurationUnit::Years => 365,
        }
    }
}

/// Matched unit -> count pairs extracted from a message
pub type ParsedDuration = BTreeMap<DurationUnit, u32>;

/// Where an escalated conversation is handed off
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    Admin,
    Commercial,
    Quality,
    CpfSpecialist,
    General,
}

impl EscalationTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTarget::Admin => "admin",
            EscalationTarget::Commercial => "commercial",
            EscalationTarget::Quality => "quality",
            EscalationTarget::CpfSpecialist => "cpf_specialist",
            EscalationTarget::General => "general",
        }
    }
}

impl fmt::Display for EscalationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session signals the follow-up rules read.
/// `recent_categories` is ordered oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowUpSignals<'a> {
    pub last_category: Option<Category>,
    pub recent_categories: &'a [Category],
}

/// Check whether any keyword appears as a substring of the lowercased message
fn contains_any(message_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| message_lower.contains(kw))
}

// =============================
// Detection engine
// =============================

pub struct DetectionEngine {
    taxonomy: Arc<Taxonomy>,
    duration_patterns: Vec<(DurationUnit, Regex)>,
}

impl DetectionEngine {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Result<Self> {
        let mut duration_patterns = Vec::with_capacity(DurationUnit::ALL.len());
        for unit in DurationUnit::ALL {
            duration_patterns.push((unit, Regex::new(unit.pattern())?));
        }

        Ok(Self {
            taxonomy,
            duration_patterns,
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Highest priority signal; overrides every other classification
    pub fn is_aggressive(&self, message: &str) -> bool {
        let message_lower = message.to_lowercase();
        contains_any(
            &message_lower,
            self.taxonomy.keywords(Category::AggressiveBehavior),
        )
    }

    /// Scan the flattened priority order and return the first keyword match,
    /// falling back to the general category
    pub fn detect_primary_category(&self, message: &str) -> Category {
        if self.is_aggressive(message) {
            debug!("aggressive behavior detected");
            return Category::AggressiveBehavior;
        }

        let message_lower = message.to_lowercase();
        for category in self.taxonomy.priority_order() {
            if contains_any(&message_lower, self.taxonomy.keywords(*category)) {
                debug!(category = %category, "primary category detected");
                return *category;
            }
        }

        debug!("no category matched, falling back to general");
        Category::General
    }

    /// Context-dependent override, evaluated before primary detection.
    /// Rules fire in a fixed order; the first hit wins.
    pub fn detect_follow_up(&self, message: &str, signals: &FollowUpSignals<'_>) -> Option<Category> {
        let message_lower = message.to_lowercase();

        if self.is_aggressive(message) {
            return Some(Category::AggressiveBehavior);
        }

        // A training was presented and the user picks one
        if self.detect_formation_interest(&message_lower, signals.recent_categories) {
            return Some(Category::PostSelection);
        }

        // Clarifying question right after an ambassador introduction
        if matches!(
            signals.last_category,
            Some(Category::BecomeAmbassador) | Some(Category::AmbassadorDefinition)
        ) && contains_any(&message_lower, CLARIFYING_TOKENS)
        {
            return Some(Category::AmbassadorProcess);
        }

        // Elapsed-time details after a payment inquiry
        if signals.last_category == Some(Category::PaymentTracking)
            && contains_any(&message_lower, DURATION_REFERENCE_TOKENS)
        {
            return Some(Category::DelayExceeded);
        }

        // Answer to a blocked-funding filtering question
        if matches!(
            signals.last_category,
            Some(Category::CpfBlocked) | Some(Category::OpcoBlocked)
        ) && contains_any(&message_lower, ACKNOWLEDGEMENT_TOKENS)
        {
            return Some(Category::CpfFileBlocked);
        }

        None
    }

    /// Interest phrase + training domain, with the catalog recently presented
    fn detect_formation_interest(&self, message_lower: &str, recent: &[Category]) -> bool {
        let has_interest = contains_any(message_lower, INTEREST_INDICATORS);
        let has_domain = contains_any(message_lower, DOMAIN_KEYWORDS);
        let catalog_recently_shown = recent
            .iter()
            .rev()
            .take(FOLLOW_UP_WINDOW)
            .any(|c| *c == Category::Catalog);

        has_interest && has_domain && catalog_recently_shown
    }

    /// Indicator scan, precedence ambassador > learner > prospect
    pub fn detect_profile(&self, message: &str) -> Profile {
        let message_lower = message.to_lowercase();

        if contains_any(&message_lower, AMBASSADOR_INDICATORS) {
            Profile::Ambassador
        } else if contains_any(&message_lower, LEARNER_INDICATORS) {
            Profile::LearnerInfluencer
        } else if contains_any(&message_lower, PROSPECT_INDICATORS) {
            Profile::Prospect
        } else {
            Profile::Unknown
        }
    }

    /// Indicator scan, precedence cpf > opco > direct
    pub fn detect_financing_type(&self, message: &str) -> FinancingType {
        let message_lower = message.to_lowercase();

        if contains_any(&message_lower, CPF_INDICATORS) {
            FinancingType::Cpf
        } else if contains_any(&message_lower, OPCO_INDICATORS) {
            FinancingType::Opco
        } else if contains_any(&message_lower, DIRECT_INDICATORS) {
            FinancingType::Direct
        } else {
            FinancingType::Unknown
        }
    }

    /// Match numeric-plus-unit patterns; a message may carry several units
    pub fn extract_duration(&self, message: &str) -> ParsedDuration {
        let message_lower = message.to_lowercase();
        let mut parsed = ParsedDuration::new();

        for (unit, pattern) in &self.duration_patterns {
            if let Some(caps) = pattern.captures(&message_lower) {
                if let Some(count) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                    parsed.insert(*unit, count);
                }
            }
        }

        parsed
    }

    /// Fixed 7/30/365 conversion, not calendar-exact
    pub fn duration_to_days(parsed: &ParsedDuration) -> u32 {
        parsed
            .iter()
            .map(|(unit, count)| unit.in_days() * count)
            .sum()
    }

    /// Escalation decision. `payment_total_days` is the delay computed for
    /// the current turn when the category is payment tracking.
    pub fn should_escalate(&self, category: Category, payment_total_days: Option<u32>) -> bool {
        match category {
            Category::AggressiveBehavior
            | Category::Legal
            | Category::CpfBlocked
            | Category::OpcoBlocked => true,
            Category::PaymentTracking => {
                payment_total_days.map_or(false, |days| days > PAYMENT_DELAY_THRESHOLD_DAYS)
            }
            Category::AdminEscalation | Category::CommercialEscalation => true,
            _ => false,
        }
    }

    pub fn escalation_target(&self, category: Category) -> EscalationTarget {
        match category {
            Category::AdminEscalation => EscalationTarget::Admin,
            Category::CommercialEscalation => EscalationTarget::Commercial,
            Category::AggressiveBehavior => EscalationTarget::Quality,
            Category::CpfBlocked | Category::OpcoBlocked => EscalationTarget::CpfSpecialist,
            _ => EscalationTarget::General,
        }
    }

    /// Sequence legality: constrained categories must follow one of their
    /// declared predecessors; everything else is always valid
    pub fn validate_sequence(&self, current: Category, previous: Option<Category>) -> bool {
        match (self.taxonomy.allowed_predecessors(current), previous) {
            (Some(allowed), Some(prev)) => allowed.contains(&prev),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DetectionEngine {
        let taxonomy = Arc::new(Taxonomy::load().unwrap());
        DetectionEngine::new(taxonomy).unwrap()
    }

    #[test]
    fn test_aggressive_detection() {
        let engine = engine();
        for message in [
            "Vous êtes nuls",
            "Je suis énervé",
            "C'est de la merde",
            "Vous êtes incompétents",
        ] {
            assert!(engine.is_aggressive(message), "not flagged: {}", message);
        }

        for message in ["Bonjour, j'ai une question", "Merci pour votre aide"] {
            assert!(!engine.is_aggressive(message), "wrongly flagged: {}", message);
        }
    }

    #[test]
    fn test_aggressive_overrides_other_keywords() {
        let engine = engine();
        // Payment keywords are present but the insult wins
        let category = engine.detect_primary_category("Je n'ai pas été payé, vous êtes nuls");
        assert_eq!(category, Category::AggressiveBehavior);
    }

    #[test]
    fn test_critical_beats_low_tier() {
        let engine = engine();
        // "bonjour" is a LOW-tier keyword, "avocat" a CRITICAL-tier one
        let category = engine.detect_primary_category("Bonjour, je vais prendre un avocat");
        assert_eq!(category, Category::Legal);
    }

    #[test]
    fn test_primary_detection() {
        let engine = engine();
        assert_eq!(
            engine.detect_primary_category("Je n'ai pas été payé depuis 3 mois"),
            Category::PaymentTracking
        );
        assert_eq!(
            engine.detect_primary_category("Quelles sont vos formations ?"),
            Category::Catalog
        );
        assert_eq!(
            engine.detect_primary_category("Je voudrais un devis"),
            Category::Offers
        );
        assert_eq!(engine.detect_primary_category("ok merci"), Category::General);
    }

    #[test]
    fn test_profile_precedence() {
        let engine = engine();
        assert_eq!(
            engine.detect_profile("Je veux devenir ambassadeur"),
            Profile::Ambassador
        );
        assert_eq!(
            engine.detect_profile("Parlez-moi de vos cours"),
            Profile::LearnerInfluencer
        );
        assert_eq!(engine.detect_profile("Quel est le tarif ?"), Profile::Prospect);
        // Ambassador wins over learner when both indicator sets match
        assert_eq!(
            engine.detect_profile("Une formation pour ambassadeur"),
            Profile::Ambassador
        );
        assert_eq!(engine.detect_profile("Bonne journée"), Profile::Unknown);
    }

    #[test]
    fn test_financing_precedence() {
        let engine = engine();
        assert_eq!(
            engine.detect_financing_type("Je veux utiliser mon CPF"),
            FinancingType::Cpf
        );
        assert_eq!(
            engine.detect_financing_type("Mon OPCO peut-il financer ?"),
            FinancingType::Opco
        );
        assert_eq!(
            engine.detect_financing_type("Je veux payer maintenant"),
            FinancingType::Direct
        );
        // CPF wins when both cpf and direct indicators are present
        assert_eq!(
            engine.detect_financing_type("Payer maintenant avec mon cpf"),
            FinancingType::Cpf
        );
        assert_eq!(
            engine.detect_financing_type("Bonne journée"),
            FinancingType::Unknown
        );
    }

    #[test]
    fn test_duration_extraction() {
        let engine = engine();

        let parsed = engine.extract_duration("ça fait 2 mois et 3 jours que j'attends");
        assert_eq!(parsed.get(&DurationUnit::Months), Some(&2));
        assert_eq!(parsed.get(&DurationUnit::Days), Some(&3));
        assert_eq!(DetectionEngine::duration_to_days(&parsed), 63);

        let parsed = engine.extract_duration("depuis 1 semaine");
        assert_eq!(DetectionEngine::duration_to_days(&parsed), 7);

        let parsed = engine.extract_duration("depuis 2 années");
        assert_eq!(DetectionEngine::duration_to_days(&parsed), 730);

        let parsed = engine.extract_duration("aucune durée ici");
        assert!(parsed.is_empty());
        assert_eq!(DetectionEngine::duration_to_days(&parsed), 0);
    }

    #[test]
    fn test_payment_delay_threshold_is_strict() {
        let engine = engine();

        // 3 months = 90 days: not strictly above the threshold
        let parsed = engine.extract_duration("payé depuis 3 mois");
        let days = DetectionEngine::duration_to_days(&parsed);
        assert_eq!(days, 90);
        assert!(!engine.should_escalate(Category::PaymentTracking, Some(days)));

        // 4 months = 120 days: escalates
        let parsed = engine.extract_duration("depuis 4 mois");
        let days = DetectionEngine::duration_to_days(&parsed);
        assert_eq!(days, 120);
        assert!(engine.should_escalate(Category::PaymentTracking, Some(days)));

        assert!(!engine.should_escalate(Category::PaymentTracking, None));
    }

    #[test]
    fn test_escalation_categories() {
        let engine = engine();
        assert!(engine.should_escalate(Category::AggressiveBehavior, None));
        assert!(engine.should_escalate(Category::Legal, None));
        assert!(engine.should_escalate(Category::CpfBlocked, None));
        assert!(engine.should_escalate(Category::OpcoBlocked, None));
        assert!(engine.should_escalate(Category::AdminEscalation, None));
        assert!(engine.should_escalate(Category::CommercialEscalation, None));
        assert!(!engine.should_escalate(Category::Catalog, None));
    }

    #[test]
    fn test_escalation_targets() {
        let engine = engine();
        assert_eq!(
            engine.escalation_target(Category::AdminEscalation),
            EscalationTarget::Admin
        );
        assert_eq!(
            engine.escalation_target(Category::CommercialEscalation),
            EscalationTarget::Commercial
        );
        assert_eq!(
            engine.escalation_target(Category::AggressiveBehavior),
            EscalationTarget::Quality
        );
        assert_eq!(
            engine.escalation_target(Category::CpfBlocked),
            EscalationTarget::CpfSpecialist
        );
        assert_eq!(
            engine.escalation_target(Category::Legal),
            EscalationTarget::General
        );
    }

    #[test]
    fn test_follow_up_formation_interest() {
        let engine = engine();
        let recent = [Category::Catalog];
        let signals = FollowUpSignals {
            last_category: Some(Category::Catalog),
            recent_categories: &recent,
        };

        assert_eq!(
            engine.detect_follow_up("Je prends la formation marketing, je la choisis", &signals),
            Some(Category::PostSelection)
        );

        // Same message without the catalog presented recently
        let signals = FollowUpSignals::default();
        assert_eq!(
            engine.detect_follow_up("Je prends la formation marketing, je la choisis", &signals),
            None
        );
    }

    #[test]
    fn test_follow_up_window_is_three() {
        let engine = engine();
        // Catalog was shown four turns ago, outside the look-back window
        let recent = [
            Category::Catalog,
            Category::General,
            Category::Offers,
            Category::General,
        ];
        let signals = FollowUpSignals {
            last_category: Some(Category::General),
            recent_categories: &recent,
        };
        assert_eq!(
            engine.detect_follow_up("Je prends la formation marketing", &signals),
            None
        );
    }

    #[test]
    fn test_follow_up_ambassador_clarification() {
        let engine = engine();
        let recent = [Category::BecomeAmbassador];
        let signals = FollowUpSignals {
            last_category: Some(Category::BecomeAmbassador),
            recent_categories: &recent,
        };
        assert_eq!(
            engine.detect_follow_up("Et quand est-ce que ça démarre ?", &signals),
            Some(Category::AmbassadorProcess)
        );
    }

    #[test]
    fn test_follow_up_payment_delay() {
        let engine = engine();
        let recent = [Category::PaymentTracking];
        let signals = FollowUpSignals {
            last_category: Some(Category::PaymentTracking),
            recent_categories: &recent,
        };
        assert_eq!(
            engine.detect_follow_up("ça fait longtemps que j'attends", &signals),
            Some(Category::DelayExceeded)
        );
    }

    #[test]
    fn test_follow_up_blocked_funding_answer() {
        let engine = engine();
        for last in [Category::CpfBlocked, Category::OpcoBlocked] {
            let recent = [last];
            let signals = FollowUpSignals {
                last_category: Some(last),
                recent_categories: &recent,
            };
            assert_eq!(
                engine.detect_follow_up("Oui, je suis au courant", &signals),
                Some(Category::CpfFileBlocked)
            );
        }
    }

    #[test]
    fn test_follow_up_none_without_context() {
        let engine = engine();
        let signals = FollowUpSignals::default();
        assert_eq!(
            engine.detect_follow_up("Bonjour, une question", &signals),
            None
        );
    }

    #[test]
    fn test_validate_sequence() {
        let engine = engine();

        assert!(engine.validate_sequence(Category::PostSelection, Some(Category::Catalog)));
        assert!(!engine.validate_sequence(Category::PostSelection, Some(Category::Offers)));
        assert!(engine.validate_sequence(Category::DelayExceeded, Some(Category::PaymentTracking)));
        assert!(!engine.validate_sequence(Category::DelayExceeded, Some(Category::General)));
        assert!(engine.validate_sequence(
            Category::CpfFileBlocked,
            Some(Category::OpcoBlocked)
        ));
        assert!(engine.validate_sequence(
            Category::AmbassadorProcess,
            Some(Category::AmbassadorDefinition)
        ));

        // Unconstrained categories are always valid
        assert!(engine.validate_sequence(Category::General, Some(Category::Legal)));
        // No previous category: nothing to violate
        assert!(engine.validate_sequence(Category::PostSelection, None));
    }
}
