//! Discourse category taxonomy
//!
//! The static catalog behind classification: categories, their keyword sets,
//! priority tiers, sequence constraints and the category -> agent table.
//! Built once at startup into plain lookup maps so the detection engine
//! stays data-driven.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};

/// Discourse categories recognized by the detection engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    // General
    General,
    HumanHandoff,
    // Ambassador
    AffiliationDiscovery,
    AffiliationExplainer,
    BecomeAmbassador,
    AmbassadorDefinition,
    AmbassadorProcess,
    // Learner
    Catalog,
    PostSelection,
    // Prospect
    Offers,
    CompanyProfessional,
    SalesAmbassador,
    // Payment
    PaymentTracking,
    TrainingPayment,
    DirectPayment,
    DelayExceeded,
    // Funding (CPF / OPCO)
    CpfQuestion,
    CpfBlocked,
    CpfFileBlocked,
    OpcoBlocked,
    AdminFileReview,
    EscalationFollowUp,
    TaxThresholds,
    NoSocialMedia,
    // Quality
    AggressiveBehavior,
    Legal,
    AdminEscalation,
    CommercialEscalation,
}

impl Category {
    /// Every category, in catalog order
    pub const ALL: [Category; 28] = [
        Category::General,
        Category::HumanHandoff,
        Category::AffiliationDiscovery,
        Category::AffiliationExplainer,
        Category::BecomeAmbassador,
        Category::AmbassadorDefinition,
        Category::AmbassadorProcess,
        Category::Catalog,
        Category::PostSelection,
        Category::Offers,
        Category::CompanyProfessional,
        Category::SalesAmbassador,
        Category::PaymentTracking,
        Category::TrainingPayment,
        Category::DirectPayment,
        Category::DelayExceeded,
        Category::CpfQuestion,
        Category::CpfBlocked,
        Category::CpfFileBlocked,
        Category::OpcoBlocked,
        Category::AdminFileReview,
        Category::EscalationFollowUp,
        Category::TaxThresholds,
        Category::NoSocialMedia,
        Category::AggressiveBehavior,
        Category::Legal,
        Category::AdminEscalation,
        Category::CommercialEscalation,
    ];

    /// Canonical id, matching the serde wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::HumanHandoff => "human-handoff",
            Category::AffiliationDiscovery => "affiliation-discovery",
            Category::AffiliationExplainer => "affiliation-explainer",
            Category::BecomeAmbassador => "become-ambassador",
            Category::AmbassadorDefinition => "ambassador-definition",
            Category::AmbassadorProcess => "ambassador-process",
            Category::Catalog => "catalog",
            Category::PostSelection => "post-selection",
            Category::Offers => "offers",
            Category::CompanyProfessional => "company-professional",
            Category::SalesAmbassador => "sales-ambassador",
            Category::PaymentTracking => "payment-tracking",
            Category::TrainingPayment => "training-payment",
            Category::DirectPayment => "direct-payment",
            Category::DelayExceeded => "delay-exceeded",
            Category::CpfQuestion => "cpf-question",
            Category::CpfBlocked => "cpf-blocked",
            Category::CpfFileBlocked => "cpf-file-blocked",
            Category::OpcoBlocked => "opco-blocked",
            Category::AdminFileReview => "admin-file-review",
            Category::EscalationFollowUp => "escalation-follow-up",
            Category::TaxThresholds => "tax-thresholds",
            Category::NoSocialMedia => "no-social-media",
            Category::AggressiveBehavior => "aggressive-behavior",
            Category::Legal => "legal",
            Category::AdminEscalation => "admin-escalation",
            Category::CommercialEscalation => "commercial-escalation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specialized handler classes a category routes to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    General,
    Ambassador,
    Learner,
    Prospect,
    Payment,
    CpfBlocked,
    Quality,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        AgentKind::General,
        AgentKind::Ambassador,
        AgentKind::Learner,
        AgentKind::Prospect,
        AgentKind::Payment,
        AgentKind::CpfBlocked,
        AgentKind::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::General => "general",
            AgentKind::Ambassador => "ambassador",
            AgentKind::Learner => "learner",
            AgentKind::Prospect => "prospect",
            AgentKind::Payment => "payment",
            AgentKind::CpfBlocked => "cpf_blocked",
            AgentKind::Quality => "quality",
        }
    }

    /// Human-readable scope of the agent, surfaced by the management API
    pub fn specialization(&self) -> &'static str {
        match self {
            AgentKind::General => "Welcome and general orientation",
            AgentKind::Ambassador => "Ambassador program and affiliation process",
            AgentKind::Learner => "Training catalog and enrollment process",
            AgentKind::Prospect => "Prospect qualification and commercial quotes",
            AgentKind::Payment => "Payment tracking, invoices and delays",
            AgentKind::CpfBlocked => "Unblocking CPF and OPCO funding files",
            AgentKind::Quality => "Quality control, escalations and conflict handling",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification precedence and response urgency
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================
// Static Catalog Data
// =============================

/// Keyword sets and descriptions per category. Keywords are matched as
/// case-insensitive substrings of the user message, so they stay in the
/// user base's language.
const CATEGORY_TABLE: &[(Category, &[&str], &str)] = &[
    (
        Category::PaymentTracking,
        &[
            "paiement", "payé", "payée", "payer", "argent", "facture", "débit", "prélèvement",
            "virement", "chèque", "carte bancaire", "cb", "mastercard", "visa", "pas été payé",
        ],
        "Payment and invoice tracking",
    ),
    (
        Category::AffiliationDiscovery,
        &[
            "affiliation", "affilié", "affiliée", "programme affiliation", "mail affiliation",
            "email affiliation", "courriel affiliation",
        ],
        "Affiliation program discovery",
    ),
    (
        Category::AffiliationExplainer,
        &[
            "c'est quoi un ambassadeur", "qu'est ce qu'un ambassadeur", "définition ambassadeur",
            "ambassadeur définition", "expliquer ambassadeur",
        ],
        "What the affiliation is",
    ),
    (
        Category::CpfQuestion,
        &[
            "cpf", "compte personnel formation", "formation cpf", "financement cpf",
            "droit formation", "mon compte formation",
        ],
        "Personal training account questions",
    ),
    (
        Category::BecomeAmbassador,
        &[
            "devenir ambassadeur", "comment devenir ambassadeur", "postuler ambassadeur",
            "candidature ambassadeur", "rejoindre ambassadeur",
        ],
        "Becoming an ambassador",
    ),
    (
        Category::AmbassadorDefinition,
        &[
            "c'est quoi un ambassadeur", "qu'est ce qu'un ambassadeur", "définition ambassadeur",
        ],
        "What an ambassador is",
    ),
    (
        Category::AmbassadorProcess,
        &[
            "processus ambassadeur", "étapes ambassadeur", "comment ça marche ambassadeur",
            "procédure ambassadeur",
        ],
        "Ambassador onboarding process",
    ),
    (
        Category::TrainingPayment,
        &["paiement formation", "payé formation", "facture formation", "débit formation"],
        "Training payment",
    ),
    (
        Category::CpfBlocked,
        &["cpf bloqué", "dossier bloqué", "blocage cpf", "problème cpf", "délai cpf"],
        "Blocked CPF funding",
    ),
    (
        Category::CpfFileBlocked,
        &["cpf dossier bloqué", "blocage dossier cpf", "problème dossier cpf"],
        "Blocked CPF file follow-through",
    ),
    (
        Category::OpcoBlocked,
        &["opco", "opérateur compétences", "délai opco", "blocage opco", "problème opco"],
        "Blocked OPCO funding",
    ),
    (
        Category::HumanHandoff,
        &[
            "parler humain", "contacter humain", "appeler", "téléphoner", "conseiller",
            "assistant", "aide humaine",
        ],
        "Talk to a human",
    ),
    (
        Category::Offers,
        &[
            "prospect", "devis", "tarif", "prix", "coût", "formation", "programme",
            "offre", "catalogue",
        ],
        "Understanding the offers",
    ),
    (
        Category::CompanyProfessional,
        &["entreprise", "société", "professionnel", "auto-entrepreneur", "salarié"],
        "Company and professional inquiries",
    ),
    (
        Category::SalesAmbassador,
        &["ambassadeur vendeur", "vendeur", "commercial", "vente"],
        "Selling ambassador",
    ),
    (
        Category::DirectPayment,
        &["paiement direct", "paiement immédiat", "payer maintenant"],
        "Direct payment",
    ),
    (
        Category::Catalog,
        &[
            "formations disponibles", "catalogue formation", "programmes formation",
            "spécialités", "domaines formation", "c'est quoi vos formations",
            "quelles sont vos formations",
        ],
        "Available trainings catalog",
    ),
    (
        Category::DelayExceeded,
        &["délai dépassé", "retard paiement", "paiement en retard", "délai expiré"],
        "Payment delay exceeded",
    ),
    (
        Category::PostSelection,
        &[
            "après choix", "formation choisie", "inscription", "confirmation", "intéressé par",
            "je voudrais", "je veux", "je choisis", "m'intéresse",
        ],
        "After a training is chosen",
    ),
    (
        Category::Legal,
        &["légal", "droit", "juridique", "avocat", "procédure", "recours"],
        "Legal matters",
    ),
    (
        Category::AggressiveBehavior,
        &[
            "agressif", "énervé", "fâché", "colère", "insulte", "grossier", "impoli",
            "nuls", "nul", "merde", "putain", "con", "connard", "salop", "salope",
            "incompétent", "incompétents", "inutile",
        ],
        "Aggressive behavior",
    ),
    (
        Category::General,
        &["bonjour", "salut", "hello", "qui êtes-vous", "présentation"],
        "General welcome",
    ),
    (
        Category::AdminFileReview,
        &["cpf dossier bloqué", "blocage administratif", "délai administratif"],
        "Blocked file under administrative review",
    ),
    (
        Category::EscalationFollowUp,
        &["relance", "suivi", "nouvelle", "après escalade"],
        "Follow-up after an escalation",
    ),
    (
        Category::TaxThresholds,
        &["seuils fiscaux", "micro-entreprise", "fiscal", "impôts"],
        "Tax threshold questions",
    ),
    (
        Category::NoSocialMedia,
        &["sans réseaux sociaux", "pas de réseaux", "pas instagram", "pas snapchat"],
        "Applicants without social media",
    ),
    (
        Category::AdminEscalation,
        &["escalade admin", "administrateur", "responsable", "manager"],
        "Administrative escalation",
    ),
    (
        Category::CommercialEscalation,
        &["escalade co", "commercial", "vendeur", "conseiller"],
        "Commercial escalation",
    ),
];

/// Priority tiers, scanned in declaration order during primary detection.
/// Catalog precedes Offers inside HIGH so catalog-style questions are not
/// swallowed by the generic "formation" keyword. Categories not listed here
/// are only reachable through follow-up rules and report LOW.
const PRIORITY_TIERS: &[(Priority, &[Category])] = &[
    (
        Priority::Critical,
        &[
            Category::AggressiveBehavior,
            Category::Legal,
            Category::CpfBlocked,
            Category::OpcoBlocked,
        ],
    ),
    (
        Priority::High,
        &[
            Category::PaymentTracking,
            Category::CpfQuestion,
            Category::BecomeAmbassador,
            Category::AmbassadorDefinition,
            Category::HumanHandoff,
            Category::Catalog,
            Category::Offers,
        ],
    ),
    (
        Priority::Medium,
        &[
            Category::AffiliationDiscovery,
            Category::AffiliationExplainer,
            Category::AmbassadorProcess,
            Category::TrainingPayment,
            Category::DirectPayment,
            Category::DelayExceeded,
            Category::PostSelection,
        ],
    ),
    (
        Priority::Low,
        &[
            Category::General,
            Category::CompanyProfessional,
            Category::SalesAmbassador,
        ],
    ),
];

/// Category -> agent routing table, grouped by agent
const AGENT_TABLE: &[(AgentKind, &[Category])] = &[
    (
        AgentKind::General,
        &[Category::General, Category::HumanHandoff],
    ),
    (
        AgentKind::Ambassador,
        &[
            Category::AffiliationDiscovery,
            Category::AffiliationExplainer,
            Category::BecomeAmbassador,
            Category::AmbassadorDefinition,
            Category::AmbassadorProcess,
        ],
    ),
    (
        AgentKind::Learner,
        &[Category::Catalog, Category::PostSelection],
    ),
    (
        AgentKind::Prospect,
        &[
            Category::Offers,
            Category::CompanyProfessional,
            Category::SalesAmbassador,
        ],
    ),
    (
        AgentKind::Payment,
        &[
            Category::PaymentTracking,
            Category::TrainingPayment,
            Category::DirectPayment,
            Category::DelayExceeded,
        ],
    ),
    (
        AgentKind::CpfBlocked,
        &[
            Category::CpfQuestion,
            Category::CpfBlocked,
            Category::CpfFileBlocked,
            Category::OpcoBlocked,
            Category::AdminFileReview,
            Category::EscalationFollowUp,
            Category::TaxThresholds,
            Category::NoSocialMedia,
        ],
    ),
    (
        AgentKind::Quality,
        &[
            Category::AggressiveBehavior,
            Category::Legal,
            Category::AdminEscalation,
            Category::CommercialEscalation,
        ],
    ),
];

/// Sequence constraints: key category is only legal after one of the listed
/// predecessors
const PREDECESSOR_TABLE: &[(Category, &[Category])] = &[
    (
        Category::CpfFileBlocked,
        &[Category::CpfBlocked, Category::OpcoBlocked],
    ),
    (
        Category::AmbassadorProcess,
        &[Category::BecomeAmbassador, Category::AmbassadorDefinition],
    ),
    (Category::PostSelection, &[Category::Catalog]),
    (Category::DelayExceeded, &[Category::PaymentTracking]),
];

// =============================
// Taxonomy
// =============================

/// Immutable catalog built once at startup
pub struct Taxonomy {
    specs: HashMap<Category, (&'static [&'static str], &'static str)>,
    tiers: HashMap<Category, Priority>,
    priority_order: Vec<Category>,
    agents: HashMap<Category, AgentKind>,
    predecessors: HashMap<Category, &'static [Category]>,
}

impl Taxonomy {
    /// Build the lookup maps and run the load-time consistency checks
    pub fn load() -> Result<Self> {
        let mut specs = HashMap::new();
        for (category, keywords, description) in CATEGORY_TABLE {
            specs.insert(*category, (*keywords, *description));
        }

        let mut tiers = HashMap::new();
        let mut priority_order = Vec::new();
        for (priority, categories) in PRIORITY_TIERS {
            for category in *categories {
                tiers.entry(*category).or_insert(*priority);
                priority_order.push(*category);
            }
        }

        let mut agents = HashMap::new();
        for (agent, categories) in AGENT_TABLE {
            for category in *categories {
                agents.insert(*category, *agent);
            }
        }

        let mut predecessors = HashMap::new();
        for (category, allowed) in PREDECESSOR_TABLE {
            predecessors.insert(*category, *allowed);
        }

        let taxonomy = Self {
            specs,
            tiers,
            priority_order,
            agents,
            predecessors,
        };
        taxonomy.verify()?;
        Ok(taxonomy)
    }

    fn verify(&self) -> Result<()> {
        for (priority, categories) in PRIORITY_TIERS {
            if categories.is_empty() {
                return Err(OrchestrationError::TaxonomyError(format!(
                    "priority tier {} is empty",
                    priority
                )));
            }
        }

        let critical = [
            Category::AggressiveBehavior,
            Category::Legal,
            Category::CpfBlocked,
            Category::OpcoBlocked,
        ];
        for category in critical {
            if self.tiers.get(&category) != Some(&Priority::Critical) {
                return Err(OrchestrationError::TaxonomyError(format!(
                    "category {} must be in the CRITICAL tier",
                    category
                )));
            }
        }

        for category in Category::ALL {
            let (keywords, _) = self.specs.get(&category).ok_or_else(|| {
                OrchestrationError::TaxonomyError(format!("category {} has no catalog entry", category))
            })?;
            if keywords.is_empty() {
                return Err(OrchestrationError::TaxonomyError(format!(
                    "category {} has an empty keyword set",
                    category
                )));
            }
            if !self.agents.contains_key(&category) {
                return Err(OrchestrationError::TaxonomyError(format!(
                    "category {} is not routed to an agent",
                    category
                )));
            }
        }

        Ok(())
    }

    /// Keyword set for a category
    pub fn keywords(&self, category: Category) -> &'static [&'static str] {
        self.specs.get(&category).map(|(kw, _)| *kw).unwrap_or(&[])
    }

    pub fn description(&self, category: Category) -> &'static str {
        self.specs
            .get(&category)
            .map(|(_, desc)| *desc)
            .unwrap_or("")
    }

    /// Priority tier of a category; follow-up-only categories report LOW
    pub fn tier(&self, category: Category) -> Priority {
        self.tiers.get(&category).copied().unwrap_or(Priority::Low)
    }

    /// Flattened CRITICAL > HIGH > MEDIUM > LOW scan order
    pub fn priority_order(&self) -> &[Category] {
        &self.priority_order
    }

    /// Total category -> agent mapping
    pub fn agent_for(&self, category: Category) -> AgentKind {
        self.agents
            .get(&category)
            .copied()
            .unwrap_or(AgentKind::General)
    }

    /// Allowed predecessors for a sequence-constrained category
    pub fn allowed_predecessors(&self, category: Category) -> Option<&'static [Category]> {
        self.predecessors.get(&category).copied()
    }
}
