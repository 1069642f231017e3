use std::sync::Arc;

use support_agent_orchestrator::{
    detection::DetectionEngine,
    memory::InMemorySessionStore,
    orchestrator::Orchestrator,
    taxonomy::Taxonomy,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Support Agent Orchestrator demo starting");

    // Create components
    let taxonomy = Arc::new(Taxonomy::load()?);
    let detection = DetectionEngine::new(Arc::clone(&taxonomy))?;
    let store = Box::new(InMemorySessionStore::default());
    let orchestrator = Orchestrator::new(taxonomy, detection, store);

    // Canned conversations, one session per scenario
    let conversations: &[(&str, &[&str])] = &[
        (
            "payment-delay",
            &[
                "Bonjour, je n'ai pas été payé depuis 3 mois",
                "ça fait vraiment trop longtemps que j'attends",
            ],
        ),
        (
            "training-choice",
            &[
                "Quelles sont vos formations ?",
                "Je prends la formation marketing, je la choisis",
            ],
        ),
        (
            "blocked-funding",
            &["Mon dossier CPF est bloqué", "Oui, je suis déjà informé"],
        ),
        ("upset-user", &["Vous êtes nuls, je suis énervé"]),
        (
            "ambassador",
            &["Comment devenir ambassadeur ?", "Et combien ça rapporte ?"],
        ),
    ];

    for (session_id, messages) in conversations {
        info!("=== session {} ===", session_id);
        for message in *messages {
            let bundle = orchestrator.classify(message, session_id).await;
            info!(
                "\"{}\" -> category={} agent={} priority={} escalate={} ({:.2} ms)",
                message,
                bundle.category,
                bundle.agent,
                bundle.priority,
                bundle.escalate,
                bundle.processing_ms,
            );
        }
    }

    let stats = orchestrator.stats().await?;
    info!(
        "sessions={} messages={} escalated-and-active={}",
        stats.total_sessions, stats.total_messages, stats.current_active
    );

    Ok(())
}
