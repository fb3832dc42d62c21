use soul_brain::{
    agent::{Collaborators, CompanionSession},
    anthropic::AnthropicClient,
    config::SoulConfig,
    conversational::{ClaudeQuickResponder, OfflineResponder, QuickResponder},
    memory::{
        InMemoryConversationLog, InMemoryPreferenceStore, InMemoryResidents, PgPreferenceStore,
        PreferenceStore, StaticFacility,
    },
    planner::{ClaudePlanner, PlanningResponder},
    tools::{ConsoleVoice, FallbackSpeaker, PolicyActuator, SpeechProvider},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type Tiers = (Arc<dyn QuickResponder>, Arc<dyn PlanningResponder>);

fn build_tiers(config: &SoulConfig) -> Tiers {
    match AnthropicClient::connect(config) {
        Ok(client) => {
            let client = Arc::new(client);
            info!(
                quick = %config.quick_model,
                planning = %config.planning_model,
                "Model tiers connected"
            );
            let quick: Arc<dyn QuickResponder> =
                Arc::new(ClaudeQuickResponder::new(client.clone(), config));
            let planner: Arc<dyn PlanningResponder> = Arc::new(ClaudePlanner::new(client, config));
            (quick, planner)
        }
        Err(e) => {
            warn!("{}; running offline (emergencies and plan fallbacks only)", e);
            let offline = Arc::new(OfflineResponder::new(e.to_string()));
            let quick: Arc<dyn QuickResponder> = offline.clone();
            let planner: Arc<dyn PlanningResponder> = offline;
            (quick, planner)
        }
    }
}

fn build_preferences(config: &SoulConfig) -> Arc<dyn PreferenceStore> {
    if let Some(url) = &config.database_url {
        match PgPreferenceStore::connect_lazy(url) {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!("Falling back to in-memory preferences: {}", e),
        }
    }
    info!("Preference store backend: in-memory");
    Arc::new(InMemoryPreferenceStore::new())
}

async fn load_residents(
    config: &SoulConfig,
    preferences: Arc<dyn PreferenceStore>,
) -> Result<InMemoryResidents, Box<dyn std::error::Error>> {
    let residents = InMemoryResidents::new().with_preferences(preferences);
    if let Some(path) = &config.residents_file {
        let json = tokio::fs::read_to_string(path).await?;
        let added = residents.load_json(&json).await?;
        info!(path = %path, residents = added, "Residents loaded");
    }
    Ok(residents)
}

async fn load_facility(config: &SoulConfig) -> Result<StaticFacility, Box<dyn std::error::Error>> {
    match &config.facility_file {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            let facility = StaticFacility::from_json(&json)?;
            info!(path = %path, "Facility map loaded");
            Ok(facility)
        }
        None => Ok(StaticFacility::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SoulConfig::from_env();
    info!(robot = %config.robot_name, facility = %config.facility_name, "Soul starting");

    let (quick, planner) = build_tiers(&config);
    let preferences = build_preferences(&config);
    let residents = Arc::new(load_residents(&config, preferences.clone()).await?);
    let facility = Arc::new(load_facility(&config).await?);
    let actuator = Arc::new(PolicyActuator::from_config(&config)?);
    let voice: Arc<dyn SpeechProvider> = Arc::new(ConsoleVoice::new(config.robot_name.clone()));
    let speaker = Arc::new(FallbackSpeaker::new(vec![voice]));

    let mut session = CompanionSession::new(
        &config,
        Collaborators {
            quick,
            planner,
            speaker,
            navigator: actuator.clone(),
            manipulator: actuator,
            preferences,
            residents,
            facility,
            conversations: Arc::new(InMemoryConversationLog::new()),
        },
    );
    session.start_conversation(None).await?;

    println!(
        "{} is listening. Type 'resident <name>' to pick a resident, 'quit' to stop.",
        config.robot_name
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        if let Some(name) = text.strip_prefix("resident ") {
            match session.find_resident(name.trim()).await? {
                Some(resident) => {
                    session.start_conversation(Some(resident.id)).await?;
                    println!("Now talking with {}.", resident.name);
                }
                None => println!("No resident named '{}'.", name.trim()),
            }
            continue;
        }

        match session.process_text(text).await {
            Ok(report) => println!(
                "  [{} | {} | {}ms | {}/{} actions]",
                report.intent,
                report.model_used,
                report.think_ms,
                report.actions_succeeded,
                report.actions_executed
            ),
            Err(e) => {
                error!("Interaction failed: {}", e);
                println!("{}: Sorry, I'm having trouble thinking right now.", config.robot_name);
            }
        }
    }

    if let Some(summary) = session.end_conversation().await? {
        info!(%summary, "Conversation summarised");
    }
    info!("Soul stopped");
    Ok(())
}
