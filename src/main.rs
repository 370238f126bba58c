use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use clinicmail::config::AppConfig;
use clinicmail::handlers;
use clinicmail::services::ai::extraction::LlmGateway;
use clinicmail::services::ai::groq::GroqProvider;
use clinicmail::services::ai::ollama::OllamaProvider;
use clinicmail::services::ai::patient::SimulatedPatient;
use clinicmail::services::ai::LlmProvider;
use clinicmail::services::messaging::outbox::Outbox;
use clinicmail::services::runs::Scheduler;
use clinicmail::services::scheduling::SlotInventory;
use clinicmail::services::workflow::Workflow;
use clinicmail::state::AppState;

const REVIEW_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Arc::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))
        }
        _ => {
            tracing::info!(
                "using Ollama LLM provider (url: {}, model: {})",
                config.ollama_url,
                config.ollama_model
            );
            Arc::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))
        }
    };

    let slots = config.load_slots()?;
    let inventory = SlotInventory::from(slots);
    let unparseable = inventory.snapshot().unparseable();
    if !unparseable.is_empty() {
        tracing::warn!(?unparseable, "some slot labels cannot be parsed and will never match");
    }
    tracing::info!(
        slots = inventory.snapshot().len(),
        review_mode = ?config.review_mode,
        "inventory loaded"
    );

    let gateway = Arc::new(LlmGateway::new(
        llm.clone(),
        config.default_email_domain.clone(),
        config.clinic_name.clone(),
    ));
    let patient = Arc::new(SimulatedPatient::new(llm));
    let outbox = Arc::new(Outbox::new(config.clinic_email.clone()));

    let workflow = Workflow::new(
        gateway,
        patient.clone(),
        outbox.clone(),
        config.workflow_settings(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        scheduler: Scheduler::new(workflow, Arc::new(inventory)),
        outbox,
        patient,
    });

    let sweeper = state.clone();
    let review_timeout = config.review_timeout();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(REVIEW_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let expired = sweeper.scheduler.expire_stale_reviews(review_timeout);
            if expired > 0 {
                tracing::info!(expired, "expired runs left waiting for review");
            }
        }
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
