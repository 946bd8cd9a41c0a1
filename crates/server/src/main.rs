//! Call Assistant Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_assistant_completion::{build_transport, EmailTransport, LogEmailTransport};
use call_assistant_config::{load_settings, BusinessDirectory, Settings, StaticBusinessDirectory};
use call_assistant_llm::{LlmBackend, LlmConfig, OpenAIBackend, UnconfiguredBackend};
use call_assistant_persistence::{PersistenceError, PersistenceLayer, ScyllaConfig};
use call_assistant_server::state::Adapters;
use call_assistant_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("CALL_ASSISTANT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!("Starting Call Assistant v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let businesses: Arc<dyn BusinessDirectory> =
        match StaticBusinessDirectory::load(&config.businesses_path) {
            Ok(directory) => Arc::new(directory),
            Err(e) if config.environment.is_strict() => {
                tracing::error!(path = %config.businesses_path, error = %e, "Failed to load business directory");
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(
                    path = %config.businesses_path,
                    error = %e,
                    "Failed to load business directory, every call will be declined"
                );
                Arc::new(StaticBusinessDirectory::default())
            }
        };

    let persistence = if config.persistence.enabled {
        tracing::info!("Initializing ScyllaDB persistence layer...");
        match init_persistence(&config).await {
            Ok(persistence) => {
                tracing::info!(
                    hosts = ?config.persistence.scylla_hosts,
                    keyspace = %config.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                persistence
            }
            Err(e) => {
                tracing::error!(
                    "Failed to initialize ScyllaDB: {}. Falling back to in-memory.",
                    e
                );
                PersistenceLayer::in_memory()
            }
        }
    } else {
        tracing::info!("Persistence disabled, using in-memory stores");
        PersistenceLayer::in_memory()
    };

    let adapters = Adapters {
        answers: llm_backend(LlmConfig::from_settings(&config.llm)),
        summaries: llm_backend(LlmConfig::summary_from_settings(&config.llm)),
        email: email_transport(&config),
    };

    tracing::info!(
        storage = persistence.backend.as_str(),
        model = adapters.answers.model_name(),
        email = adapters.email.name(),
        "Initialized application state"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, persistence, businesses, adapters);

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("call_assistant={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn init_persistence(config: &Settings) -> Result<PersistenceLayer, PersistenceError> {
    call_assistant_persistence::init(ScyllaConfig::from(&config.persistence)).await
}

/// Without a usable completion service, calls still run: open questions
/// are deflected and summaries use the fallback
fn llm_backend(config: LlmConfig) -> Arc<dyn LlmBackend> {
    match OpenAIBackend::new(config) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!(error = %e, "Completion service unavailable");
            Arc::new(UnconfiguredBackend::new(e.to_string()))
        }
    }
}

fn email_transport(config: &Settings) -> Arc<dyn EmailTransport> {
    match build_transport(&config.notifications) {
        Ok(transport) => transport,
        Err(e) => {
            tracing::warn!(error = %e, "Email transport misconfigured, logging notifications instead");
            Arc::new(LogEmailTransport::new())
        }
    }
}
