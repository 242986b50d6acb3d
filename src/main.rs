use std::sync::Arc;

use axum::{Router, routing};
use gogs_ci_hook::api::{handle_hook, root};
use gogs_ci_hook::config::HookConfig;
use gogs_ci_hook::db::{SqlStore, init_db};
use gogs_ci_hook::fetch::HttpDefinitionFetcher;
use gogs_ci_hook::pipeline::{BuildPipeline, PipelineConfig};
use gogs_ci_hook::queue::{DispatchQueue, LogRunner};
use gogs_ci_hook::script::YamlScriptParser;
use gogs_ci_hook::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "hook_config.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("HOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = match HookConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());

    let pool = match init_db(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let fetcher = match HttpDefinitionFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(e) => {
            eprintln!("HTTP client error: {}", e);
            std::process::exit(1);
        }
    };

    let queue = DispatchQueue::start(config.workers, Arc::new(LogRunner));
    let pipeline = BuildPipeline::new(
        Arc::new(SqlStore::new(pool)),
        Arc::new(fetcher),
        Arc::new(YamlScriptParser),
        queue,
        PipelineConfig {
            definition_endpoint: config.definition_endpoint.clone(),
        },
    );

    let state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/", routing::get(root))
        .route("/hook", routing::post(handle_hook))
        .with_state(state);

    info!("Listening on {}", config.bind_address);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .unwrap();
    axum::serve(listener, app).await.unwrap();
}
