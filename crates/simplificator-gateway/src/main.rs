use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use simplificator_agent::advisor::ScriptedProvider;
use simplificator_agent::openai::OpenAiProvider;
use simplificator_agent::provider::LlmProvider;
use simplificator_agent::review::Reviewer;
use simplificator_core::SimplificatorConfig;
use tracing::{info, warn};

mod app;
mod client;
mod http;

#[derive(Parser, Debug)]
#[command(name = "simplificator", version)]
#[command(about = "Over-engineering coach: streaming chat gateway and code reviews")]
struct Cli {
    /// Config file (default: $SIMPLIFICATOR_CONFIG or ~/.simplificator/simplificator.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Chat with a running gateway; interactive when no message is given.
    Chat {
        message: Option<String>,
        /// Gateway base URL (default: the configured bind address and port).
        #[arg(long)]
        url: Option<String>,
    },
}

/// Used when `RUST_LOG` is unset. Targets are crate names, and the binary
/// crate is `simplificator`.
const DEFAULT_LOG_FILTER: &str =
    "simplificator=info,simplificator_agent=info,simplificator_reviews=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // explicit flag > SIMPLIFICATOR_CONFIG env > ~/.simplificator/simplificator.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var("SIMPLIFICATOR_CONFIG").ok());
    let config = SimplificatorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SimplificatorConfig::default()
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Chat { message, url } => {
            let url = url.unwrap_or_else(|| {
                format!("http://{}:{}", config.gateway.bind, config.gateway.port)
            });
            client::run(&url, message).await
        }
    }
}

async fn serve(config: SimplificatorConfig) -> anyhow::Result<()> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    simplificator_reviews::db::init_db(&db)?;
    let reviews = simplificator_reviews::ReviewStore::new(db);

    let (provider, reviewer) = build_provider(&config);
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;

    let state = Arc::new(app::AppState::new(config, provider, reviewer, reviews));
    let router = app::build_router(state);

    info!("Simplificator gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Upstream gateway when an API key is configured; otherwise the scripted
/// advisor answers chat and reviews are refused.
fn build_provider(config: &SimplificatorConfig) -> (Arc<dyn LlmProvider>, Option<Reviewer>) {
    match OpenAiProvider::from_config(config) {
        Some(openai) => {
            info!(
                url = %config.chat_url(),
                model = %config.upstream.model,
                "LLM provider: OpenAI-compatible gateway"
            );
            let provider: Arc<dyn LlmProvider> = Arc::new(openai);
            let reviewer = Reviewer::new(
                Arc::clone(&provider),
                config.upstream.model.clone(),
                config.upstream.max_tokens,
                config.review.clone(),
            );
            (provider, Some(reviewer))
        }
        None => {
            warn!(
                "No upstream API key configured (set {}), chat uses the scripted advisor",
                simplificator_core::config::API_KEY_ENV
            );
            (Arc::new(ScriptedProvider::default()), None)
        }
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_targets_this_binary() {
        let targets: Vec<&str> = DEFAULT_LOG_FILTER
            .split(',')
            .filter_map(|d| d.split('=').next())
            .collect();
        let this_crate = module_path!().split("::").next().unwrap();
        assert!(targets.contains(&this_crate), "{targets:?} misses {this_crate}");
        assert!(targets.contains(&"simplificator_agent"));
        assert!(targets.contains(&"simplificator_reviews"));
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn no_command_means_serve() {
        let cli = Cli::try_parse_from(["simplificator"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn chat_takes_optional_message_and_url() {
        let cli = Cli::try_parse_from([
            "simplificator",
            "--config",
            "/tmp/s.toml",
            "chat",
            "Do I need Kafka?",
            "--url",
            "http://127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/s.toml"));
        match cli.command {
            Some(Command::Chat { message, url }) => {
                assert_eq!(message.as_deref(), Some("Do I need Kafka?"));
                assert_eq!(url.as_deref(), Some("http://127.0.0.1:9000"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn without_api_key_chat_is_scripted() {
        let (provider, reviewer) = build_provider(&SimplificatorConfig::default());
        assert_eq!(provider.name(), "scripted");
        assert!(reviewer.is_none());
    }

    #[test]
    fn with_api_key_reviews_are_enabled() {
        let mut config = SimplificatorConfig::default();
        config.upstream.api_key = Some("k".into());
        let (provider, reviewer) = build_provider(&config);
        assert_eq!(provider.name(), "openai-compat");
        assert!(reviewer.is_some());
    }
}
