use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use loreline_core::config::{build_provider, build_retriever};
use loreline_core::{load_config, ChatOrchestrator, HealthProbe, LorelineConfig};
use loreline_schema::ChatRequest;
use loreline_server::state::AppState;
use loreline_store::ConversationStore;

#[derive(Parser)]
#[command(name = "loreline", version, about = "knowledge-augmented chat service")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Config root directory (contains loreline.yaml)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP server")]
    Serve {
        #[arg(long, help = "Bind address, overrides server.bind from config")]
        bind: Option<String>,
    },
    #[command(about = "Run one query through the pipeline and print the answer")]
    Ask {
        #[arg(help = "The question to ask")]
        query: String,
        #[arg(long, help = "Skip the encyclopedic lookup")]
        no_knowledge: bool,
        #[arg(long, help = "Token budget for the answer")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Sampling temperature, 0.0 to 2.0")]
        temperature: Option<f32>,
    },
    #[command(about = "Show recent conversation turns")]
    History {
        #[arg(long, default_value_t = 20, help = "Number of turns to show")]
        limit: u32,
    },
    #[command(about = "Delete all conversation history")]
    Clear,
    #[command(about = "Validate the config file")]
    Validate,
}

struct Components {
    orchestrator: Arc<ChatOrchestrator>,
    store: ConversationStore,
    probe: Arc<HealthProbe>,
}

fn build_components(config: &LorelineConfig) -> Result<Components> {
    let provider = build_provider(&config.provider);
    let retriever = build_retriever(&config.knowledge);

    if let Some(parent) = std::path::Path::new(&config.storage.path).parent() {
        if !parent.as_os_str().is_empty() && config.storage.path != ":memory:" {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data dir: {}", parent.display()))?;
        }
    }
    let store = if config.storage.path == ":memory:" {
        ConversationStore::open_in_memory()?
    } else {
        ConversationStore::open(&config.storage.path)?
    };

    Ok(Components {
        orchestrator: Arc::new(ChatOrchestrator::new(
            retriever,
            provider.clone(),
            store.clone(),
        )),
        store: store.clone(),
        probe: Arc::new(HealthProbe::new(store, provider)),
    })
}

fn init_server_logging(root: &PathBuf) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "loreline.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("loreline=info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    Ok(guard)
}

fn init_cli_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let _guard = init_server_logging(&cli.config_root)?;
            let config = load_config(&cli.config_root)?;
            let components = build_components(&config)?;
            let state = AppState {
                orchestrator: components.orchestrator,
                store: components.store,
                probe: components.probe,
            };
            let addr = bind.unwrap_or(config.server.bind);
            loreline_server::serve(state, &addr).await?;
        }
        Commands::Ask {
            query,
            no_knowledge,
            max_tokens,
            temperature,
        } => {
            init_cli_logging();
            let config = load_config(&cli.config_root)?;
            let components = build_components(&config)?;

            let mut request = ChatRequest::new(query).with_knowledge(!no_knowledge);
            if let Some(max_tokens) = max_tokens {
                request = request.with_max_tokens(max_tokens);
            }
            if let Some(temperature) = temperature {
                request = request.with_temperature(temperature);
            }

            let reply = components.orchestrator.handle(request).await?;

            println!("{}", reply.answer);
            if let Some(url) = &reply.source_url {
                println!("\nsource: {url}");
            }
            if let Some(warning) = &reply.persistence_error {
                eprintln!("warning: answer was not saved to history: {warning}");
            }
        }
        Commands::History { limit } => {
            init_cli_logging();
            let config = load_config(&cli.config_root)?;
            let components = build_components(&config)?;

            let turns = components.store.list_recent(limit, 0).await?;
            if turns.is_empty() {
                println!("No conversation history.");
                return Ok(());
            }
            for turn in &turns {
                let marker = if turn.used_knowledge { "*" } else { " " };
                println!(
                    "[{:>4}]{marker} {}  {}",
                    turn.id,
                    turn.created_at.format("%Y-%m-%d %H:%M"),
                    preview(&turn.query, 60)
                );
                println!("        {}", preview(&turn.answer, 100));
            }
            println!("\n{} turn(s). * = answered with encyclopedia context", turns.len());
        }
        Commands::Clear => {
            init_cli_logging();
            let config = load_config(&cli.config_root)?;
            let components = build_components(&config)?;
            let deleted = components.store.clear().await?;
            println!("Deleted {deleted} turn(s).");
        }
        Commands::Validate => {
            init_cli_logging();
            let config = load_config(&cli.config_root)?;
            println!(
                "Config valid. provider={:?} storage={} bind={}",
                config.provider.kind, config.storage.path, config.server.bind
            );
        }
    }

    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
