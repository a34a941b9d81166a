use clap::{Parser, Subcommand};
use std::sync::Arc;

use serenity::all::GatewayIntents;
use serenity::Client;

use vrc_group_bot::application::services::{
    DecisionEngine, FaqService, ScanService, TemplateService,
};
use vrc_group_bot::infrastructure::config::Config;
use vrc_group_bot::infrastructure::discord::Handler;
use vrc_group_bot::infrastructure::llm::HttpClassifier;
use vrc_group_bot::infrastructure::memory::WordMemoryStore;
use vrc_group_bot::infrastructure::text::{MorphologyMode, TextNormalizer};

#[derive(Parser)]
#[command(name = "vrc-group-bot")]
#[command(about = "Discord assistant for a VRChat community", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config, cli.token);
        }
        Commands::Version => {
            println!("vrc-group-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config(&cli.config);
        }
    }
}

fn run_bot(config_path: String, token_override: Option<String>) {
    dotenvy::dotenv().ok();

    // Load config
    let mut config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };
    config.apply_env();
    if let Some(token) = token_override {
        config.discord.token = Some(token);
    }
    let token = match config.require_token() {
        Ok(token) => token.to_string(),
        Err(e) => {
            tracing::error!("{}", e);
            return;
        }
    };

    tracing::info!("Starting vrc-group-bot");

    // Wire services
    let memory = Arc::new(WordMemoryStore::new(
        config.memory.path.clone(),
        config.memory.retention_days,
    ));
    memory.load();
    let normalizer = Arc::new(TextNormalizer::from_embedded(MorphologyMode::Stem));
    let faq = match FaqService::from_embedded() {
        Ok(faq) => Arc::new(faq),
        Err(e) => {
            tracing::error!("{}", e);
            return;
        }
    };
    let templates = Arc::new(TemplateService::new(config.links.clone()));
    let classifier = match HttpClassifier::new(&config.llm) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to build LLM client: {}", e);
            return;
        }
    };
    let engine = Arc::new(DecisionEngine::new(
        &config,
        Arc::clone(&memory),
        Arc::clone(&normalizer),
        classifier,
    ));
    let scanner = Arc::new(ScanService::new(
        &config,
        Arc::clone(&memory),
        Arc::clone(&normalizer),
    ));
    let handler = Handler::new(config, faq, templates, engine, memory, normalizer, scanner);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let mut client = match Client::builder(&token, intents).event_handler(handler).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to build client: {}", e);
                return;
            }
        };
        if let Err(e) = client.start().await {
            tracing::error!("Client error: {}", e);
        }
    });
}

fn init_config(path: &str) {
    if std::path::Path::new(path).exists() {
        tracing::warn!("Config already exists at {}", path);
        return;
    }
    match Config::default().save(path) {
        Ok(()) => println!("Wrote default config to {}", path),
        Err(e) => tracing::error!("Failed to write config: {}", e),
    }
}
