use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use consent_guard::config::{ConsentConfig, StorageBackend};
use consent_guard::consent::{ConsentAnalyzer, ConsentLevel, MessageType};
use consent_guard::storage::{SqliteStore, VerificationQuery};
use consent_guard::{AnalyzeOptions, ConsentVerificationService};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "consent_guard=info";

#[derive(Parser, Debug)]
#[command(name = "consent-guard", version, about = "Consent checks for sensitive chat messages")]
struct Cli {
    /// Config file (default: ~/.consent-guard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a message and print the analysis
    Analyze {
        text: String,
        #[arg(long)]
        context: Option<String>,
        #[arg(long, default_value = "text")]
        message_type: String,
    },
    /// Run the full pre-send verification and record it
    Verify {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        text: String,
        #[arg(long, default_value = "text")]
        message_type: String,
        #[arg(long)]
        context: Option<String>,
    },
    /// List recorded verifications (SQLite backend)
    History {
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        /// explicit | ambiguous | negative | none
        #[arg(long, value_parser = parse_level)]
        level: Option<ConsentLevel>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective config as TOML
    Show,
    /// Print the JSON schema of the config file
    Schema,
}

fn parse_level(raw: &str) -> std::result::Result<ConsentLevel, String> {
    ConsentLevel::parse(raw).ok_or_else(|| {
        format!("unknown consent level '{raw}' (expected explicit, ambiguous, negative or none)")
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Schema export must work even when the config file is broken.
    if matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommands::Schema
        }
    ) {
        println!("{}", ConsentConfig::json_schema()?);
        return Ok(());
    }

    let config = ConsentConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            text,
            context,
            message_type,
        } => {
            let analyzer = ConsentAnalyzer::new(config.thresholds.clone())?;
            let context = context.unwrap_or_else(|| config.default_context.clone());
            let analysis = analyzer.analyze(
                &text,
                &context,
                &AnalyzeOptions::with_message_type(MessageType::parse(&message_type)),
            );
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Verify {
            sender,
            recipient,
            text,
            message_type,
            context,
        } => {
            let service = ConsentVerificationService::from_config(&config)?;
            let result = service
                .verify_consent_before_send(
                    &sender,
                    &recipient,
                    &text,
                    &message_type,
                    context.as_deref(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::History {
            sender,
            recipient,
            level,
            limit,
        } => {
            if config.storage.backend != StorageBackend::Sqlite {
                bail!(
                    "history is only available for the sqlite backend (configured: {})",
                    config.storage.backend.as_str()
                );
            }
            let path = config.storage.resolved_sqlite_path()?;
            let store = SqliteStore::open(&path, config.storage.max_records)
                .with_context(|| format!("Failed to open audit store at {}", path.display()))?;
            let records = store.query(&VerificationQuery {
                sender_id: sender,
                recipient_id: recipient,
                consent_level: level,
                limit: Some(limit),
                ..Default::default()
            })?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Config {
            command: ConfigCommands::Show,
        } => {
            print!("{}", config.redacted().to_toml_string()?);
        }
        Commands::Config {
            command: ConfigCommands::Schema,
        } => {
            println!("{}", ConsentConfig::json_schema()?);
        }
    }

    Ok(())
}
