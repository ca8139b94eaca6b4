//! Studymap CLI - seed, inspect and query a course database
//!
//! Usage: studymap-cli [OPTIONS] <COMMAND>

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studymap_lib::ai_client::AiClient;
use studymap_lib::db::{Database, RefValue};
use studymap_lib::mindmap::build_mind_map;
use studymap_lib::sequencer::next_topic_for;
use studymap_lib::settings::{self, Settings};
use studymap_lib::import;

#[derive(Parser)]
#[command(name = "studymap-cli")]
#[command(version, about = "Studymap course CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (overrides STUDYMAP_DB and settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Settings file
    #[arg(long = "settings", global = true)]
    settings_file: Option<PathBuf>,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSON seed file into the database
    Seed {
        file: PathBuf,
    },
    /// Print the mind map layout as JSON
    Layout,
    /// Show which topic follows the given one
    Next {
        topic_id: String,
    },
    /// Send a prompt to the LLM and print the reply
    Ask {
        prompt: String,
    },
    /// Print effective settings (API key masked)
    Settings,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    studymap_lib::init_tracing(if cli.verbose { "debug" } else { "warn" });

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_database(config: &Settings) -> Result<Database, String> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    tracing::debug!("[CLI] Database: {}", path.display());
    Database::new(&path).map_err(|e| format!("Failed to open database {}: {}", path.display(), e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    let settings_path = cli.settings_file.clone().unwrap_or_else(settings::default_path);
    let mut config = Settings::load(&settings_path);
    config.apply_env();
    if let Some(db) = &cli.db {
        config.db_path = Some(db.to_string_lossy().to_string());
    }

    match cli.command {
        Commands::Seed { file } => {
            let db = open_database(&config)?;
            let stats = import::import_seed(&db, &file).map_err(|e| e.to_string())?;
            println!(
                "Imported {} courses, {} labels, {} topics, {} questions, {} answers, {} progress rows",
                stats.courses, stats.labels, stats.topics, stats.questions, stats.answers, stats.progress
            );
        }
        Commands::Layout => {
            let db = open_database(&config)?;
            let map = build_mind_map(&db).map_err(|e| e.to_string())?;
            println!("{}", to_json(&map)?);
        }
        Commands::Next { topic_id } => {
            let db = open_database(&config)?;
            let next = next_topic_for(&db, &RefValue::from_param(&topic_id)).map_err(|e| e.to_string())?;
            match (&next.next_topic_id, &next.next_topic_name) {
                (Some(id), Some(name)) => println!("{}  {}", id, name),
                (Some(id), None) => println!("{}", id),
                _ => println!("End of course"),
            }
        }
        Commands::Ask { prompt } => {
            let client = AiClient::new(&config);
            let reply = client.generate_text(&prompt).await.map_err(|e| e.to_string())?;
            println!("{}", reply);
        }
        Commands::Settings => {
            println!("# {}", settings_path.display());
            println!("{}", to_json(&config.redacted())?);
        }
    }

    Ok(())
}
