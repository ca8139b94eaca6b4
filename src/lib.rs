pub mod ai_client;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod import;
pub mod layout;
pub mod mindmap;
pub mod ordering;
pub mod quiz;
pub mod render;
pub mod sequencer;
pub mod settings;
pub mod store;
pub mod utils;

/// Install the global tracing subscriber. `STUDYMAP_LOG` takes an `EnvFilter`
/// directive; `default_level` applies when it is unset or invalid.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("STUDYMAP_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {}", e);
    }
}
