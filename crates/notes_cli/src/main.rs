//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the configured store and provision the notes repository.
//! - Print deterministic health and stats lines for quick sanity checks.
//!
//! Reads `NOTES_DB_PATH`, `NOTES_COLLECTION`, `NOTES_TTL_SWEEP_SECS` and,
//! when set, `NOTES_LOG_DIR` / `NOTES_LOG_LEVEL`.

use log::error;
use notes_core::{
    Database, NoteRepository, RepoConfig, RequestContext, StoreConfig, StoreNoteRepository,
};
use std::process::ExitCode;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    println!("notes_core ping={}", notes_core::ping());
    println!("notes_core version={}", notes_core::core_version());

    if let Ok(log_dir) = std::env::var("NOTES_LOG_DIR") {
        let level = std::env::var("NOTES_LOG_LEVEL")
            .unwrap_or_else(|_| notes_core::default_log_level().to_string());
        if let Err(err) = notes_core::init_logging(&level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_probe module=cli status=error error={err}");
            eprintln!("probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn probe() -> Result<(), Box<dyn std::error::Error>> {
    let store_config = StoreConfig::from_env()?;
    let repo_config = RepoConfig::from_env();
    let ctx = RequestContext::with_timeout(PROBE_TIMEOUT);

    let db = Database::open(&store_config)?;
    let repo = StoreNoteRepository::with_config(&ctx, &db, &repo_config)?;
    let stats = repo.stats(&ctx)?;

    println!("store mode={}", db.mode());
    println!("collection={}", repo_config.collection);
    println!("expiry_enabled={}", repo.expiry_enabled());
    println!("notes count={} avg_length={:.2}", stats.count, stats.avg_length);
    Ok(())
}
