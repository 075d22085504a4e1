//! CLI module for the extranuts application
//!
//! Parses arguments, wires the note store to a backend and a sync
//! scheduler, and runs one command against them.
mod app;
mod args;

use std::sync::Arc;

use log::info;

pub use app::App;
pub use args::Cli;

use crate::{Config, JsonFileBackend, MemoryBackend, NoteBackend, Result};

/// Runs one CLI invocation end to end, flushing pending changes before returning.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let backend: Arc<dyn NoteBackend> = if cli.ephemeral {
        info!("Running with in-memory storage");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(JsonFileBackend::open(&config.data_dir)?)
    };

    let mut app = App::open(config, backend, cli.verbose)?;
    let outcome = app.run(cli.command).await;
    app.shutdown().await?;
    outcome
}
