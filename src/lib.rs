pub mod commands;
pub mod config;
pub mod db;
pub mod error;
mod migrations;
pub mod normalize;
pub mod processor;
pub mod queries;
pub mod state;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use config::Config;
use state::AppState;

/// Start the folder watcher and block until Ctrl-C.
///
/// Must be called inside a tokio runtime.
pub async fn run(config: Config) -> Result<(), notify::Error> {
    log::info!(
        "Starting surgery board: watch_dir={}, db={}",
        config.watch_dir.display(),
        config.db_path.display()
    );
    let state = Arc::new(AppState::new(config));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let handle = watcher::start_watcher(&state.config, Arc::clone(&state.store), shutdown)?;
    state.attach_watcher(handle.status.clone());

    if let Err(e) = handle.task.await {
        log::error!("Watcher task ended abnormally: {}", e);
    }
    Ok(())
}
