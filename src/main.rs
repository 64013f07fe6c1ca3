use std::path::PathBuf;

use surgery_board_lib::config::load_config;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match load_config(explicit) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = surgery_board_lib::run(config).await {
        log::error!("Watcher failed to start: {}", e);
        std::process::exit(1);
    }
}
