use std::sync::Arc;

use clap::Parser;
use log::{error, info, logger, Level};
use netwatch_log::NetwatchLogger;

mod cli;
mod config;
mod error;
mod listener;
mod logsink;
mod worker;

use cli::Args;
use config::ServerConfig;
use listener::EntryListener;
use logsink::LogSink;

#[tokio::main]
async fn main() {
    NetwatchLogger::init(Level::Info).expect("failed to install logger");

    let args = Args::parse();

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error loading {}: {e}", args.config.display());
            logger().flush();
            std::process::exit(1);
        }
    };

    let log_sink = LogSink::new(args.logs_dir.clone());
    if let Err(e) = log_sink.reset(config.device_to_tasks()) {
        error!("failed to prepare log directory {}: {e}", args.logs_dir.display());
        logger().flush();
        std::process::exit(1);
    }
    info!("log directory {} wiped and pre-created", args.logs_dir.display());

    let entry_listener = EntryListener::new(Arc::new(config), Arc::new(log_sink));
    if let Err(e) = entry_listener.run().await {
        error!("entry listener exited with an error: {e}");
        logger().flush();
        std::process::exit(1);
    }

    logger().flush();
}
