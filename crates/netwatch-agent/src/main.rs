use clap::Parser;
use log::{error, info, logger, Level};
use netwatch_log::NetwatchLogger;
use tokio::time::Instant;

mod cli;
mod error;
mod runner;
mod state_machine;

use cli::Args;
use state_machine::Agent;

#[tokio::main]
async fn main() {
    NetwatchLogger::init(Level::Info).expect("failed to install logger");

    let args = Args::parse();
    let start_time = Instant::now();

    info!("agent {} starting, target server {}", args.device_id, args.server_host);

    let agent = match Agent::resolve(&args.server_host, args.device_id.clone(), args.port).await {
        Ok(agent) => agent,
        Err(e) => {
            error!("could not resolve server host {}: {e}", args.server_host);
            logger().flush();
            std::process::exit(1);
        }
    };

    if let Err(e) = agent.run().await {
        error!("agent session ended with an error: {e}");
        logger().flush();
        std::process::exit(1);
    }

    info!("agent {} ran for {:.2}s", args.device_id, start_time.elapsed().as_secs_f64());
    logger().flush();
}
