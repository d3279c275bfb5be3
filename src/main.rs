//! session-hub binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use session_hub::api::{self, AppState};
use session_hub::cli::{self, Args};
use session_hub::config::Config;
use session_hub::{logging, SessionHub};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args)?;
    let _ = logging::init_with(config.log_filter());

    info!("session-hub v{}", env!("CARGO_PKG_VERSION"));

    let server_config = config.to_server_config()?;
    let hub_config = config.to_hub_config()?;
    let factory = config.driver_factory()?;

    info!(
        max_qr_attempts = hub_config.max_qr_attempts,
        store = %hub_config.store_root.display(),
        "session hub configured"
    );

    let hub = Arc::new(SessionHub::new(hub_config, Arc::new(factory)));

    if let Err(e) = api::serve_with_state(server_config, AppState::new(Arc::clone(&hub))).await {
        error!("server failed: {}", e);
        hub.shutdown().await;
        return Err(e.into());
    }

    info!("session-hub stopped");
    Ok(())
}
