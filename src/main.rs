//! wa-gateway binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use wa_gateway::api::{self, AppState};
use wa_gateway::cli::{self, Args};
use wa_gateway::config::Config;
use wa_gateway::dispatch::Dispatcher;
use wa_gateway::events::EventBroadcaster;
use wa_gateway::logging;
use wa_gateway::session::SessionManager;
use wa_gateway::transport::BridgeConnector;

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

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _ = logging::try_init_with_filter(&config.log_filter());
    info!("wa-gateway v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config, wa_gateway::config::ConfigError> {
    let config = Config::load(args)?;
    // Reject a bad host before anything is started.
    config.to_server_config()?;
    Ok(config)
}

async fn run(config: Config) -> wa_gateway::Result<()> {
    let server_config = config
        .to_server_config()
        .map_err(|e| wa_gateway::GatewayError::Io(std::io::Error::other(e.to_string())))?;

    let uploads = config.upload_config();
    tokio::fs::create_dir_all(&uploads.dir).await?;
    info!("Staging uploads in {}", uploads.dir.display());

    let session = SessionManager::start(
        Arc::new(BridgeConnector::new(config.bridge_config())),
        config.credential_store(),
        Arc::new(EventBroadcaster::new()),
        config.recovery_policy(),
    );

    if let Err(e) = session.initialize().await {
        warn!("Initial session start failed, retrying in background: {}", e);
    }

    let dispatcher = Dispatcher::new(Arc::clone(&session)).with_send_timeout(config.send_timeout());
    let state = AppState::new(Arc::clone(&session), dispatcher, uploads);

    let result = api::serve(server_config, state).await;

    info!("Shutting down session");
    session.shutdown().await;
    result
}
