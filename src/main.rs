//! Kingstone server binary.
//!
//! One process, one world. The listen port comes from `PORT` (default
//! 8080); everything else uses the built-in configuration. Exits zero on
//! graceful stop and non-zero on bind failure or internal fault.

use kingstone::runtime::GameServer;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = match GameServer::builder()
        .with_port_from_env()
        .and_then(|builder| builder.build())
    {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server fault");
            ExitCode::FAILURE
        }
    }
}
