//! cordlink-proxy: exposes the local chat client's IPC session to remote
//! control surfaces over WebSocket.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cordlink_config::{validate_proxy, ProxyConfig, DEFAULT_PORT};
use cordlink_ipc::IpcClient;
use cordlink_proxy::{LocalSession, ProxyServer};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "cordlink-proxy",
    about = "Relay the local chat client's RPC session over WebSocket"
)]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// OAuth2 application id.
    #[arg(long, env = "DISCORD_CLIENT_ID", default_value = "")]
    client_id: String,

    /// OAuth2 application secret.
    #[arg(long, env = "DISCORD_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    client_secret: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cordlink_proxy=info,cordlink_ipc=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ProxyConfig::new(args.port, args.client_id, args.client_secret);
    if let Err(e) = validate_proxy(&config) {
        eprintln!("Error: {e}");
        eprintln!("Usage: DISCORD_CLIENT_ID=<id> DISCORD_CLIENT_SECRET=<secret> cordlink-proxy [--port <port>]");
        return ExitCode::FAILURE;
    }

    let addr = config.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            return ExitCode::FAILURE;
        }
    };

    let session = Arc::new(LocalSession::start(Arc::new(IpcClient::new()), config));
    let server = ProxyServer::new(Arc::clone(&session));

    tokio::select! {
        _ = server.serve(listener) => {}
        _ = shutdown_signal() => tracing::info!("Shutting down"),
    }

    session.destroy().await;
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
