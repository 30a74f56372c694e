//! cordlink: command-line control surface for a cordlink proxy.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cordlink_client::{ClientEvent, ConnectionState, RelayClient};
use cordlink_config::{load_default, load_from_path, ClientConfig};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(name = "cordlink", version, about = "Drive a local chat client through a cordlink proxy")]
struct Args {
    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Proxy host, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Proxy port, overriding the config file.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke one relay method and print its result as JSON.
    Call {
        method: String,
        /// Parameters as a JSON object.
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Print every event the proxy pushes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cordlink_client=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let client = RelayClient::new(config);
    let events = client.subscribe();
    client.connect();

    let code = match args.command {
        Command::Call { method, params } => call(&client, &method, &params).await,
        Command::Watch => watch(events).await,
    };
    client.disconnect().await;
    code
}

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig, cordlink_common::ConfigError> {
    match path {
        Some(path) => load_from_path(path),
        None => load_default(),
    }
}

async fn call(client: &RelayClient, method: &str, params: &str) -> ExitCode {
    let params: Value = match serde_json::from_str(params) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("Error: params are not valid JSON: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut state = client.watch_state();
    let link_up = tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await;
    if !matches!(link_up, Ok(Ok(_))) {
        eprintln!("Error: could not reach proxy at {}", client.config().ws_url());
        return ExitCode::FAILURE;
    }

    match client.call(method, params).await {
        Ok(result) => {
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{result}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn watch(mut events: broadcast::Receiver<ClientEvent>) -> ExitCode {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event output lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return ExitCode::SUCCESS,
            },
            _ = tokio::signal::ctrl_c() => return ExitCode::SUCCESS,
        }
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::LinkUp => println!("link up"),
        ClientEvent::LinkDown => println!("link down"),
        ClientEvent::LinkError(e) => println!("link error: {e}"),
        ClientEvent::ProxyStatus { connected } => println!("proxy session connected: {connected}"),
        ClientEvent::SessionReady(ready) => {
            let user = ready
                .user
                .as_ref()
                .and_then(|u| u.get("username"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            println!("session ready as {user}");
        }
        ClientEvent::SessionDisconnected => println!("session disconnected"),
        ClientEvent::SessionError(e) => println!("session error: {e}"),
        ClientEvent::Event { name, data } => println!("{name} {data}"),
    }
}
