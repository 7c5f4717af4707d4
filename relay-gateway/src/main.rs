use clap::Parser;
use std::net::SocketAddr;
use tracing::info;

use relay_gateway::config::Config;
use relay_gateway::create_server;

#[derive(Parser, Debug)]
#[command(name = "relay-gateway", about = "Multi-tenant AI inference gateway")]
struct Args {
    #[arg(short, long, default_value = "config")]
    config: String,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(&args.log_level).init();

    let mut config = Config::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let router = create_server(config)?;

    info!(%addr, "starting relay gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for SIGINT or, on unix, SIGTERM — in-flight dispatches finish before
/// the listener stops accepting new connections (spec.md §4.7 ambient ops).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
