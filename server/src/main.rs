//! Standalone rterm server binary: loads config, wires `AppServer`, and
//! serves the HTTP/WebSocket front door until asked to shut down.

use std::path::PathBuf;

use clap::Parser;
use rterm_core::config::Config;
use rterm_server::AppServer;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rterm-server", about = "rterm terminal session service")]
struct Args {
    /// Path to an optional config.json overlay.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    std::fs::create_dir_all(config.log_dir())?;
    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "rterm.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(file_writer.and(std::io::stderr))
        .init();

    let app = AppServer::new(config.clone())?;
    let router = rterm_server::router(app.clone());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(event = "server.listening", addr = %addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(app))
        .await?;

    Ok(())
}

async fn shutdown_signal(app: AppServer) {
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!(event = "server.shutting_down");
    app.shutdown().await;
}
