//! modproxy: a caching reverse-proxy for module registries.

mod app;
mod cli;
mod error;
mod logging;
mod routes;

use crate::app::Services;
use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use modproxy_config::Config;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "fatal");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let token = CancellationToken::new();
    let services = Services::start(&config, &token).await?;

    let listener = TcpListener::bind(config.listen)
        .await
        .or_raise(|| ErrorKind::Bind(config.listen))?;
    tracing::info!(address = %config.listen, upstream = %config.upstream.proxy_url, "listening");

    let served = axum::serve(listener, routes::router(services.state.clone()))
        .with_graceful_shutdown(shutdown(token.clone()))
        .await
        .or_raise(|| ErrorKind::Server);
    token.cancel();
    services.stop().await;
    tracing::info!("stopped");
    served
}

/// Resolves on Ctrl-C or when `token` is cancelled elsewhere, cancelling it either way.
async fn shutdown(token: CancellationToken) {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("shutting down"),
            Err(err) => tracing::error!(error = %err, "failed to listen for Ctrl-C"),
        },
        () = token.cancelled() => {},
    }
    token.cancel();
}
