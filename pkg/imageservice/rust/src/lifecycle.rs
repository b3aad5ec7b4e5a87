// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process lifecycle shared by both service binaries: configure, resolve the
//! processing function, bind, serve, and drain on SIGTERM/SIGINT.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::transport::server::Router;

use crate::config::{self, Args, ServiceKind, Settings};
use crate::handler;
use crate::plugin::{CALLING_FUNCTION, Resolver, builtin};

/// Entry point for the service binaries.
#[allow(clippy::print_stderr)] // no logger yet when logger setup fails
pub fn main(kind: ServiceKind) -> ExitCode {
    let level = config::log_level_from_env();
    if let Err(e) = simple_logger::init_with_level(level.clone().unwrap_or(log::Level::Info)) {
        eprintln!("unable to initialise logging: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(value) = level {
        warn!("unknown LOG_LEVEL '{value}', using info");
    }

    match run(kind, Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} failed: {e:#}", kind.name());
            ExitCode::FAILURE
        }
    }
}

/// Start the service described by `args` and block until it has shut down.
pub fn run(kind: ServiceKind, args: Args) -> Result<()> {
    let settings = Settings::from_args(kind, args)?;
    info!(
        "{} starting (version {})",
        kind.name(),
        env!("CARGO_PKG_VERSION")
    );
    debug!("{settings:?}");

    let router = build_router(&settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(settings.workers)
        .thread_name(kind.name())
        .build()
        .context("unable to start the async runtime")?;

    let result = runtime.block_on(async {
        // Armed before the address is announced so an early signal still drains.
        let shutdown = shutdown_signal().context("unable to install signal handlers")?;
        let listener = bind(settings.port)
            .await
            .with_context(|| format!("unable to bind port {}", settings.port))?;
        info!("Server started at {}", listener.local_addr()?);
        serve(router, listener, settings.grace_period, shutdown).await
    });

    // Processing calls still running after the grace period are abandoned.
    runtime.shutdown_background();
    result
}

/// Resolve the configured module and build the router for `settings.kind`.
pub fn build_router(settings: &Settings) -> Result<Router> {
    let resolver = Resolver::new(builtin::registry(), settings.search_path.clone());
    let server = Server::builder().concurrency_limit_per_connection(settings.workers);
    match settings.kind {
        ServiceKind::ImageGeneric => handler::image_generic_router(
            server,
            resolver.resolve(&settings.module, CALLING_FUNCTION)?,
        ),
        ServiceKind::ImageWithPoses => handler::image_with_poses_router(
            server,
            resolver.resolve(&settings.module, CALLING_FUNCTION)?,
        ),
    }
}

/// Listen on every interface, preferring the IPv6 wildcard.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            debug!("unable to bind [::]:{port} ({e}), falling back to 0.0.0.0");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await
        }
    }
}

/// Serve until `shutdown` resolves, then stop accepting connections and give
/// in-flight requests up to `grace` to complete.
pub async fn serve<F>(
    router: Router,
    listener: TcpListener,
    grace: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = router.serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
        let _ = stop_rx.await;
    });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result?;
            return Ok(());
        }
        () = shutdown => {}
    }

    info!(
        "shutting down, waiting up to {}s for in-flight requests",
        grace.as_secs_f32()
    );
    let _ = stop_tx.send(());
    match timeout(grace, &mut server).await {
        Ok(result) => {
            result?;
            info!("server stopped");
        }
        Err(_) => warn!(
            "grace period of {}s elapsed, abandoning in-flight requests",
            grace.as_secs_f32()
        ),
    }
    Ok(())
}

/// Install SIGTERM and SIGINT handlers; the returned future resolves on the
/// first of either.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    })
}

/// Install a Ctrl-C handler; the returned future resolves on Ctrl-C.
#[cfg(windows)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        if ctrl_c.recv().await.is_some() {
            info!("received Ctrl-C");
        }
    })
}
