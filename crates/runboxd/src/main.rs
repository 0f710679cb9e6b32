//! runboxd: hands every interactive client a disposable runner sandbox.
//!
//! ```text
//! runboxd serve --review-owner acme --review-repo tool --namespace runbox-runners
//! ```

mod cli;
mod github;
mod metrics;
mod ssh;
mod transport;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use runbox_core::{Orchestrator, session::SessionHandler};
use runbox_kube::KubeCluster;
use runbox_observe::{init_local_offset, init_logger};
use runbox_prometheus::PrometheusMetrics;

use crate::{
    cli::{Cli, Command, ServeArgs, TransportMode},
    github::GithubReviews,
    transport::Transport,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Offset detection refuses to run once other threads exist.
    init_local_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            match cli.command {
                Command::Serve(args) => serve(args).await,
            }
        })
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    // 1) logger
    init_logger(&args.logger_config()?)?;
    info!(namespace = %args.namespace, "runboxd starting");

    // 2) session transport, checked before touching the cluster
    let transport = match args.transport_mode() {
        Some(TransportMode::Ssh { host_key }) => {
            Transport::Ssh(Arc::new(ssh::server_config(&host_key)?))
        }
        Some(TransportMode::Plain) => {
            warn!("serving sessions over plaintext TCP; access tokens are not encrypted");
            Transport::Plain
        }
        None => anyhow::bail!("no --host-key given; pass --insecure-plaintext to serve bare TCP"),
    };

    // 3) cluster
    let cluster = KubeCluster::connect(&args.connect_mode(), args.namespace.clone())
        .await
        .context("cannot build cluster client")?;

    // 4) orchestrator
    let metrics = PrometheusMetrics::new()?;
    let orchestrator = Orchestrator::with_metrics(
        Arc::new(cluster),
        args.orchestrator_config(),
        Arc::new(metrics.clone()),
    );
    orchestrator.ensure_scope().await?;

    let shutdown = CancellationToken::new();

    // 5) metrics endpoint
    let metrics_task = match args.metrics_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot bind metrics address {addr}"))?;
            Some(tokio::spawn(metrics::serve(listener, metrics, shutdown.clone())))
        }
        None => None,
    };

    // 6) reconciler
    let reconciler = orchestrator.spawn_reconciler();

    // 7) sessions
    let reviews = GithubReviews::new(args.github_config()).context("cannot build review client")?;
    let handler = SessionHandler::new(orchestrator, Arc::new(reviews));
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("cannot bind session address {}", args.listen))?;
    info!(addr = %args.listen, ssh = matches!(transport, Transport::Ssh(_)), "accepting sessions");
    let server = tokio::spawn(transport::serve(
        listener,
        transport,
        handler,
        shutdown.clone(),
        Duration::from_millis(args.shutdown_grace_ms),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();

    server.await?;
    reconciler.stop().await;
    if let Some(task) = metrics_task {
        task.await??;
    }
    info!("runboxd stopped");
    Ok(())
}
