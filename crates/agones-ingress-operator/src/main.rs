use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use agones_ingress_operator::config::{Args, IngressSettings};
use agones_ingress_operator::gameserver::GameServer;
use agones_ingress_operator::handler::Handler;
use agones_ingress_operator::health::{run_health_server, HealthState};
use agones_ingress_operator::pipeline::Reconcilers;
use agones_ingress_operator::reconcilers::ingress::IngressReconciler;
use agones_ingress_operator::reconcilers::service::ServiceReconciler;
use agones_ingress_operator::reconcilers::status::StatusReconciler;
use agones_ingress_operator::stores::Stores;
use agones_ingress_operator::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // JSON logs for production; RUST_LOG overrides the verbosity flag
    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_current_span(false),
        )
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("agones-ingress-operator starting");

    let client = build_client(&args)
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let settings = IngressSettings::from(&args);
    info!(
        domain = %settings.domain,
        ingress_class = %settings.ingress_class,
        sync_period = ?args.sync_period,
        "Loaded configuration"
    );

    let tracker = TaskTracker::new();
    let stores = Stores::spawn(&client, &tracker);

    let health = Arc::new(HealthState::new());
    let health_task = tokio::spawn(run_health_server(Arc::clone(&health), args.health_addr));

    stores.wait_ready().await;
    health.mark_synced();
    info!("Object caches synced");

    let reconcilers = Reconcilers {
        service: Arc::new(ServiceReconciler::new(client.clone(), stores.services)),
        ingress: Arc::new(IngressReconciler::new(
            client.clone(),
            stores.ingresses,
            settings.clone(),
        )),
        status: Arc::new(StatusReconciler::new(client.clone(), settings)),
    };
    let handler = Arc::new(Handler::new(reconcilers));

    let gameservers: Api<GameServer> = Api::all(client.clone());

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    select! {
        _ = watch::run(gameservers.clone(), Arc::clone(&handler)) => {
            bail!("GameServer watch exited unexpectedly");
        }
        _ = watch::resync(gameservers, Arc::clone(&handler), args.sync_period) => {
            bail!("Resync loop exited unexpectedly");
        }
        result = health_task => {
            match result {
                Ok(Ok(())) => bail!("Health server exited unexpectedly"),
                Ok(Err(e)) => return Err(e).context("Health server failure"),
                Err(e) => bail!("Health server task failed: {e}"),
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully");
        }
    }

    // Let in-flight pipelines finish before exiting.
    handler.drain().await;
    info!("Shutdown complete");

    Ok(())
}

/// Build a client from an explicit kubeconfig path, or fall back to
/// the ambient configuration (in-cluster or default kubeconfig).
async fn build_client(args: &Args) -> Result<Client> {
    match &args.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig at {}", path.display()))?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Failed to interpret kubeconfig")?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}
