use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use prometheus::Registry;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use kvm_operator::api::ObjectApis;
use kvm_operator::config::LogFormat;
use kvm_operator::controllers::kvmcluster;
use kvm_operator::controllers::retry::RetryTracker;
use kvm_operator::controllers::{ControllerContext, Reconciler};
use kvm_operator::health::{run_health_server, HealthState};
use kvm_operator::{OperatorConfig, ReconcileMetrics};
use kvm_operator_common::KvmCluster;

const RETRY_CLEANUP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::from_env().context("Failed to load operator configuration")?;

    init_tracing(config.log_format);

    info!(
        health_port = config.health_port,
        resync_secs = config.resync_interval_seconds,
        "kvm-operator starting"
    );

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    // One registry for the process, handed to everything that records
    let registry = Registry::new();
    let metrics = ReconcileMetrics::new()
        .and_then(|metrics| metrics.register(&registry))
        .context("Failed to register metrics")?;

    let reconciler = Reconciler::new(ObjectApis::from_client(&kube_client), Arc::new(metrics));
    let ctx = Arc::new(ControllerContext {
        reconciler: Arc::new(reconciler),
        retry_tracker: RetryTracker::new(),
        resync: config.resync_interval(),
    });

    let health_state = Arc::new(HealthState::new(Arc::new(kube_client.clone()), registry));
    let health = tokio::spawn(run_health_server(health_state.clone(), config.health_port));

    info!("Starting controllers");
    let controller = tokio::spawn(kvmcluster::run(kube_client.clone(), ctx.clone()));
    health_state.mark_started();

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    select! {
        result = controller => {
            // Controller failure should trigger pod restart
            return handle_task_exit("KvmCluster controller", result);
        }
        result = health => {
            return match result {
                Ok(Err(e)) => Err(e).context("Health server failed"),
                other => handle_task_exit("Health server", other.map(|_| ())),
            };
        }
        _ = run_retry_cleanup(kube_client.clone(), ctx.clone()) => {
            bail!("Retry cleanup loop exited unexpectedly");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false),
            )
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Handle a background task exit, returning an error to trigger pod restart
fn handle_task_exit(
    name: &str,
    result: std::result::Result<(), tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(()) => {
            error!(task = name, "Task exited unexpectedly");
            bail!("{} exited unexpectedly", name)
        }
        Err(e) if e.is_panic() => {
            error!(task = name, "Task panicked");
            bail!("{} panicked: {:?}", name, e.into_panic())
        }
        Err(e) if e.is_cancelled() => {
            warn!(task = name, "Task was cancelled");
            bail!("{} was cancelled", name)
        }
        Err(e) => {
            error!(task = name, error = ?e, "Task failed");
            bail!("{} failed: {}", name, e)
        }
    }
}

/// Periodically forget retry state of deleted clusters
async fn run_retry_cleanup(client: Client, ctx: Arc<ControllerContext>) {
    let clusters: Api<KvmCluster> = Api::all(client);
    let mut cleanup_interval = interval(Duration::from_secs(RETRY_CLEANUP_INTERVAL_SECS));
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;

        match clusters.list(&ListParams::default()).await {
            Ok(list) => {
                let active: Vec<String> = list.items.iter().map(ResourceExt::name_any).collect();
                debug!(clusters = active.len(), "Cleaning up retry state");
                ctx.retry_tracker.cleanup(&active);
            }
            Err(e) => warn!(error = %e, "Failed to list clusters for retry cleanup"),
        }
    }
}
