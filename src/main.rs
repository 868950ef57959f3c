//! live-launcher - launches Jobs from manifest templates and cleans up after them

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use live_launcher::cluster::{create_client, ClusterClient, KubeClusterClient};
use live_launcher::controller::{
    workload_events, CleanupConfig, CleanupReconciler, DEFAULT_WATCH_ERROR_BUDGET,
};
use live_launcher::labels::{LabelConfig, DEFAULT_IDENTITY_LABEL_KEY};
use live_launcher::launcher::{LaunchTemplates, PartialFailurePolicy, ResourceLauncher};
use live_launcher::supervisor::supervise;
use live_launcher::template::TemplateRenderer;
use live_launcher::{server, DEFAULT_LISTEN_ADDR};

/// Launch Kubernetes Jobs from manifest templates and clean up their
/// Services and Ingresses when they finish
#[derive(Parser, Debug)]
#[command(name = "live-launcher", version, about, long_about = None)]
struct Cli {
    /// Path to the Job manifest template
    #[arg(long, env = "LIVE_LAUNCHER_JOB_SPEC")]
    job_spec: PathBuf,

    /// Path to the Service manifest template
    #[arg(long, env = "LIVE_LAUNCHER_SERVICE_SPEC")]
    service_spec: Option<PathBuf>,

    /// Path to the Ingress manifest template
    #[arg(long, env = "LIVE_LAUNCHER_INGRESS_SPEC")]
    ingress_spec: Option<PathBuf>,

    /// Path to a kubeconfig file (in-cluster or inferred config otherwise)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Namespace to create resources in (client default otherwise)
    #[arg(long, env = "LIVE_LAUNCHER_NAMESPACE")]
    namespace: Option<String>,

    /// Address for the HTTP server
    #[arg(long, env = "LIVE_LAUNCHER_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen_addr: SocketAddr,

    /// Default label applied to every resource, as KEY=VALUE (repeatable)
    ///
    /// Replaces the built-in `app.kubernetes.io/managed-by=live-launcher`.
    #[arg(
        long = "label",
        value_name = "KEY=VALUE",
        env = "LIVE_LAUNCHER_LABELS",
        value_delimiter = ','
    )]
    labels: Vec<String>,

    /// Label key that stores the request identifier
    #[arg(long, env = "LIVE_LAUNCHER_IDENTITY_LABEL_KEY", default_value = DEFAULT_IDENTITY_LABEL_KEY)]
    identity_label_key: String,

    /// What to do with already-created resources when a launch fails midway
    #[arg(
        long,
        env = "LIVE_LAUNCHER_ON_PARTIAL_FAILURE",
        value_enum,
        default_value_t = PartialFailurePolicy::Rollback
    )]
    on_partial_failure: PartialFailurePolicy,

    /// Also delete Services and Ingresses of Jobs that failed
    #[arg(long, env = "LIVE_LAUNCHER_CLEANUP_ON_FAILURE")]
    cleanup_on_failure: bool,

    /// Consecutive watch errors tolerated before exiting
    #[arg(long, env = "LIVE_LAUNCHER_WATCH_ERROR_BUDGET", default_value_t = DEFAULT_WATCH_ERROR_BUDGET)]
    watch_error_budget: u32,

    /// Log output format
    #[arg(long, env = "LIVE_LAUNCHER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's rustls stack needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let labels = label_config(&cli)?;
    let renderer = TemplateRenderer::new(labels.clone());
    let templates = load_templates(&renderer, &cli).await?;

    let client = create_client(cli.kubeconfig.as_deref())
        .await
        .context("failed to create Kubernetes client")?;
    let namespace = cli
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    info!(namespace = %namespace, "Using namespace");

    let cluster: Arc<dyn ClusterClient> =
        Arc::new(KubeClusterClient::new(client.clone(), namespace.clone()));
    let launcher = Arc::new(ResourceLauncher::new(
        cluster.clone(),
        renderer,
        templates,
        cli.on_partial_failure,
    ));
    let reconciler = CleanupReconciler::new(
        cluster,
        labels.clone(),
        CleanupConfig {
            cleanup_on_failure: cli.cleanup_on_failure,
            watch_error_budget: cli.watch_error_budget,
        },
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let events = workload_events(client, &namespace, &labels);
    let reconciler_token = shutdown.clone();
    let reconciler_task =
        tokio::spawn(async move { reconciler.run(events, reconciler_token).await });
    let server_task = tokio::spawn(server::serve(cli.listen_addr, launcher, shutdown.clone()));

    supervise(reconciler_task, server_task, shutdown)
        .await
        .context("live-launcher stopped on error")?;

    info!("live-launcher shut down");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn label_config(cli: &Cli) -> anyhow::Result<LabelConfig> {
    let defaults = if cli.labels.is_empty() {
        LabelConfig::default().defaults().clone()
    } else {
        LabelConfig::parse_pairs(&cli.labels)?
    };
    Ok(LabelConfig::new(defaults, cli.identity_label_key.clone())?)
}

async fn load_templates(renderer: &TemplateRenderer, cli: &Cli) -> anyhow::Result<LaunchTemplates> {
    let workload = renderer.compile(read_template(&cli.job_spec).await?)?;

    let service = match &cli.service_spec {
        Some(path) => Some(renderer.compile(read_template(path).await?)?),
        None => {
            warn!("No Service template configured, Services will not be created");
            None
        }
    };
    let ingress = match &cli.ingress_spec {
        Some(path) => Some(renderer.compile(read_template(path).await?)?),
        None => {
            warn!("No Ingress template configured, Ingresses will not be created");
            None
        }
    };

    Ok(LaunchTemplates {
        workload,
        service,
        ingress,
    })
}

async fn read_template(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read template {}", path.display()))
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
    token.cancel();
}
