//! # Platform Operator
//!
//! Runs one controller per target kind:
//!
//! - `DatabaseUser`: credential reconciler
//! - `Platform`: key rotation, then deployment notifications
//!
//! Configuration comes from environment variables (see
//! [`platform_operator::config::OperatorConfig`]).

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::{Api, Client};
use platform_operator::clock::SystemClock;
use platform_operator::config::OperatorConfig;
use platform_operator::controller::credentials::CredentialReconciler;
use platform_operator::controller::keyring::KeyRotator;
use platform_operator::controller::notification::NotificationDeduplicator;
use platform_operator::controller::server::{start_server, ServerState};
use platform_operator::controller::ComponentRunner;
use platform_operator::crd::{DatabaseUser, Platform};
use platform_operator::database::PostgresConnector;
use platform_operator::dbpool::ConnectionPool;
use platform_operator::messaging::{
    DeployStatusClient, Disabled, MessagingClient, SlackClient, StatusReporter,
};
use platform_operator::observability::{logging, metrics};
use platform_operator::runtime::{run_watch_loop, Context};
use platform_operator::secrets::{KubeSecrets, SecretReader};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "platform-operator", version, about)]
struct Args {
    /// Only watch resources in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,
}

fn api<T>(client: &Client, namespace: Option<&str>) -> Api<T>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider, {existing:?} already installed")
        })?;

    let args = Args::parse();
    let config = OperatorConfig::from_env();
    logging::init_logging(&config.log_format);

    info!(
        "Starting platform-operator (build {} at {})",
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );

    metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::new());
    let server_port = config.metrics_port;
    let state_for_server = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let secrets = Arc::new(KubeSecrets::new(client.clone()));
    let reader: Arc<dyn SecretReader> = Arc::<KubeSecrets>::clone(&secrets);
    let pool = Arc::new(ConnectionPool::new(PostgresConnector::default()));

    let messaging: Arc<dyn MessagingClient> = match &config.slack_api_token {
        Some(token) => Arc::new(SlackClient::new(&config.slack_api_url, token)),
        None => {
            info!("SLACK_API_TOKEN not set, chat notifications disabled");
            Arc::new(Disabled)
        }
    };
    let reporter: Arc<dyn StatusReporter> = match &config.deploy_status_url {
        Some(url) => Arc::new(DeployStatusClient::new(url)),
        None => {
            info!("DEPLOY_STATUS_URL not set, deployment status reports disabled");
            Arc::new(Disabled)
        }
    };

    let users = Arc::new(Context::new(
        client.clone(),
        ComponentRunner::<DatabaseUser>::new().with(CredentialReconciler::new(
            reader,
            pool,
            config.password_hash_cost,
        )),
        config.clone(),
    ));
    let platforms = Arc::new(Context::new(
        client.clone(),
        ComponentRunner::<Platform>::new()
            .with(KeyRotator::new(secrets, Arc::new(SystemClock)))
            .with(NotificationDeduplicator::new(
                messaging,
                reporter,
                config.source_repository_url.clone(),
            )),
        config.clone(),
    ));

    let namespace = args.namespace.as_deref();
    server_state.is_ready.store(true, Ordering::Relaxed);

    tokio::join!(
        run_watch_loop(api::<DatabaseUser>(&client, namespace), users),
        run_watch_loop(api::<Platform>(&client, namespace), platforms),
    );

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("platform-operator stopped");
    Ok(())
}
