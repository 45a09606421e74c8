use crate::{Cache, Config, Dispatcher, ReconcileMetrics, Worker};
use anyhow::{bail, Context, Result};
use binding_mirror_console::Templates;
use binding_mirror_core::Reconciler;
use binding_mirror_k8s_api::{
    watcher, ConfigMap, DaemonSet, Deployment, Pod, ReplicaSet, ReplicationController, Resource,
    ResourceKind, RoleBinding, Secret, Service,
};
use binding_mirror_queue::{ExponentialBackoff, Queue, QueueFamilies};
use binding_mirror_sync::{ConsoleSettings, Registry};
use chrono::{DateTime, Utc};
use clap::Parser;
use prometheus_client::registry::Registry as Metrics;
use serde::de::DeserializeOwned;
use std::{fmt, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "binding-mirror",
    about = "Mirrors cluster role bindings into a security console"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "binding_mirror=info,warn",
        env = "BINDING_MIRROR_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "BINDING_MIRROR_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Directory holding `config.yaml` and optional `templates/`.
    #[clap(
        long,
        default_value = "/etc/binding-mirror",
        env = "BINDING_MIRROR_CONFIG_DIR"
    )]
    config_dir: PathBuf,

    #[clap(long, env = "CONSOLE_URL")]
    console_url: Option<String>,

    #[clap(long, env = "CONSOLE_USER")]
    console_user: Option<String>,

    #[clap(long, env = "CONSOLE_PASSWORD", hide_env_values = true)]
    console_password: Option<String>,

    #[clap(long, default_value = "10000")]
    console_timeout_ms: u64,

    /// Addresses of the recovery store's etcd members.
    #[clap(long, env = "STORE_ENDPOINTS", value_delimiter = ',')]
    store_endpoints: Vec<String>,

    #[clap(long, default_value = "3000")]
    store_timeout_ms: u64,

    /// Prepended to every recovery record key.
    #[clap(long, default_value = "", env = "STORE_PREFIX")]
    store_prefix: String,

    /// Number of times a failed notification is retried before it is
    /// dropped.
    #[clap(long, default_value = "10")]
    max_retries: u32,

    #[clap(long, default_value = "5")]
    retry_base_delay_ms: u64,

    #[clap(long, default_value = "1000000")]
    retry_max_delay_ms: u64,
}

/// Settings shared by every worker.
struct WorkerParams {
    backoff: ExponentialBackoff,
    max_retries: u32,
    started_at: DateTime<Utc>,
    queues: QueueFamilies,
    reconciles: ReconcileMetrics,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            config_dir,
            console_url,
            console_user,
            console_password,
            console_timeout_ms,
            store_endpoints,
            store_timeout_ms,
            store_prefix,
            max_retries,
            retry_base_delay_ms,
            retry_max_delay_ms,
        } = self;

        let config = Config::load(&config_dir)?;
        let reconciler = config.reconciler()?;
        let kinds = config.enabled();
        let templates = Templates::from_dir(&config_dir.join("templates"))
            .context("failed to load console templates")?;

        let mut prom = <Metrics>::default();
        let reg = prom.sub_registry_with_prefix("binding_mirror");
        let queues = QueueFamilies::register(reg);
        let reconciles = ReconcileMetrics::register(reg);

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let registry = Registry::new(ConsoleSettings {
            url: console_url,
            user: console_user,
            password: console_password,
            timeout: Duration::from_millis(console_timeout_ms),
            store_endpoints: store_endpoints
                .into_iter()
                .map(|ep| ep.trim().to_string())
                .filter(|ep| !ep.is_empty())
                .collect(),
            store_prefix,
            store_timeout: Duration::from_millis(store_timeout_ms),
            templates,
        });
        let bindings = registry.bindings(reconciler).await?;

        let params = WorkerParams {
            backoff: ExponentialBackoff::new(
                Duration::from_millis(retry_base_delay_ms),
                Duration::from_millis(retry_max_delay_ms),
            ),
            max_retries,
            started_at: Utc::now(),
            queues,
            reconciles,
        };

        if kinds.is_empty() {
            warn!("No resource kinds are enabled");
        }
        for kind in kinds {
            match kind {
                ResourceKind::ConfigMap => {
                    spawn_kind::<ConfigMap, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::DaemonSet => {
                    spawn_kind::<DaemonSet, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::Deployment => {
                    spawn_kind::<Deployment, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::Pod => {
                    spawn_kind::<Pod, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::ReplicaSet => {
                    spawn_kind::<ReplicaSet, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::ReplicationController => spawn_kind::<ReplicationController, _>(
                    &mut runtime,
                    kind,
                    registry.log_only(),
                    &params,
                ),
                ResourceKind::RoleBinding => {
                    spawn_kind::<RoleBinding, _>(&mut runtime, kind, bindings.clone(), &params)
                }
                ResourceKind::Secret => {
                    spawn_kind::<Secret, _>(&mut runtime, kind, registry.log_only(), &params)
                }
                ResourceKind::Service => {
                    spawn_kind::<Service, _>(&mut runtime, kind, registry.log_only(), &params)
                }
            }
        }

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the workers to finish their current notifications before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Starts the watch and worker tasks for one resource kind.
fn spawn_kind<K, S>(
    runtime: &mut kubert::Runtime<S>,
    kind: ResourceKind,
    reconciler: Arc<dyn Reconciler<K>>,
    params: &WorkerParams,
) where
    K: Resource<DynamicType = ()> + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static,
    S: 'static,
{
    let queue = Queue::new(params.backoff, params.queues.for_kind(kind.as_str()));
    let cache = Cache::<K>::new();

    let events = runtime.watch_all::<K>(watcher::Config::default());
    tokio::spawn(
        cache
            .clone()
            .watch(events, queue.clone())
            .instrument(info_span!("watch", %kind)),
    );

    let dispatcher = Dispatcher::new(cache.clone(), reconciler, params.started_at);
    let worker = Worker::new(
        kind,
        queue,
        cache,
        dispatcher,
        params.max_retries,
        params.reconciles.clone(),
    );
    tokio::spawn(
        worker
            .run(runtime.shutdown_handle())
            .instrument(info_span!("worker", %kind)),
    );
    info!(%kind, "Watching");
}
