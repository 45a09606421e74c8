use crate::{ConsoleReconciler, LogReconciler};
use anyhow::{Context, Result};
use binding_mirror_console::{Client, Templates};
use binding_mirror_core::Reconciler;
use binding_mirror_k8s_api::{Resource, RoleBinding};
use binding_mirror_store::EtcdStore;
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::info;

/// The reconciler selected for role bindings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReconcilerName {
    #[default]
    Log,
    Console,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown reconciler {0:?}; expected \"log\" or \"console\"")]
pub struct UnknownReconciler(String);

/// Connection settings for the console reconciler.
#[derive(Clone, Default)]
pub struct ConsoleSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub store_endpoints: Vec<String>,
    pub store_prefix: String,
    pub store_timeout: Duration,
    pub templates: Templates,
}

/// Builds the reconcilers used by each worker.
#[derive(Clone, Default)]
pub struct Registry {
    console: ConsoleSettings,
}

// === impl ReconcilerName ===

impl ReconcilerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Console => "console",
        }
    }
}

impl FromStr for ReconcilerName {
    type Err = UnknownReconciler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "log" | "default" => Ok(Self::Log),
            "console" | "twistlock" => Ok(Self::Console),
            _ => Err(UnknownReconciler(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReconcilerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Registry ===

impl Registry {
    pub fn new(console: ConsoleSettings) -> Self {
        Self { console }
    }

    /// Builds and initializes the role binding reconciler named by `name`.
    ///
    /// Fails if the console reconciler is selected without a console URL,
    /// credentials, or store endpoints.
    pub async fn bindings(&self, name: ReconcilerName) -> Result<Arc<dyn Reconciler<RoleBinding>>> {
        let reconciler: Arc<dyn Reconciler<RoleBinding>> = match name {
            ReconcilerName::Log => Arc::new(LogReconciler::default()),
            ReconcilerName::Console => Arc::new(self.console_reconciler()?),
        };
        reconciler
            .init()
            .await
            .with_context(|| format!("failed to initialize the {name} reconciler"))?;
        info!(reconciler = %reconciler.name(), "Reconciling role bindings");
        Ok(reconciler)
    }

    /// Returns the log-only reconciler used for every other kind.
    pub fn log_only<K>(&self) -> Arc<dyn Reconciler<K>>
    where
        K: Resource<DynamicType = ()> + Send + Sync + 'static,
    {
        Arc::new(LogReconciler::default())
    }

    fn console_reconciler(&self) -> Result<ConsoleReconciler<Client, EtcdStore>> {
        let settings = &self.console;
        let url = settings
            .url
            .as_deref()
            .context("the console reconciler requires a console URL")?;
        let user = settings
            .user
            .as_deref()
            .context("the console reconciler requires a console user")?;
        let password = settings
            .password
            .as_deref()
            .context("the console reconciler requires a console password")?;
        if settings.store_endpoints.is_empty() {
            anyhow::bail!("the console reconciler requires at least one store endpoint");
        }

        let console = Client::new(url, user, password, settings.timeout)?;
        let store = EtcdStore::new(
            &settings.store_endpoints,
            settings.store_prefix.clone(),
            settings.store_timeout,
        )?;
        Ok(ConsoleReconciler::new(
            console,
            store,
            settings.templates.clone(),
        ))
    }
}
