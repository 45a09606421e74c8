use crate::record;
use anyhow::{bail, Result};
use binding_mirror_console::{Console, Templates, DEVOPS_ROLE};
use binding_mirror_core::{Action, ParsedGrant, Reconciler};
use binding_mirror_k8s_api::{object_key, RoleBinding};
use binding_mirror_store::RecoveryStore;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// Mirrors devOps role bindings into console collections and groups.
///
/// Each common name granted by a binding has one collection, scoped to every
/// namespace that grants it, and one group. Admin bindings are recorded but
/// never mirrored.
///
/// A notification is reconciled in full even when individual calls fail; if
/// any call failed, an error is returned afterwards so the notification is
/// retried. Every step is safe to repeat.
pub struct ConsoleReconciler<C, S> {
    console: C,
    store: S,
    templates: Templates,
}

/// Failures observed while reconciling one notification.
struct Failures<'k> {
    key: &'k str,
    count: usize,
}

// === impl ConsoleReconciler ===

impl<C, S> ConsoleReconciler<C, S>
where
    C: Console,
    S: RecoveryStore,
{
    pub fn new(console: C, store: S, templates: Templates) -> Self {
        Self {
            console,
            store,
            templates,
        }
    }

    /// Ensures a collection named `cn` covers `namespace` and that a group
    /// named `cn` exists.
    async fn ensure(&self, cn: &str, namespace: &str, failures: &mut Failures<'_>) {
        self.ensure_collection(cn, namespace, failures).await;
        self.ensure_group(cn, failures).await;
    }

    async fn ensure_collection(&self, cn: &str, namespace: &str, failures: &mut Failures<'_>) {
        // An unreadable listing is treated as empty so that creation is
        // attempted.
        let collections = self.console.list_collections().await.unwrap_or_else(|error| {
            warn!(%cn, %error, "Failed to list collections");
            Vec::new()
        });

        match collections.into_iter().find(|c| c.name == cn) {
            Some(collection) if collection.contains_namespace(namespace) => {
                debug!(%cn, %namespace, "Collection already covers namespace");
            }
            Some(mut collection) => {
                collection.add_namespace(namespace);
                info!(%cn, %namespace, "Adding namespace to collection");
                let res = self.console.replace_collection(&collection).await;
                failures.check("update collection", cn, res);
            }
            None => {
                info!(%cn, %namespace, "Creating collection");
                let doc = self.templates.collection(cn, namespace);
                let res = self.console.create_collection(&doc).await;
                failures.check("create collection", cn, res);
            }
        }
    }

    async fn ensure_group(&self, cn: &str, failures: &mut Failures<'_>) {
        let groups = self.console.list_groups().await.unwrap_or_else(|error| {
            warn!(%cn, %error, "Failed to list groups");
            Vec::new()
        });
        if groups.iter().any(|g| g.group_name == cn) {
            debug!(%cn, "Group exists");
            return;
        }

        info!(%cn, "Creating group");
        let doc = self.templates.group(cn, DEVOPS_ROLE);
        let res = self.console.create_group(&doc).await;
        failures.check("create group", cn, res);
    }

    /// Withdraws `namespace` from the collection named `cn`. When it is the
    /// collection's only namespace, the collection and its group are deleted.
    async fn release(&self, cn: &str, namespace: &str, failures: &mut Failures<'_>) {
        let collections = match self.console.list_collections().await {
            Ok(collections) => collections,
            Err(error) => {
                failures.fail("list collections", cn, error);
                return;
            }
        };
        let Some(mut collection) = collections.into_iter().find(|c| c.name == cn) else {
            debug!(%cn, "No collection to release");
            return;
        };
        if !collection.contains_namespace(namespace) {
            debug!(%cn, %namespace, "Collection does not cover namespace");
            return;
        }

        collection.remove_namespace(namespace);
        if !collection.namespaces.is_empty() {
            info!(%cn, %namespace, "Removing namespace from collection");
            let res = self.console.replace_collection(&collection).await;
            failures.check("update collection", cn, res);
            return;
        }

        info!(%cn, %namespace, "Deleting collection and group");
        match self.console.list_groups().await {
            Ok(groups) if groups.iter().any(|g| g.group_name == cn) => {
                let res = self.console.delete_group(cn).await;
                failures.check("delete group", cn, res);
            }
            Ok(_) => debug!(%cn, "No group to delete"),
            Err(error) => failures.fail("list groups", cn, error),
        }
        let res = self.console.delete_collection(cn).await;
        failures.check("delete collection", cn, res);
    }
}

#[async_trait::async_trait]
impl<C, S> Reconciler<RoleBinding> for ConsoleReconciler<C, S>
where
    C: Console,
    S: RecoveryStore,
{
    fn name(&self) -> &'static str {
        "console"
    }

    async fn init(&self) -> Result<()> {
        match self.console.list_groups().await {
            Ok(groups) => info!(groups = groups.len(), "Connected to console"),
            Err(error) => warn!(%error, "Console is not reachable yet"),
        }
        Ok(())
    }

    async fn object_created(&self, binding: Arc<RoleBinding>) -> Result<()> {
        let key = object_key(&*binding);
        let mut failures = Failures::new(&key);
        failures.check_record(record::save(&self.store, &key, &binding).await);

        let grant = ParsedGrant::parse(&binding, Action::Add);
        if !grant.is_devops() {
            debug!(%key, "Skipping admin binding");
            return failures.into_result();
        }
        for cn in &grant.common_names {
            self.ensure(cn, &grant.namespace, &mut failures).await;
        }
        failures.into_result()
    }

    async fn object_updated(&self, old: Arc<RoleBinding>, new: Arc<RoleBinding>) -> Result<()> {
        let key = object_key(&*new);
        let mut failures = Failures::new(&key);
        failures.check_record(record::save(&self.store, &key, &new).await);

        let old = ParsedGrant::parse(&old, Action::Update);
        let new = ParsedGrant::parse(&new, Action::Update);
        if !new.is_devops() {
            debug!(%key, "Skipping admin binding");
            return failures.into_result();
        }

        let diff = old.diff(&new);
        for cn in &diff.removed {
            self.release(cn, &new.namespace, &mut failures).await;
        }
        for cn in &diff.added {
            self.ensure(cn, &new.namespace, &mut failures).await;
        }
        failures.into_result()
    }

    async fn object_deleted(&self, key: &str) -> Result<()> {
        let Some(binding) = record::load(&self.store, key).await? else {
            info!(%key, "No recovery record; nothing to reconcile");
            return Ok(());
        };

        let mut failures = Failures::new(key);
        let grant = ParsedGrant::parse(&binding, Action::Delete);
        if grant.is_devops() {
            for cn in &grant.common_names {
                self.release(cn, &grant.namespace, &mut failures).await;
            }
        } else {
            debug!(%key, "Skipping admin binding");
        }

        // The record is kept until the console is consistent so that a retry
        // can reconstruct the binding.
        failures.into_result()?;
        self.store.delete(key).await?;
        Ok(())
    }
}

// === impl Failures ===

impl<'k> Failures<'k> {
    fn new(key: &'k str) -> Self {
        Self { key, count: 0 }
    }

    fn check<T, E: fmt::Display>(&mut self, op: &str, cn: &str, res: Result<T, E>) {
        if let Err(error) = res {
            self.fail(op, cn, error);
        }
    }

    fn fail(&mut self, op: &str, cn: &str, error: impl fmt::Display) {
        warn!(key = %self.key, %cn, %error, "Failed to {op}");
        self.count += 1;
    }

    fn check_record(&mut self, res: Result<()>) {
        if let Err(error) = res {
            warn!(
                key = %self.key,
                error = %format_args!("{error:#}"),
                "Failed to store recovery record"
            );
            self.count += 1;
        }
    }

    fn into_result(self) -> Result<()> {
        if self.count > 0 {
            bail!(
                "{} operation(s) failed while reconciling {}",
                self.count,
                self.key
            );
        }
        Ok(())
    }
}
