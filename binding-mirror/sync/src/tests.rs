use crate::{ConsoleReconciler, ConsoleSettings, ReconcilerName, Registry};
use binding_mirror_console::{Collection, Console, Error, Group, Templates};
use binding_mirror_core::Reconciler;
use binding_mirror_k8s_api::{ObjectMeta, RoleBinding, RoleRef, Subject};
use binding_mirror_store::{MemoryStore, RecoveryStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// An in-memory console that records every mutation.
#[derive(Default)]
struct FakeConsole {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    collections: Vec<Collection>,
    groups: Vec<Group>,
    mutations: Vec<String>,
    fail_lists: bool,
    fail_mutations: bool,
}

type TestReconciler = ConsoleReconciler<Arc<FakeConsole>, MemoryStore>;

fn unavailable(path: &str) -> Error {
    Error::Status {
        method: reqwest::Method::GET,
        path: path.to_string(),
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    }
}

// === impl FakeConsole ===

impl FakeConsole {
    fn with_collection(self, name: &str, namespaces: &[&str]) -> Self {
        self.state.lock().collections.push(Collection {
            name: name.to_string(),
            namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
            ..Default::default()
        });
        self
    }

    fn with_group(self, name: &str) -> Self {
        self.state.lock().groups.push(Group {
            group_name: name.to_string(),
            ..Default::default()
        });
        self
    }

    fn collection(&self, name: &str) -> Option<Collection> {
        let state = self.state.lock();
        state.collections.iter().find(|c| c.name == name).cloned()
    }

    fn collection_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.collections.iter().map(|c| c.name.clone()).collect()
    }

    fn group_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.groups.iter().map(|g| g.group_name.clone()).collect()
    }

    fn take_mutations(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().mutations)
    }

    fn set_fail_mutations(&self, fail: bool) {
        self.state.lock().fail_mutations = fail;
    }

    fn set_fail_lists(&self, fail: bool) {
        self.state.lock().fail_lists = fail;
    }

    fn mutate(&self, call: String, f: impl FnOnce(&mut State)) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.mutations.push(call.clone());
        if state.fail_mutations {
            return Err(unavailable(&call));
        }
        f(&mut state);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Console for FakeConsole {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        let state = self.state.lock();
        if state.fail_lists {
            return Err(unavailable("collections"));
        }
        Ok(state.collections.clone())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Error> {
        let state = self.state.lock();
        if state.fail_lists {
            return Err(unavailable("groups"));
        }
        Ok(state.groups.clone())
    }

    async fn create_collection(&self, doc: &Value) -> Result<(), Error> {
        let collection: Collection = serde_json::from_value(doc.clone())?;
        self.mutate(format!("create collection {}", collection.name), |state| {
            state.collections.push(collection)
        })
    }

    async fn create_group(&self, doc: &Value) -> Result<(), Error> {
        let group: Group = serde_json::from_value(doc.clone())?;
        self.mutate(format!("create group {}", group.group_name), |state| {
            state.groups.push(group)
        })
    }

    async fn replace_collection(&self, collection: &Collection) -> Result<(), Error> {
        let collection = collection.clone();
        self.mutate(format!("update collection {}", collection.name), |state| {
            if let Some(c) = state
                .collections
                .iter_mut()
                .find(|c| c.name == collection.name)
            {
                *c = collection;
            }
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<(), Error> {
        self.mutate(format!("delete collection {name}"), |state| {
            state.collections.retain(|c| c.name != name)
        })
    }

    async fn delete_group(&self, name: &str) -> Result<(), Error> {
        self.mutate(format!("delete group {name}"), |state| {
            state.groups.retain(|g| g.group_name != name)
        })
    }
}

fn mk_reconciler(console: FakeConsole) -> (TestReconciler, Arc<FakeConsole>, MemoryStore) {
    let console = Arc::new(console);
    let store = MemoryStore::default();
    let reconciler = ConsoleReconciler::new(console.clone(), store.clone(), Templates::default());
    (reconciler, console, store)
}

fn mk_binding(ns: &str, name: &str, groups: &[&str]) -> Arc<RoleBinding> {
    let subjects = groups
        .iter()
        .map(|group| Subject {
            kind: "Group".to_string(),
            name: group.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            ..Default::default()
        })
        .collect();
    Arc::new(RoleBinding {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "edit".to_string(),
        },
        subjects: Some(subjects),
    })
}

fn dn(cn: &str) -> String {
    format!("CN={cn},OU=Groups,DC=example,DC=com")
}

fn devops(ns: &str, cns: &[&str]) -> Arc<RoleBinding> {
    let groups = cns.iter().map(|cn| dn(cn)).collect::<Vec<_>>();
    let groups = groups.iter().map(String::as_str).collect::<Vec<_>>();
    mk_binding(ns, "devs", &groups)
}

#[tokio::test]
async fn create_is_idempotent() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    let binding = devops("payments", &["payments-devops"]);

    reconciler
        .object_created(binding.clone())
        .await
        .expect("create must succeed");
    assert_eq!(
        console.take_mutations(),
        vec![
            "create collection payments-devops",
            "create group payments-devops",
        ]
    );
    assert_eq!(
        console.collection("payments-devops").unwrap().namespaces,
        vec!["payments"]
    );
    assert!(store.contains("payments/devs"));

    reconciler
        .object_created(binding)
        .await
        .expect("create must succeed");
    assert!(console.take_mutations().is_empty());
    assert_eq!(console.collection_names(), vec!["payments-devops"]);
    assert_eq!(console.group_names(), vec!["payments-devops"]);
}

#[tokio::test]
async fn create_adds_namespace_to_existing_collection() {
    let (reconciler, console, _) = mk_reconciler(
        FakeConsole::default()
            .with_collection("ops", &["billing"])
            .with_group("ops"),
    );

    reconciler
        .object_created(devops("payments", &["ops"]))
        .await
        .expect("create must succeed");
    assert_eq!(console.take_mutations(), vec!["update collection ops"]);
    assert_eq!(
        console.collection("ops").unwrap().namespaces,
        vec!["billing", "payments"]
    );
}

#[tokio::test]
async fn admin_bindings_are_recorded_but_not_mirrored() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    let binding = mk_binding("payments", "admins", &[&dn("payments-admins")]);

    reconciler
        .object_created(binding.clone())
        .await
        .expect("create must succeed");
    reconciler
        .object_updated(binding.clone(), binding)
        .await
        .expect("update must succeed");
    assert!(console.take_mutations().is_empty());
    assert!(console.collection_names().is_empty());
    assert!(store.contains("payments/admins"));
}

#[tokio::test]
async fn update_applies_membership_diff() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    let old = devops("payments", &["A", "B"]);
    reconciler
        .object_created(old.clone())
        .await
        .expect("create must succeed");
    console.take_mutations();

    let new = devops("payments", &["B", "C"]);
    reconciler
        .object_updated(old, new)
        .await
        .expect("update must succeed");

    let mutations = console.take_mutations();
    assert_eq!(
        mutations,
        vec![
            "delete group A",
            "delete collection A",
            "create collection C",
            "create group C",
        ]
    );
    assert!(mutations.iter().all(|m| !m.ends_with(" B")));
    assert_eq!(console.collection_names(), vec!["B", "C"]);
    assert_eq!(console.group_names(), vec!["B", "C"]);

    // The record now reflects the new binding.
    let record = store.get("payments/devs").await.unwrap().unwrap();
    let recorded: RoleBinding = serde_json::from_slice(&record).unwrap();
    assert_eq!(recorded.subjects.unwrap().len(), 2);
    assert!(String::from_utf8(record).unwrap().contains("CN=C,"));
}

#[tokio::test]
async fn delete_shrinks_shared_collection() {
    let (reconciler, console, store) = mk_reconciler(
        FakeConsole::default()
            .with_collection("ops", &["payments", "billing"])
            .with_group("ops"),
    );
    let binding = devops("payments", &["ops"]);
    store
        .put("payments/devs", serde_json::to_vec(&*binding).unwrap())
        .await
        .unwrap();

    reconciler
        .object_deleted("payments/devs")
        .await
        .expect("delete must succeed");
    assert_eq!(console.take_mutations(), vec!["update collection ops"]);
    assert_eq!(console.collection("ops").unwrap().namespaces, vec!["billing"]);
    assert_eq!(console.group_names(), vec!["ops"]);
    assert!(!store.contains("payments/devs"));
}

#[tokio::test]
async fn delete_removes_collection_and_group_for_last_namespace() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    let binding = devops("payments", &["ops"]);
    reconciler
        .object_created(binding)
        .await
        .expect("create must succeed");
    console.take_mutations();

    reconciler
        .object_deleted("payments/devs")
        .await
        .expect("delete must succeed");
    assert_eq!(
        console.take_mutations(),
        vec!["delete group ops", "delete collection ops"]
    );
    assert!(console.collection_names().is_empty());
    assert!(console.group_names().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn delete_without_record_makes_no_calls() {
    let (reconciler, console, _) =
        mk_reconciler(FakeConsole::default().with_collection("ops", &["payments"]));
    reconciler
        .object_deleted("payments/devs")
        .await
        .expect("delete must succeed");
    assert!(console.take_mutations().is_empty());
    assert_eq!(console.collection_names(), vec!["ops"]);
}

#[tokio::test]
async fn unreadable_record_is_discarded() {
    let (reconciler, console, store) =
        mk_reconciler(FakeConsole::default().with_collection("ops", &["payments"]));
    store
        .put("payments/devs", b"not a binding".to_vec())
        .await
        .unwrap();

    reconciler
        .object_deleted("payments/devs")
        .await
        .expect("delete must succeed");
    assert!(console.take_mutations().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_record_for_retry() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    reconciler
        .object_created(devops("payments", &["ops"]))
        .await
        .expect("create must succeed");
    console.take_mutations();

    console.set_fail_mutations(true);
    reconciler
        .object_deleted("payments/devs")
        .await
        .expect_err("delete must fail");
    assert!(store.contains("payments/devs"));
    // Both deletions were attempted despite the first failing.
    assert_eq!(
        console.take_mutations(),
        vec!["delete group ops", "delete collection ops"]
    );

    console.set_fail_mutations(false);
    reconciler
        .object_deleted("payments/devs")
        .await
        .expect("retry must succeed");
    assert!(store.is_empty());
    assert!(console.collection_names().is_empty());
}

#[tokio::test]
async fn create_attempts_every_mutation_before_failing() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    console.set_fail_mutations(true);

    reconciler
        .object_created(devops("payments", &["A", "B"]))
        .await
        .expect_err("create must fail");
    assert_eq!(
        console.take_mutations(),
        vec![
            "create collection A",
            "create group A",
            "create collection B",
            "create group B",
        ]
    );
    // The record is written independently of the console.
    assert!(store.contains("payments/devs"));
}

#[tokio::test]
async fn unreadable_listings_fall_back_to_creation() {
    let (reconciler, console, _) = mk_reconciler(
        FakeConsole::default()
            .with_collection("ops", &["payments"])
            .with_group("ops"),
    );
    console.set_fail_lists(true);

    reconciler
        .object_created(devops("payments", &["ops"]))
        .await
        .expect("create must succeed");
    assert_eq!(
        console.take_mutations(),
        vec!["create collection ops", "create group ops"]
    );
}

#[tokio::test]
async fn release_fails_when_collections_cannot_be_listed() {
    let (reconciler, console, store) = mk_reconciler(FakeConsole::default());
    reconciler
        .object_created(devops("payments", &["ops"]))
        .await
        .expect("create must succeed");
    console.take_mutations();

    console.set_fail_lists(true);
    reconciler
        .object_deleted("payments/devs")
        .await
        .expect_err("delete must fail");
    assert!(console.take_mutations().is_empty());
    assert!(store.contains("payments/devs"));
}

#[test]
fn parses_reconciler_names() {
    assert_eq!("".parse::<ReconcilerName>().unwrap(), ReconcilerName::Log);
    assert_eq!("log".parse::<ReconcilerName>().unwrap(), ReconcilerName::Log);
    assert_eq!(
        "Console".parse::<ReconcilerName>().unwrap(),
        ReconcilerName::Console
    );
    assert_eq!(
        "twistlock".parse::<ReconcilerName>().unwrap(),
        ReconcilerName::Console
    );
    assert!("webhook".parse::<ReconcilerName>().is_err());
}

#[tokio::test]
async fn registry_selects_reconcilers() {
    let registry = Registry::default();
    let log = registry
        .bindings(ReconcilerName::Log)
        .await
        .expect("log reconciler must build");
    assert_eq!(log.name(), "log");
    assert_eq!(registry.log_only::<RoleBinding>().name(), "log");

    let error = registry
        .bindings(ReconcilerName::Console)
        .await
        .err()
        .expect("console reconciler must require settings");
    assert!(error.to_string().contains("console URL"), "{error}");
}

#[tokio::test]
async fn registry_builds_console_reconciler() {
    let registry = Registry::new(ConsoleSettings {
        url: Some("http://127.0.0.1:1".to_string()),
        user: Some("admin".to_string()),
        password: Some("secret".to_string()),
        timeout: std::time::Duration::from_secs(1),
        store_endpoints: vec!["127.0.0.1:2379".to_string()],
        store_timeout: std::time::Duration::from_secs(1),
        ..Default::default()
    });
    // An unreachable console does not prevent startup.
    let reconciler = registry
        .bindings(ReconcilerName::Console)
        .await
        .expect("console reconciler must build");
    assert_eq!(reconciler.name(), "console");
}
