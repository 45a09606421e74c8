use crate::{Cache, Dispatcher, ReconcileMetrics};
use anyhow::Result;
use binding_mirror_core::Notification;
use binding_mirror_k8s_api::{Resource, ResourceKind};
use binding_mirror_queue::Queue;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drains one kind's queue into its dispatcher.
///
/// A failed notification is requeued with backoff until it has been retried
/// `max_retries` times, after which it is dropped.
pub struct Worker<K: Send + Sync + 'static> {
    kind: ResourceKind,
    queue: Queue<Notification<K>>,
    cache: Arc<Cache<K>>,
    dispatcher: Dispatcher<K>,
    max_retries: u32,
    metrics: ReconcileMetrics,
}

// === impl Worker ===

impl<K> Worker<K>
where
    K: Resource + Send + Sync + 'static,
{
    pub fn new(
        kind: ResourceKind,
        queue: Queue<Notification<K>>,
        cache: Arc<Cache<K>>,
        dispatcher: Dispatcher<K>,
        max_retries: u32,
        metrics: ReconcileMetrics,
    ) -> Self {
        Self {
            kind,
            queue,
            cache,
            dispatcher,
            max_retries,
            metrics,
        }
    }

    /// Waits for the cache to sync, then processes notifications until
    /// `drain` is signaled. The notification in flight when the signal
    /// arrives is completed before shutdown is released.
    pub async fn run(self, drain: drain::Watch) {
        let mut synced = self.cache.synced();
        let wait_for_sync = async move { synced.wait_for(|synced| *synced).await.is_ok() };
        tokio::select! {
            is_synced = wait_for_sync => {
                if !is_synced {
                    debug!("Cache dropped before syncing");
                    return;
                }
            }
            _ = drain.clone().signaled() => {
                debug!("Shutdown before cache synced");
                self.queue.shutdown();
                return;
            }
        }
        info!("Processing notifications");

        let process = self.process();
        tokio::pin!(process);
        tokio::select! {
            () = &mut process => {}
            handle = drain.signaled() => {
                debug!("Shutting down");
                self.queue.shutdown();
                handle.release_after(process).await;
            }
        }
    }

    async fn process(&self) {
        while let Some(notification) = self.queue.get().await {
            let key = notification.key().to_string();
            let span = info_span!("reconcile", %key, change = notification.change());
            let res = self
                .dispatcher
                .dispatch(notification.clone())
                .instrument(span)
                .await;
            self.handle_result(&key, res, notification);
            self.queue.done(&key);
        }
    }

    fn handle_result(&self, key: &String, res: Result<()>, notification: Notification<K>) {
        let error = match res {
            Ok(()) => {
                self.metrics.record(self.kind.as_str(), true);
                self.queue.forget(key);
                return;
            }
            Err(error) => error,
        };
        self.metrics.record(self.kind.as_str(), false);

        let retries = self.queue.num_requeues(key);
        if retries < self.max_retries {
            warn!(
                %key,
                retries,
                error = %format_args!("{error:#}"),
                "Failed to reconcile; will retry"
            );
            self.queue.add_rate_limited(notification);
            return;
        }

        error!(
            %key,
            retries,
            error = %format_args!("{error:#}"),
            "Failed to reconcile; giving up"
        );
        self.queue.give_up(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binding_mirror_core::Reconciler;
    use binding_mirror_k8s_api::RoleBinding;
    use binding_mirror_queue::{ExponentialBackoff, QueueMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{self, Duration};

    /// Fails every deletion.
    #[derive(Default)]
    struct Failing {
        deletes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Reconciler<RoleBinding> for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn object_created(&self, _: Arc<RoleBinding>) -> Result<()> {
            Ok(())
        }

        async fn object_updated(&self, _: Arc<RoleBinding>, _: Arc<RoleBinding>) -> Result<()> {
            Ok(())
        }

        async fn object_deleted(&self, _: &str) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("console unavailable")
        }
    }

    struct Fixture {
        queue: Queue<Notification<RoleBinding>>,
        cache: Arc<Cache<RoleBinding>>,
        queue_metrics: QueueMetrics,
        reconcile_metrics: ReconcileMetrics,
        reconciler: Arc<Failing>,
        worker: Worker<RoleBinding>,
    }

    fn mk_fixture() -> Fixture {
        let queue_metrics = QueueMetrics::default();
        let reconcile_metrics = ReconcileMetrics::default();
        let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1));
        let queue = Queue::new(backoff, queue_metrics.clone());
        let cache = Cache::new();
        let reconciler = Arc::new(Failing::default());
        let dispatcher = Dispatcher::new(cache.clone(), reconciler.clone(), chrono::Utc::now());
        let worker = Worker::new(
            ResourceKind::RoleBinding,
            queue.clone(),
            cache.clone(),
            dispatcher,
            10,
            reconcile_metrics.clone(),
        );
        Fixture {
            queue,
            cache,
            queue_metrics,
            reconcile_metrics,
            reconciler,
            worker,
        }
    }

    fn deleted(key: &str) -> Notification<RoleBinding> {
        Notification::Deleted {
            key: key.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let Fixture {
            queue,
            cache,
            queue_metrics,
            reconcile_metrics,
            reconciler,
            worker,
        } = mk_fixture();
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(worker.run(drain));

        queue.add(deleted("ns/a"));
        cache.restart(vec![]);
        time::sleep(Duration::from_secs(1)).await;

        // The first attempt plus ten retries.
        assert_eq!(reconciler.deletes.load(Ordering::SeqCst), 11);
        assert_eq!(queue_metrics.retries(), 10);
        assert_eq!(queue_metrics.drops(), 1);
        assert_eq!(reconcile_metrics.get("rolebinding", false), 11);
        assert_eq!(queue.num_requeues(&"ns/a".to_string()), 0);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(reconciler.deletes.load(Ordering::SeqCst), 11);

        signal.drain().await;
        task.await.expect("worker must not panic");
        assert!(queue.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_cache_sync() {
        let Fixture {
            queue,
            cache,
            reconciler,
            worker,
            ..
        } = mk_fixture();
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(worker.run(drain));

        queue.add(deleted("ns/a"));
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reconciler.deletes.load(Ordering::SeqCst), 0);

        cache.restart(vec![]);
        time::sleep(Duration::from_millis(1)).await;
        assert!(reconciler.deletes.load(Ordering::SeqCst) >= 1);

        signal.drain().await;
        task.await.expect("worker must not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_sync_releases() {
        let Fixture { worker, queue, .. } = mk_fixture();
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(worker.run(drain));
        tokio::task::yield_now().await;

        signal.drain().await;
        task.await.expect("worker must not panic");
        assert!(queue.is_shutting_down());
    }

    /// Fails the first update it sees and records every call.
    #[derive(Default)]
    struct FlakyUpdates {
        calls: parking_lot::Mutex<Vec<&'static str>>,
    }

    #[async_trait::async_trait]
    impl Reconciler<RoleBinding> for FlakyUpdates {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn object_created(&self, _: Arc<RoleBinding>) -> Result<()> {
            self.calls.lock().push("create");
            Ok(())
        }

        async fn object_updated(&self, _: Arc<RoleBinding>, _: Arc<RoleBinding>) -> Result<()> {
            let mut calls = self.calls.lock();
            if calls.contains(&"update-fail") {
                calls.push("update-ok");
                return Ok(());
            }
            calls.push("update-fail");
            anyhow::bail!("console unavailable")
        }

        async fn object_deleted(&self, _: &str) -> Result<()> {
            self.calls.lock().push("delete-ok");
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_supersedes_update_waiting_to_retry() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let queue = Queue::new(backoff, QueueMetrics::default());
        let cache = Cache::new();
        let reconciler = Arc::new(FlakyUpdates::default());
        let dispatcher = Dispatcher::new(cache.clone(), reconciler.clone(), chrono::Utc::now());
        let worker = Worker::new(
            ResourceKind::RoleBinding,
            queue.clone(),
            cache.clone(),
            dispatcher,
            10,
            ReconcileMetrics::default(),
        );
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(worker.run(drain));
        cache.restart(vec![]);

        let binding = Arc::new(RoleBinding::default());
        queue.add(Notification::Updated {
            key: "ns/a".to_string(),
            old: binding.clone(),
            new: binding,
        });
        time::sleep(Duration::from_millis(10)).await;
        queue.add(deleted("ns/a"));
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*reconciler.calls.lock(), vec!["update-fail", "delete-ok"]);

        signal.drain().await;
        task.await.expect("worker must not panic");
    }
}
