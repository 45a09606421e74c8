use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

/// Queue metric families, registered once and shared by every queue.
#[derive(Clone, Debug, Default)]
pub struct QueueFamilies {
    adds: Family<KindLabels, Counter>,
    retries: Family<KindLabels, Counter>,
    drops: Family<KindLabels, Counter>,
    depth: Family<KindLabels, Gauge>,
}

/// Metrics for a single queue.
#[derive(Clone, Debug, Default)]
pub struct QueueMetrics {
    adds: Counter,
    retries: Counter,
    drops: Counter,
    depth: Gauge,
}

// === impl QueueFamilies ===

impl QueueFamilies {
    pub fn register(prom: &mut Registry) -> Self {
        let adds = Family::default();
        prom.register(
            "queue_adds",
            "Count of items added to a reconciliation queue",
            adds.clone(),
        );

        let retries = Family::default();
        prom.register(
            "queue_retries",
            "Count of items requeued after a failed reconcile",
            retries.clone(),
        );

        let drops = Family::default();
        prom.register(
            "queue_drops",
            "Count of items abandoned after exhausting their retries",
            drops.clone(),
        );

        let depth = Family::default();
        prom.register(
            "queue_depth",
            "Number of keys waiting in a reconciliation queue",
            depth.clone(),
        );

        Self {
            adds,
            retries,
            drops,
            depth,
        }
    }

    pub fn for_kind(&self, kind: &str) -> QueueMetrics {
        let labels = KindLabels {
            kind: kind.to_string(),
        };
        QueueMetrics {
            adds: self.adds.get_or_create(&labels).clone(),
            retries: self.retries.get_or_create(&labels).clone(),
            drops: self.drops.get_or_create(&labels).clone(),
            depth: self.depth.get_or_create(&labels).clone(),
        }
    }
}

// === impl QueueMetrics ===

impl QueueMetrics {
    pub(crate) fn add(&self) {
        self.adds.inc();
    }

    pub(crate) fn retry(&self) {
        self.retries.inc();
    }

    pub(crate) fn drop_item(&self) {
        self.drops.inc();
    }

    pub(crate) fn set_depth(&self, depth: usize) {
        self.depth.set(depth as i64);
    }

    pub fn adds(&self) -> u64 {
        self.adds.get()
    }

    pub fn retries(&self) -> u64 {
        self.retries.get()
    }

    pub fn drops(&self) -> u64 {
        self.drops.get()
    }
}
