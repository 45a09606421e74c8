use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    kind: String,
    result: ReconcileResult,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum ReconcileResult {
    Ok,
    Error,
}

/// Counts reconcile attempts by resource kind and outcome.
#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<ReconcileLabels, Counter>,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of reconcile attempts by resource kind and result",
            reconciles.clone(),
        );
        Self { reconciles }
    }

    pub(crate) fn record(&self, kind: &str, ok: bool) {
        let result = if ok {
            ReconcileResult::Ok
        } else {
            ReconcileResult::Error
        };
        self.reconciles
            .get_or_create(&ReconcileLabels {
                kind: kind.to_string(),
                result,
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn get(&self, kind: &str, ok: bool) -> u64 {
        let result = if ok {
            ReconcileResult::Ok
        } else {
            ReconcileResult::Error
        };
        self.reconciles
            .get_or_create(&ReconcileLabels {
                kind: kind.to_string(),
                result,
            })
            .get()
    }
}
