//! Prometheus metrics definitions

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    /// Total number of security group reconciliation passes
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "openstack_cluster_operator_reconciliations_total",
        "Total number of security group reconciliation passes",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "openstack_cluster_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "openstack_cluster_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Remote security group and rule operations by outcome
    pub static ref SECURITY_GROUP_OPERATIONS: CounterVec = register_counter_vec!(
        "openstack_cluster_operator_security_group_operations_total",
        "Remote security group operations by operation and outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Object conversions by version pair and outcome
    pub static ref CONVERSIONS: CounterVec = register_counter_vec!(
        "openstack_cluster_operator_conversions_total",
        "Object conversions by source version, target version and outcome",
        &["from", "to", "outcome"]
    ).unwrap();

    /// Restore records applied or skipped during conversion
    pub static ref RESTORED_FIELDS: CounterVec = register_counter_vec!(
        "openstack_cluster_operator_restored_fields_total",
        "Restore records applied during conversion by field group and outcome",
        &["field", "outcome"]
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text_includes_counters() {
        SECURITY_GROUP_OPERATIONS
            .with_label_values(&["create_rule", "success"])
            .inc();

        let text = gather_text().unwrap();
        assert!(text.contains("openstack_cluster_operator_security_group_operations_total"));
    }
}
