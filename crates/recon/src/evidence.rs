use std::collections::BTreeMap;

use crate::audit::AuditReport;
use crate::model::{BucketStatus, EffectiveTransaction, PairRecord, ReconStatus, ReconSummary};

/// Compute run-level counters from the materialized output.
pub fn compute_summary(
    input_rows: usize,
    reconciled_rows: usize,
    pairs: &[PairRecord],
    statuses: &[BucketStatus],
    effective: &[EffectiveTransaction],
    audit: &AuditReport,
) -> ReconSummary {
    let mut status_counts: BTreeMap<String, usize> =
        ReconStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
    for s in statuses {
        *status_counts.entry(s.status.to_string()).or_insert(0) += 1;
    }

    ReconSummary {
        input_rows,
        reconciled_rows,
        excluded_rows: input_rows - reconciled_rows,
        buckets: statuses.len(),
        pairs: pairs.len() / 2,
        effective_cancelled: effective.iter().filter(|r| r.is_cancelled_effective).count(),
        inherited_cancellations: effective
            .iter()
            .filter(|r| r.is_cancelled_effective && !r.record.is_cancelled)
            .count(),
        status_counts,
        blocking_findings: audit.blocking,
        warnings: audit.warnings,
    }
}
