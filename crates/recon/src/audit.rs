//! Invariant auditor — structural checks over materialized run output.
//!
//! Runs against the output tables only (enriched rows, pairs, statuses),
//! so a defect in the resolver cannot hide itself from the audit.
//!
//! Blocking findings mean an algorithm defect and prevent promotion of the
//! run's output. Warnings are data-quality or coverage issues that need
//! manual investigation but never stop a run.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use log::{error, warn};
use serde::Serialize;

use crate::model::{
    Amounts, BucketStatus, EnrichedTransaction, GroupKey, PairId, PairRecord, ReconStatus, RowId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A row appears in more than one pair.
    DuplicatePairMembership,
    /// A pair_id without exactly two legs, or a leg that is not a known row.
    MalformedPair,
    /// A pair whose legs do not sum to zero on quantity, cash and cost.
    NonZeroPair,
    /// More than one status row for a GroupKey.
    DuplicateBucketStatus,
    /// In-coverage cancelled row not covered by any pair.
    CoverageGap,
    PreCutoverOrphan,
    /// Row missing a required identity field; excluded from reconciliation.
    MalformedRow,
    DuplicateRowIdentity,
    OversizedBucket,
    /// Bucket amounts overflow when summed; the bucket cannot net to zero.
    NetOverflow,
    CastFailure,
}

impl FindingKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicatePairMembership
            | Self::MalformedPair
            | Self::NonZeroPair
            | Self::DuplicateBucketStatus => Severity::Blocking,
            Self::CoverageGap
            | Self::PreCutoverOrphan
            | Self::MalformedRow
            | Self::DuplicateRowIdentity
            | Self::OversizedBucket
            | Self::NetOverflow
            | Self::CastFailure => Severity::Warning,
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DuplicatePairMembership => "duplicate_pair_membership",
            Self::MalformedPair => "malformed_pair",
            Self::NonZeroPair => "non_zero_pair",
            Self::DuplicateBucketStatus => "duplicate_bucket_status",
            Self::CoverageGap => "coverage_gap",
            Self::PreCutoverOrphan => "pre_cutover_orphan",
            Self::MalformedRow => "malformed_row",
            Self::DuplicateRowIdentity => "duplicate_row_identity",
            Self::OversizedBucket => "oversized_bucket",
            Self::NetOverflow => "net_overflow",
            Self::CastFailure => "cast_failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AuditFinding {
    pub severity: Severity,
    pub kind: FindingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_key: Option<GroupKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<PairId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<RowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub detail: String,
}

impl AuditFinding {
    pub fn new(kind: FindingKind, detail: impl Into<String>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            group_key: None,
            pair_id: None,
            row_id: None,
            record_id: None,
            detail: detail.into(),
        }
    }

    pub fn with_group(mut self, group_key: &GroupKey) -> Self {
        self.group_key = Some(group_key.clone());
        self
    }

    pub fn with_pair(mut self, pair_id: &PairId) -> Self {
        self.pair_id = Some(pair_id.clone());
        self
    }

    pub fn with_row(mut self, row_id: &RowId) -> Self {
        self.row_id = Some(row_id.clone());
        self
    }

    pub fn with_record(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub passed: bool,
    pub blocking: usize,
    pub warnings: usize,
    pub counts: BTreeMap<String, usize>,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    /// Sorts findings (blocking first) and tallies them.
    pub fn from_findings(mut findings: Vec<AuditFinding>) -> Self {
        findings.sort();
        let blocking = findings.iter().filter(|f| f.is_blocking()).count();
        let mut counts = BTreeMap::new();
        for f in &findings {
            *counts.entry(f.kind.to_string()).or_insert(0) += 1;
        }
        Self {
            passed: blocking == 0,
            blocking,
            warnings: findings.len() - blocking,
            counts,
            findings,
        }
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.counts.get(&kind.to_string()).copied().unwrap_or(0)
    }

    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }
}

/// Check the materialized output of one run.
pub fn audit_outputs(
    enriched: &[EnrichedTransaction],
    pairs: &[PairRecord],
    statuses: &[BucketStatus],
    cutover_date: NaiveDate,
) -> Vec<AuditFinding> {
    let mut findings = Vec::new();

    let rows: HashMap<&RowId, &EnrichedTransaction> =
        enriched.iter().map(|r| (&r.row_id, r)).collect();

    // One-to-one: each row in at most one pair
    let mut memberships: BTreeMap<&RowId, Vec<&PairId>> = BTreeMap::new();
    for leg in pairs {
        memberships.entry(&leg.row_id).or_default().push(&leg.pair_id);
    }
    for (row_id, pair_ids) in &memberships {
        let mut distinct = pair_ids.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() > 1 || pair_ids.len() > distinct.len() {
            findings.push(
                AuditFinding::new(
                    FindingKind::DuplicatePairMembership,
                    format!("row appears in {} pair legs", pair_ids.len()),
                )
                .with_row(row_id),
            );
        }
    }

    // Two legs per pair, summing to zero
    let mut legs: BTreeMap<&PairId, Vec<&PairRecord>> = BTreeMap::new();
    for leg in pairs {
        legs.entry(&leg.pair_id).or_default().push(leg);
    }
    for (pair_id, pair_legs) in &legs {
        if pair_legs.len() != 2 {
            findings.push(
                AuditFinding::new(
                    FindingKind::MalformedPair,
                    format!("pair has {} legs, expected 2", pair_legs.len()),
                )
                .with_pair(pair_id)
                .with_group(&pair_legs[0].group_key),
            );
            continue;
        }

        let mut net = Some(Amounts::default());
        let mut complete = true;
        for leg in pair_legs {
            match rows.get(&leg.row_id) {
                Some(row) => net = net.and_then(|n| n.checked_add(&row.record.amounts())),
                None => {
                    complete = false;
                    findings.push(
                        AuditFinding::new(FindingKind::MalformedPair, "pair leg is not a reconciled row")
                            .with_pair(pair_id)
                            .with_row(&leg.row_id),
                    );
                }
            }
        }
        if !complete {
            continue;
        }
        let detail = match net {
            Some(n) if n.is_zero() => continue,
            Some(n) => format!("legs net to quantity={} cash={} cost={}", n.quantity, n.cash, n.cost),
            None => "legs overflow when summed".to_string(),
        };
        findings.push(
            AuditFinding::new(FindingKind::NonZeroPair, detail)
                .with_pair(pair_id)
                .with_group(&pair_legs[0].group_key),
        );
    }

    // Single status per bucket
    let mut status_rows: BTreeMap<&GroupKey, usize> = BTreeMap::new();
    for s in statuses {
        *status_rows.entry(&s.group_key).or_insert(0) += 1;
    }
    for (group_key, n) in &status_rows {
        if *n > 1 {
            findings.push(
                AuditFinding::new(
                    FindingKind::DuplicateBucketStatus,
                    format!("{n} status rows for one bucket"),
                )
                .with_group(group_key),
            );
        }
    }

    // Coverage: in-coverage buckets, bypass excluded
    let status_by_key: HashMap<&GroupKey, &BucketStatus> =
        statuses.iter().map(|s| (&s.group_key, s)).collect();
    for row in enriched.iter().filter(|r| r.record.is_cancelled) {
        let Some(status) = status_by_key.get(&row.group_key) else {
            continue;
        };
        if status.min_trade_date < cutover_date
            || status.status == ReconStatus::ReconciledAllCancelled
        {
            continue;
        }
        if !memberships.contains_key(&row.row_id) {
            findings.push(
                AuditFinding::new(
                    FindingKind::CoverageGap,
                    "cancelled row has no paired reversal",
                )
                .with_group(&row.group_key)
                .with_row(&row.row_id)
                .with_record(&row.record.record_id),
            );
        }
    }

    for status in statuses.iter().filter(|s| s.status == ReconStatus::OrphanPreCutover) {
        findings.push(
            AuditFinding::new(
                FindingKind::PreCutoverOrphan,
                format!(
                    "{} of {} cancelled rows unpaired; earliest trade date {}",
                    status.cancelled_rows - status.paired_cancelled_rows,
                    status.cancelled_rows,
                    status.min_trade_date
                ),
            )
            .with_group(&status.group_key),
        );
    }

    for f in &findings {
        match f.severity {
            Severity::Blocking => error!("audit: {} {}", f.kind, f.detail),
            Severity::Warning => warn!("audit: {} {}", f.kind, f.detail),
        }
    }

    findings
}
