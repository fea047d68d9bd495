use log::{debug, info, warn};
use rayon::prelude::*;

use crate::audit::{audit_outputs, AuditFinding, AuditReport, FindingKind};
use crate::buckets::{gated_buckets, reconcile_bucket};
use crate::candidates::candidate_edges;
use crate::cast::{cast_boolean, cast_date, cast_decimal, cast_integer, cast_string, CastResult};
use crate::config::{InputConfig, ReconConfig};
use crate::effective::project_effective;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::keys::derive_all;
use crate::model::{
    BucketStatus, EnrichedTransaction, GroupKey, PairRecord, ReconInput, ReconMeta, ReconResult,
    TransactionRecord,
};
use crate::pairing::resolve_pairs;

/// Run reconciliation per config. Pure full recompute over `input`.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;

    let derivation = derive_all(&input.records, &config.transaction_types);
    let buckets: Vec<(&GroupKey, Vec<&EnrichedTransaction>)> =
        gated_buckets(&derivation.enriched).into_iter().collect();

    let outcomes: Vec<BucketOutcome> = if config.parallel {
        buckets
            .par_iter()
            .map(|(key, rows)| reconcile_one(key, rows, config))
            .collect()
    } else {
        buckets
            .iter()
            .map(|(key, rows)| reconcile_one(key, rows, config))
            .collect()
    };

    let mut findings: Vec<AuditFinding> = input.load_findings.clone();
    findings.extend(derivation.findings);

    let mut pairs: Vec<PairRecord> = Vec::new();
    let mut statuses: Vec<BucketStatus> = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if outcome.status.oversized {
            findings.push(
                AuditFinding::new(
                    FindingKind::OversizedBucket,
                    format!(
                        "{} rows exceed max_bucket_size {}; pairing skipped",
                        outcome.status.total_rows, config.max_bucket_size
                    ),
                )
                .with_group(&outcome.status.group_key),
            );
        }
        if outcome.status.net.is_none() {
            findings.push(
                AuditFinding::new(
                    FindingKind::NetOverflow,
                    "bucket amounts overflow when summed; treated as non-zero",
                )
                .with_group(&outcome.status.group_key),
            );
        }
        pairs.extend(outcome.pairs);
        statuses.push(outcome.status);
    }
    pairs.sort();
    statuses.sort_by(|a, b| a.group_key.cmp(&b.group_key));

    let effective = project_effective(&derivation.enriched, &derivation.excluded, &pairs, &statuses);

    findings.extend(audit_outputs(
        &derivation.enriched,
        &pairs,
        &statuses,
        config.cutover_date,
    ));
    let audit = AuditReport::from_findings(findings);

    let summary = compute_summary(
        input.records.len(),
        derivation.enriched.len(),
        &pairs,
        &statuses,
        &effective,
        &audit,
    );

    info!(
        "recon '{}': {} rows, {} buckets, {} pairs, {} blocking, {} warnings",
        config.name,
        summary.input_rows,
        summary.buckets,
        summary.pairs,
        summary.blocking_findings,
        summary.warnings
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            cutover_date: config.cutover_date,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        enriched: derivation.enriched,
        pairs,
        statuses,
        effective,
        audit,
    })
}

struct BucketOutcome {
    pairs: Vec<PairRecord>,
    status: BucketStatus,
}

fn reconcile_one(
    group_key: &GroupKey,
    rows: &[&EnrichedTransaction],
    config: &ReconConfig,
) -> BucketOutcome {
    let oversized = rows.len() > config.max_bucket_size;
    let pairs = if oversized {
        warn!(
            "bucket {group_key}: {} rows exceed max_bucket_size {}, skipping pairing",
            rows.len(),
            config.max_bucket_size
        );
        Vec::new()
    } else {
        let edges = candidate_edges(rows);
        resolve_pairs(group_key, rows, &edges)
    };

    let status = reconcile_bucket(group_key, rows, &pairs, config.cutover_date, oversized);
    debug!(
        "bucket {group_key}: {} rows, {} cancelled, {} paired -> {}",
        status.total_rows, status.cancelled_rows, status.paired_cancelled_rows, status.status
    );

    BucketOutcome { pairs, status }
}

// ---------------------------------------------------------------------------
// CSV loading
// ---------------------------------------------------------------------------

struct ColumnIndex {
    record_id: usize,
    account_id: usize,
    security_id: usize,
    trade_date: usize,
    settlement_date: usize,
    currency: usize,
    quantity: usize,
    cash_amount: usize,
    cost: usize,
    transaction_type: usize,
    description: usize,
    reference_number: usize,
    sequence_number: usize,
    is_cancelled: usize,
    process_date: usize,
}

/// Load CSV rows into `TransactionRecord`s, applying column mapping and casting.
///
/// Values that are present but cannot be cast become null and are reported
/// as `CastFailure` findings. Structural problems (missing column, ragged
/// record) are errors.
pub fn load_csv_rows(csv_data: &str, input: &InputConfig) -> Result<ReconInput, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(input.delimiter as u8)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let idx = |name: &str| -> Result<usize, ReconError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconError::MissingColumn { column: name.into() })
    };

    let col = &input.columns;
    let at = ColumnIndex {
        record_id: idx(&col.record_id)?,
        account_id: idx(&col.account_id)?,
        security_id: idx(&col.security_id)?,
        trade_date: idx(&col.trade_date)?,
        settlement_date: idx(&col.settlement_date)?,
        currency: idx(&col.currency)?,
        quantity: idx(&col.quantity)?,
        cash_amount: idx(&col.cash_amount)?,
        cost: idx(&col.cost)?,
        transaction_type: idx(&col.transaction_type)?,
        description: idx(&col.description)?,
        reference_number: idx(&col.reference_number)?,
        sequence_number: idx(&col.sequence_number)?,
        is_cancelled: idx(&col.is_cancelled)?,
        process_date: idx(&col.process_date)?,
    };

    let mut loaded = ReconInput::default();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |i: usize| record.get(i).unwrap_or("");

        let record_id = field(at.record_id).trim().to_string();
        let mut failures = CastFailures {
            findings: &mut loaded.load_findings,
            record_id: &record_id,
            line,
        };

        let decimal = |i: usize| cast_decimal(field(i), &input.decimal);
        let date = |i: usize| cast_date(field(i), &input.dates);

        let row = TransactionRecord {
            account_id: cast_string(field(at.account_id)),
            security_id: cast_string(field(at.security_id)),
            trade_date: failures.take(&col.trade_date, date(at.trade_date)),
            settlement_date: failures.take(&col.settlement_date, date(at.settlement_date)),
            currency: cast_string(field(at.currency)),
            quantity: failures.take(&col.quantity, decimal(at.quantity)),
            cash_amount: failures.take(&col.cash_amount, decimal(at.cash_amount)),
            cost: failures.take(&col.cost, decimal(at.cost)),
            transaction_type: cast_string(field(at.transaction_type)),
            description: cast_string(field(at.description)),
            reference_number: cast_string(field(at.reference_number)),
            sequence_number: failures
                .take(&col.sequence_number, cast_integer(field(at.sequence_number))),
            is_cancelled: failures
                .take(&col.is_cancelled, cast_boolean(field(at.is_cancelled), &input.boolean))
                .unwrap_or(false),
            process_date: failures.take(&col.process_date, date(at.process_date)),
            record_id,
        };

        loaded.records.push(row);
    }

    debug!(
        "loaded {} rows ({} cast failures)",
        loaded.records.len(),
        loaded.load_findings.len()
    );
    Ok(loaded)
}

struct CastFailures<'a> {
    findings: &'a mut Vec<AuditFinding>,
    record_id: &'a str,
    line: u64,
}

impl CastFailures<'_> {
    fn take<T>(&mut self, column: &str, result: CastResult<T>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(reason) => {
                warn!("line {}: column '{column}': {reason}", self.line);
                self.findings.push(
                    AuditFinding::new(
                        FindingKind::CastFailure,
                        format!("line {}: column '{column}': {reason}", self.line),
                    )
                    .with_record(self.record_id),
                );
                None
            }
        }
    }
}
