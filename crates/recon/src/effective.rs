//! Effective-flag projection: the single boolean downstream reporting reads.
//!
//! A row is effectively cancelled when the source flagged it, when it is a
//! leg of an accepted pair (the reversal inherits the flag), or when its
//! whole bucket reconciled as all-cancelled.

use std::collections::HashMap;

use crate::keys::ExcludedRow;
use crate::model::{
    BucketStatus, EffectiveTransaction, EnrichedTransaction, PairId, PairRecord, ReconStatus,
    RowId,
};

pub fn is_cancelled_effective(
    is_cancelled: bool,
    in_pair: bool,
    bucket_status: Option<ReconStatus>,
) -> bool {
    is_cancelled || in_pair || bucket_status == Some(ReconStatus::ReconciledAllCancelled)
}

/// Enriched rows in input order, then excluded rows.
///
/// A malformed row keeps its source flag only. A duplicate copy mirrors the
/// kept row's keys, status and effective flag but is never a pair leg.
pub fn project_effective(
    enriched: &[EnrichedTransaction],
    excluded: &[ExcludedRow],
    pairs: &[PairRecord],
    statuses: &[BucketStatus],
) -> Vec<EffectiveTransaction> {
    let pair_of: HashMap<&RowId, &PairId> = pairs.iter().map(|p| (&p.row_id, &p.pair_id)).collect();
    let status_of: HashMap<_, &BucketStatus> =
        statuses.iter().map(|s| (&s.group_key, s)).collect();

    let mut out = Vec::with_capacity(enriched.len() + excluded.len());

    for row in enriched {
        let pair_id = pair_of.get(&row.row_id).map(|p| (*p).clone());
        let bucket = status_of.get(&row.group_key);
        let status = bucket.map(|b| b.status);

        out.push(EffectiveTransaction {
            record: row.record.clone(),
            row_id: Some(row.row_id.clone()),
            group_key: Some(row.group_key.clone()),
            is_cancelled_effective: is_cancelled_effective(
                row.record.is_cancelled,
                pair_id.is_some(),
                status,
            ),
            pair_id,
            status,
            explanation: bucket.map(|b| b.explanation.clone()),
            is_in_coverage: bucket.map(|b| b.is_in_coverage),
        });
    }

    let kept: HashMap<RowId, usize> = out
        .iter()
        .enumerate()
        .filter_map(|(i, row)| row.row_id.clone().map(|id| (id, i)))
        .collect();

    for row in excluded {
        let twin = row.duplicate_of.as_ref().and_then(|id| kept.get(id)).map(|&i| &out[i]);
        let projected = match twin {
            Some(twin) => EffectiveTransaction {
                record: row.record.clone(),
                row_id: twin.row_id.clone(),
                group_key: twin.group_key.clone(),
                is_cancelled_effective: row.record.is_cancelled || twin.is_cancelled_effective,
                pair_id: None,
                status: twin.status,
                explanation: twin.explanation.clone(),
                is_in_coverage: twin.is_in_coverage,
            },
            None => EffectiveTransaction {
                record: row.record.clone(),
                row_id: None,
                group_key: None,
                is_cancelled_effective: row.record.is_cancelled,
                pair_id: None,
                status: None,
                explanation: None,
                is_in_coverage: None,
            },
        };
        out.push(projected);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amounts, GroupKey, TransactionRecord};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record(id: &str, qty: i64, cancelled: bool) -> TransactionRecord {
        TransactionRecord {
            record_id: id.into(),
            account_id: Some("ACC1".into()),
            security_id: Some("SEC1".into()),
            trade_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            settlement_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            currency: Some("CAD".into()),
            quantity: Some(Decimal::from(qty)),
            cash_amount: None,
            cost: None,
            transaction_type: Some("BUY".into()),
            description: None,
            reference_number: None,
            sequence_number: None,
            is_cancelled: cancelled,
            process_date: None,
        }
    }

    fn enriched(id: &str, group: &str, qty: i64, cancelled: bool) -> EnrichedTransaction {
        EnrichedTransaction {
            record: record(id, qty, cancelled),
            group_key: GroupKey(group.into()),
            row_id: RowId(format!("r_{id}")),
        }
    }

    fn status(group: &str, s: ReconStatus) -> BucketStatus {
        BucketStatus {
            group_key: GroupKey(group.into()),
            is_in_coverage: true,
            status: s,
            explanation: s.explanation().into(),
            total_rows: 2,
            cancelled_rows: 1,
            paired_cancelled_rows: 1,
            min_trade_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            net: Some(Amounts::default()),
            oversized: false,
        }
    }

    #[test]
    fn truth_table() {
        assert!(!is_cancelled_effective(false, false, None));
        assert!(is_cancelled_effective(true, false, None));
        assert!(is_cancelled_effective(false, true, Some(ReconStatus::PairedOk)));
        assert!(is_cancelled_effective(false, false, Some(ReconStatus::ReconciledAllCancelled)));
        assert!(!is_cancelled_effective(false, false, Some(ReconStatus::PairingIncomplete)));
    }

    #[test]
    fn reversal_inherits_cancellation() {
        let rows = vec![
            enriched("x", "g", 100, true),
            enriched("y", "g", -100, false),
            enriched("z", "h", 5, false),
        ];
        let pairs = vec![
            PairRecord { group_key: GroupKey("g".into()), pair_id: PairId("p".into()), row_id: RowId("r_x".into()) },
            PairRecord { group_key: GroupKey("g".into()), pair_id: PairId("p".into()), row_id: RowId("r_y".into()) },
        ];
        let statuses = vec![status("g", ReconStatus::PairedOk)];

        let out = project_effective(&rows, &[], &pairs, &statuses);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_cancelled_effective);
        assert!(out[1].is_cancelled_effective);
        assert_eq!(out[1].pair_id, Some(PairId("p".into())));
        assert_eq!(out[1].status, Some(ReconStatus::PairedOk));

        // Ungated bucket: untouched, no status
        assert!(!out[2].is_cancelled_effective);
        assert_eq!(out[2].status, None);
        assert_eq!(out[2].is_in_coverage, None);
    }

    #[test]
    fn unpaired_active_row_stays_active() {
        let rows = vec![enriched("x", "g", 100, true), enriched("y", "g", 100, false)];
        let statuses = vec![status("g", ReconStatus::PairingIncomplete)];
        let out = project_effective(&rows, &[], &[], &statuses);
        assert!(out[0].is_cancelled_effective);
        assert!(!out[1].is_cancelled_effective);
        assert_eq!(out[1].explanation.as_deref(), Some(ReconStatus::PairingIncomplete.explanation()));
    }

    fn malformed(id: &str, cancelled: bool) -> ExcludedRow {
        let mut record = record(id, 1, cancelled);
        record.currency = None;
        ExcludedRow { record, duplicate_of: None }
    }

    #[test]
    fn malformed_rows_keep_source_flag() {
        let out = project_effective(&[], &[malformed("bad", true), malformed("worse", false)], &[], &[]);
        assert!(out[0].is_cancelled_effective);
        assert!(!out[1].is_cancelled_effective);
        assert!(out.iter().all(|r| r.row_id.is_none() && r.status.is_none()));
    }

    #[test]
    fn duplicate_of_paired_reversal_follows_its_twin() {
        let rows = vec![enriched("x", "g", 100, true), enriched("y", "g", -100, false)];
        let pairs = vec![
            PairRecord { group_key: GroupKey("g".into()), pair_id: PairId("p".into()), row_id: RowId("r_x".into()) },
            PairRecord { group_key: GroupKey("g".into()), pair_id: PairId("p".into()), row_id: RowId("r_y".into()) },
        ];
        let statuses = vec![status("g", ReconStatus::PairedOk)];
        let copy = ExcludedRow { record: record("y-again", -100, false), duplicate_of: Some(RowId("r_y".into())) };

        let out = project_effective(&rows, &[copy], &pairs, &statuses);
        assert_eq!(out.len(), 3);
        assert!(out[1].is_cancelled_effective);
        assert!(out[2].is_cancelled_effective);
        assert_eq!(out[2].row_id, Some(RowId("r_y".into())));
        assert_eq!(out[2].status, Some(ReconStatus::PairedOk));
        assert_eq!(out[2].pair_id, None);
    }
}
