use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::model::{Amounts, BucketStatus, EnrichedTransaction, GroupKey, PairRecord, ReconStatus, RowId};

/// Group rows by `GroupKey`, keeping only buckets with at least one cancelled row.
pub fn gated_buckets(enriched: &[EnrichedTransaction]) -> BTreeMap<&GroupKey, Vec<&EnrichedTransaction>> {
    let mut buckets: BTreeMap<&GroupKey, Vec<&EnrichedTransaction>> = BTreeMap::new();
    for row in enriched {
        buckets.entry(&row.group_key).or_default().push(row);
    }
    buckets.retain(|_, rows| rows.iter().any(|r| r.record.is_cancelled));
    buckets
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMetrics {
    pub total_rows: usize,
    pub cancelled_rows: usize,
    pub paired_cancelled_rows: usize,
    pub min_trade_date: NaiveDate,
    /// `None` when the sum overflows; never treated as zero.
    pub net: Option<Amounts>,
}

impl BucketMetrics {
    pub fn measure(rows: &[&EnrichedTransaction], paired: &HashSet<&RowId>) -> Self {
        let cancelled = rows.iter().filter(|r| r.record.is_cancelled);
        Self {
            total_rows: rows.len(),
            cancelled_rows: cancelled.clone().count(),
            paired_cancelled_rows: cancelled.filter(|r| paired.contains(&r.row_id)).count(),
            // Validated rows always carry a trade date.
            min_trade_date: rows
                .iter()
                .filter_map(|r| r.record.trade_date)
                .min()
                .unwrap_or(NaiveDate::MIN),
            net: Amounts::checked_sum(rows.iter().map(|r| r.record.amounts())),
        }
    }
}

/// First matching rule wins.
pub fn decide_status(m: &BucketMetrics, cutover_date: NaiveDate) -> ReconStatus {
    let pre_cutover = m.min_trade_date < cutover_date;
    let all_paired = m.paired_cancelled_rows == m.cancelled_rows;

    if pre_cutover && all_paired {
        ReconStatus::PairedOkPreCutover
    } else if pre_cutover {
        ReconStatus::OrphanPreCutover
    } else if m.cancelled_rows == m.total_rows && m.net.is_some_and(|n| n.is_zero()) {
        ReconStatus::ReconciledAllCancelled
    } else if all_paired {
        ReconStatus::PairedOk
    } else {
        ReconStatus::PairingIncomplete
    }
}

/// Status row for one gated bucket given the pairs accepted in it.
pub fn reconcile_bucket(
    group_key: &GroupKey,
    rows: &[&EnrichedTransaction],
    pairs: &[PairRecord],
    cutover_date: NaiveDate,
    oversized: bool,
) -> BucketStatus {
    let paired: HashSet<&RowId> = pairs.iter().map(|p| &p.row_id).collect();
    let metrics = BucketMetrics::measure(rows, &paired);
    let status = decide_status(&metrics, cutover_date);

    BucketStatus {
        group_key: group_key.clone(),
        is_in_coverage: metrics.min_trade_date >= cutover_date,
        status,
        explanation: status.explanation().to_string(),
        total_rows: metrics.total_rows,
        cancelled_rows: metrics.cancelled_rows,
        paired_cancelled_rows: metrics.paired_cancelled_rows,
        min_trade_date: metrics.min_trade_date,
        net: metrics.net,
        oversized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PairId, TransactionRecord};
    use rust_decimal::Decimal;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(id: &str, group: &str, qty: i64, cancelled: bool, trade: &str) -> EnrichedTransaction {
        EnrichedTransaction {
            record: TransactionRecord {
                record_id: id.into(),
                account_id: Some("ACC1".into()),
                security_id: Some("SEC1".into()),
                trade_date: Some(day(trade)),
                settlement_date: Some(day(trade)),
                currency: Some("CAD".into()),
                quantity: Some(Decimal::from(qty)),
                cash_amount: Some(Decimal::from(qty * 10)),
                cost: None,
                transaction_type: Some("BUY".into()),
                description: None,
                reference_number: None,
                sequence_number: None,
                is_cancelled: cancelled,
                process_date: None,
            },
            group_key: GroupKey(group.into()),
            row_id: RowId(format!("r_{id}")),
        }
    }

    fn legs(ids: &[&str]) -> Vec<PairRecord> {
        ids.iter()
            .map(|id| PairRecord {
                group_key: GroupKey("g".into()),
                pair_id: PairId("p".into()),
                row_id: RowId(format!("r_{id}")),
            })
            .collect()
    }

    fn metrics(total: usize, cancelled: usize, paired: usize, trade: &str, net_zero: bool) -> BucketMetrics {
        BucketMetrics {
            total_rows: total,
            cancelled_rows: cancelled,
            paired_cancelled_rows: paired,
            min_trade_date: day(trade),
            net: Some(Amounts {
                quantity: if net_zero { Decimal::ZERO } else { Decimal::ONE },
                cash: Decimal::ZERO,
                cost: Decimal::ZERO,
            }),
        }
    }

    const CUTOVER: &str = "2023-01-01";

    #[test]
    fn gate_drops_buckets_without_cancellations() {
        let rows = vec![
            row("a", "g1", 1, false, "2024-01-05"),
            row("b", "g2", 1, true, "2024-01-05"),
            row("c", "g2", -1, false, "2024-01-05"),
        ];
        let buckets = gated_buckets(&rows);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&GroupKey("g2".into())].len(), 2);
    }

    #[test]
    fn rule_table() {
        let c = day(CUTOVER);
        assert_eq!(decide_status(&metrics(2, 1, 1, "2022-06-01", false), c), ReconStatus::PairedOkPreCutover);
        assert_eq!(decide_status(&metrics(2, 1, 0, "2022-06-01", false), c), ReconStatus::OrphanPreCutover);
        // Pre-cutover rules win over the all-cancelled bypass
        assert_eq!(decide_status(&metrics(3, 3, 0, "2022-06-01", true), c), ReconStatus::OrphanPreCutover);
        assert_eq!(decide_status(&metrics(3, 3, 0, "2024-01-05", true), c), ReconStatus::ReconciledAllCancelled);
        assert_eq!(decide_status(&metrics(3, 3, 0, "2024-01-05", false), c), ReconStatus::PairingIncomplete);
        assert_eq!(decide_status(&metrics(2, 1, 1, "2024-01-05", false), c), ReconStatus::PairedOk);
        assert_eq!(decide_status(&metrics(2, 1, 0, "2024-01-05", false), c), ReconStatus::PairingIncomplete);
    }

    #[test]
    fn cutover_date_itself_is_in_coverage() {
        assert_eq!(
            decide_status(&metrics(2, 1, 0, CUTOVER, false), day(CUTOVER)),
            ReconStatus::PairingIncomplete
        );
    }

    #[test]
    fn three_leg_all_cancelled_bucket_bypasses_pairing() {
        // +10, +5, -15: no two legs cancel, but the bucket nets to zero
        let a = row("a", "g", 10, true, "2024-01-05");
        let b = row("b", "g", 5, true, "2024-01-05");
        let c = row("c", "g", -15, true, "2024-01-05");
        let status = reconcile_bucket(&GroupKey("g".into()), &[&a, &b, &c], &[], day(CUTOVER), false);
        assert_eq!(status.status, ReconStatus::ReconciledAllCancelled);
        assert_eq!(status.paired_cancelled_rows, 0);
        assert!(status.is_in_coverage);
        assert!(status.net.is_some_and(|n| n.is_zero()));
    }

    #[test]
    fn paired_bucket_counts_only_cancelled_legs() {
        let x = row("x", "g", 100, true, "2024-01-05");
        let y = row("y", "g", -100, false, "2024-01-05");
        let status = reconcile_bucket(&GroupKey("g".into()), &[&x, &y], &legs(&["x", "y"]), day(CUTOVER), false);
        assert_eq!(status.status, ReconStatus::PairedOk);
        assert_eq!(status.cancelled_rows, 1);
        assert_eq!(status.paired_cancelled_rows, 1);
        assert_eq!(status.explanation, ReconStatus::PairedOk.explanation());
    }

    #[test]
    fn overflowing_net_is_never_zero() {
        let mut a = row("a", "g", 1, true, "2024-01-05");
        let mut b = row("b", "g", 1, true, "2024-01-05");
        a.record.quantity = Some(Decimal::MAX);
        b.record.quantity = Some(Decimal::MAX);
        let status = reconcile_bucket(&GroupKey("g".into()), &[&a, &b], &[], day(CUTOVER), false);
        assert_eq!(status.net, None);
        assert_eq!(status.status, ReconStatus::PairingIncomplete);
    }

    #[test]
    fn min_trade_date_drives_coverage() {
        let x = row("x", "g", 100, true, "2024-01-05");
        let y = row("y", "g", -100, false, "2022-12-30");
        let status = reconcile_bucket(&GroupKey("g".into()), &[&x, &y], &[], day(CUTOVER), false);
        assert_eq!(status.min_trade_date, day("2022-12-30"));
        assert!(!status.is_in_coverage);
        assert_eq!(status.status, ReconStatus::OrphanPreCutover);
    }
}
