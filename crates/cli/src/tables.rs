//! CSV renderings of the run's output tables.
//!
//! The engine's row types flatten the source record into each table; the csv
//! serializer cannot express that, so records are laid out column by column
//! here and the header order is fixed.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use ledgerline_recon::model::{
    BucketStatus, EffectiveTransaction, EnrichedTransaction, PairRecord, TransactionRecord,
};
use ledgerline_recon::ReconResult;

pub const ENRICHED_CSV: &str = "enriched.csv";
pub const PAIRS_CSV: &str = "pairs.csv";
pub const BUCKET_STATUS_CSV: &str = "bucket_status.csv";
pub const EFFECTIVE_CSV: &str = "effective.csv";
pub const AUDIT_JSON: &str = "audit.json";

const RECORD_HEADERS: [&str; 15] = [
    "record_id",
    "account_id",
    "security_id",
    "trade_date",
    "settlement_date",
    "currency",
    "quantity",
    "cash_amount",
    "cost",
    "transaction_type",
    "description",
    "reference_number",
    "sequence_number",
    "is_cancelled",
    "process_date",
];

fn cell<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn record_cells(r: &TransactionRecord) -> Vec<String> {
    vec![
        r.record_id.clone(),
        cell(&r.account_id),
        cell(&r.security_id),
        cell(&r.trade_date),
        cell(&r.settlement_date),
        cell(&r.currency),
        cell(&r.quantity),
        cell(&r.cash_amount),
        cell(&r.cost),
        cell(&r.transaction_type),
        cell(&r.description),
        cell(&r.reference_number),
        cell(&r.sequence_number),
        r.is_cancelled.to_string(),
        cell(&r.process_date),
    ]
}

fn with_headers(extra: &[&'static str]) -> Vec<&'static str> {
    RECORD_HEADERS.iter().chain(extra).copied().collect()
}

pub fn write_enriched(path: &Path, rows: &[EnrichedTransaction]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(with_headers(&["group_key", "row_id"]))?;
    for row in rows {
        let mut cells = record_cells(&row.record);
        cells.push(row.group_key.to_string());
        cells.push(row.row_id.to_string());
        wtr.write_record(&cells)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_pairs(path: &Path, pairs: &[PairRecord]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for pair in pairs {
        wtr.serialize(pair)?;
    }
    if pairs.is_empty() {
        wtr.write_record(["group_key", "pair_id", "row_id"])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_statuses(path: &Path, statuses: &[BucketStatus]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "group_key",
        "is_in_coverage",
        "status",
        "explanation",
        "total_rows",
        "cancelled_rows",
        "paired_cancelled_rows",
        "min_trade_date",
        "net_quantity",
        "net_cash",
        "net_cost",
        "oversized",
    ])?;
    for s in statuses {
        wtr.write_record([
            s.group_key.to_string(),
            s.is_in_coverage.to_string(),
            s.status.to_string(),
            s.explanation.clone(),
            s.total_rows.to_string(),
            s.cancelled_rows.to_string(),
            s.paired_cancelled_rows.to_string(),
            s.min_trade_date.to_string(),
            cell(&s.net.map(|n| n.quantity)),
            cell(&s.net.map(|n| n.cash)),
            cell(&s.net.map(|n| n.cost)),
            s.oversized.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_effective(path: &Path, rows: &[EffectiveTransaction]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(with_headers(&[
        "row_id",
        "group_key",
        "is_cancelled_effective",
        "pair_id",
        "status",
        "explanation",
        "is_in_coverage",
    ]))?;
    for row in rows {
        let mut cells = record_cells(&row.record);
        cells.push(cell(&row.row_id));
        cells.push(cell(&row.group_key));
        cells.push(row.is_cancelled_effective.to_string());
        cells.push(cell(&row.pair_id));
        cells.push(cell(&row.status));
        cells.push(cell(&row.explanation));
        cells.push(cell(&row.is_in_coverage));
        wtr.write_record(&cells)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the four output tables into `dir`. Returns the paths written.
pub fn write_tables(dir: &Path, result: &ReconResult) -> Result<Vec<PathBuf>, csv::Error> {
    let enriched = dir.join(ENRICHED_CSV);
    let pairs = dir.join(PAIRS_CSV);
    let statuses = dir.join(BUCKET_STATUS_CSV);
    let effective = dir.join(EFFECTIVE_CSV);

    write_enriched(&enriched, &result.enriched)?;
    write_pairs(&pairs, &result.pairs)?;
    write_statuses(&statuses, &result.statuses)?;
    write_effective(&effective, &result.effective)?;

    Ok(vec![enriched, pairs, statuses, effective])
}
