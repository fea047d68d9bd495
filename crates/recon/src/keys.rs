//! Key derivation — `GroupKey` and `RowIdentity` digests per transaction row.
//!
//! Both keys are SHA-256 over a delimiter-separated canonical encoding of
//! selected fields. Nulls are encoded as a fixed placeholder so two
//! independently-null fields compare equal.
//!
//! - `GroupKey` uses absolute amounts and the canonical type label, so a row
//!   and its exact reversal always share one.
//! - `RowIdentity` uses signed amounts and the raw type code, so a row and
//!   its reversal never share one.

use std::collections::HashSet;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::audit::{AuditFinding, FindingKind};
use crate::config::TypeCanonicalization;
use crate::model::{EnrichedTransaction, GroupKey, RowId, TransactionRecord};

const NULL_PLACEHOLDER: &str = "\u{0}";
const FIELD_SEPARATOR: &[u8] = b"\x1f";

// ---------------------------------------------------------------------------
// Canonical field encoding
// ---------------------------------------------------------------------------

/// SHA-256 over fields joined by the unit separator → 64 lowercase hex chars.
pub(crate) fn digest_fields(fields: &[Option<String>]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR);
        }
        hasher.update(field.as_deref().unwrap_or(NULL_PLACEHOLDER).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn text(value: &Option<String>) -> Option<String> {
    value.clone()
}

fn date(value: &Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Scale-free rendering: `100.00` and `100` encode the same, `-0` encodes as `0`.
fn decimal(value: &Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

fn magnitude(value: &Option<Decimal>) -> Option<String> {
    value.map(|d| d.abs().normalize().to_string())
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Canonical label used in `GroupKey`; unrecognized codes pass through unchanged.
pub fn canonical_transaction_type<'a>(
    code: &'a str,
    types: &'a TypeCanonicalization,
) -> &'a str {
    types.label(code)
}

pub fn group_key(record: &TransactionRecord, types: &TypeCanonicalization) -> GroupKey {
    let label = record
        .transaction_type
        .as_deref()
        .map(|code| canonical_transaction_type(code, types).to_string());

    GroupKey(digest_fields(&[
        text(&record.account_id),
        text(&record.security_id),
        date(&record.trade_date),
        date(&record.settlement_date),
        text(&record.currency),
        magnitude(&record.quantity),
        magnitude(&record.cash_amount),
        magnitude(&record.cost),
        label,
    ]))
}

pub fn row_identity(record: &TransactionRecord) -> RowId {
    RowId(digest_fields(&[
        date(&record.process_date),
        record.sequence_number.map(|n| n.to_string()),
        text(&record.account_id),
        text(&record.security_id),
        date(&record.trade_date),
        date(&record.settlement_date),
        text(&record.currency),
        text(&record.transaction_type),
        decimal(&record.quantity),
        decimal(&record.cash_amount),
        decimal(&record.cost),
        text(&record.reference_number),
        text(&record.description),
    ]))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    AccountId,
    TransactionType,
    TradeDate,
    SettlementDate,
    Currency,
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountId => write!(f, "account_id"),
            Self::TransactionType => write!(f, "transaction_type"),
            Self::TradeDate => write!(f, "trade_date"),
            Self::SettlementDate => write!(f, "settlement_date"),
            Self::Currency => write!(f, "currency"),
        }
    }
}

/// Required identity fields that are null or blank on this row.
pub fn missing_identity_fields(record: &TransactionRecord) -> Vec<IdentityField> {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

    let mut missing = Vec::new();
    if blank(&record.account_id) {
        missing.push(IdentityField::AccountId);
    }
    if blank(&record.transaction_type) {
        missing.push(IdentityField::TransactionType);
    }
    if record.trade_date.is_none() {
        missing.push(IdentityField::TradeDate);
    }
    if record.settlement_date.is_none() {
        missing.push(IdentityField::SettlementDate);
    }
    if blank(&record.currency) {
        missing.push(IdentityField::Currency);
    }
    missing
}

// ---------------------------------------------------------------------------
// Derivation over a whole input
// ---------------------------------------------------------------------------

/// A row kept out of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedRow {
    pub record: TransactionRecord,
    /// Identity of the earlier row this one repeats; `None` for malformed rows.
    pub duplicate_of: Option<RowId>,
}

#[derive(Debug, Default)]
pub struct Derivation {
    pub enriched: Vec<EnrichedTransaction>,
    /// Rows kept out of reconciliation (malformed or duplicate identity).
    pub excluded: Vec<ExcludedRow>,
    pub findings: Vec<AuditFinding>,
}

/// Enrich every valid row with its keys. Malformed rows and repeated
/// identities are excluded and reported, never fatal.
pub fn derive_all(records: &[TransactionRecord], types: &TypeCanonicalization) -> Derivation {
    let mut out = Derivation::default();
    let mut seen: HashSet<RowId> = HashSet::new();

    for record in records {
        let missing = missing_identity_fields(record);
        if !missing.is_empty() {
            let fields: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
            warn!(
                "record '{}' excluded: missing {}",
                record.record_id,
                fields.join(", ")
            );
            out.findings.push(
                AuditFinding::new(
                    FindingKind::MalformedRow,
                    format!("missing required field(s): {}", fields.join(", ")),
                )
                .with_record(&record.record_id),
            );
            out.excluded.push(ExcludedRow { record: record.clone(), duplicate_of: None });
            continue;
        }

        let row_id = row_identity(record);
        if !seen.insert(row_id.clone()) {
            warn!("record '{}' excluded: duplicate row identity {row_id}", record.record_id);
            out.findings.push(
                AuditFinding::new(
                    FindingKind::DuplicateRowIdentity,
                    "row is indistinguishable from an earlier row",
                )
                .with_row(&row_id)
                .with_record(&record.record_id),
            );
            out.excluded.push(ExcludedRow { record: record.clone(), duplicate_of: Some(row_id) });
            continue;
        }

        out.enriched.push(EnrichedTransaction {
            group_key: group_key(record, types),
            row_id,
            record: record.clone(),
        });
    }

    out
}
