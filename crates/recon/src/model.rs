use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditFinding, AuditReport};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One deduplicated transaction row as landed by ingestion.
///
/// Everything except `record_id` and `is_cancelled` may be null upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub record_id: String,
    pub account_id: Option<String>,
    pub security_id: Option<String>,
    pub trade_date: Option<NaiveDate>,
    pub settlement_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub quantity: Option<Decimal>,
    pub cash_amount: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub transaction_type: Option<String>,
    pub description: Option<String>,
    pub reference_number: Option<String>,
    pub sequence_number: Option<i64>,
    pub is_cancelled: bool,
    pub process_date: Option<NaiveDate>,
}

impl TransactionRecord {
    /// Signed economic fields, nulls read as zero.
    pub fn amounts(&self) -> Amounts {
        Amounts {
            quantity: self.quantity.unwrap_or_default(),
            cash: self.cash_amount.unwrap_or_default(),
            cost: self.cost.unwrap_or_default(),
        }
    }

    /// The same row with quantity, cash and cost negated.
    pub fn sign_negated(&self) -> Self {
        Self {
            quantity: self.quantity.map(|d| -d),
            cash_amount: self.cash_amount.map(|d| -d),
            cost: self.cost.map(|d| -d),
            ..self.clone()
        }
    }
}

/// Rows handed to the engine, plus any findings raised while loading them.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub records: Vec<TransactionRecord>,
    pub load_findings: Vec<AuditFinding>,
}

impl ReconInput {
    pub fn from_records(records: Vec<TransactionRecord>) -> Self {
        Self {
            records,
            load_findings: Vec::new(),
        }
    }
}

/// Signed (quantity, cash, cost) triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amounts {
    pub quantity: Decimal,
    pub cash: Decimal,
    pub cost: Decimal,
}

impl Amounts {
    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero() && self.cash.is_zero() && self.cost.is_zero()
    }

    /// Exact negation on all three fields.
    pub fn is_negation_of(&self, other: &Amounts) -> bool {
        self.quantity == -other.quantity && self.cash == -other.cash && self.cost == -other.cost
    }

    /// Field-wise sum; `None` when any field overflows `Decimal`.
    pub fn checked_add(&self, other: &Amounts) -> Option<Amounts> {
        Some(Amounts {
            quantity: self.quantity.checked_add(other.quantity)?,
            cash: self.cash.checked_add(other.cash)?,
            cost: self.cost.checked_add(other.cost)?,
        })
    }

    /// Sum of many amounts; `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Amounts>>(items: I) -> Option<Amounts> {
        items
            .into_iter()
            .try_fold(Amounts::default(), |acc, a| acc.checked_add(&a))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

macro_rules! digest_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

digest_newtype!(
    /// Sign/role-invariant bucket fingerprint (64 hex chars).
    GroupKey
);
digest_newtype!(
    /// Sign-sensitive identity of one row (64 hex chars).
    RowId
);
digest_newtype!(
    /// Order-independent identity of an accepted pair.
    PairId
);

/// Input row plus its derived keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedTransaction {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub group_key: GroupKey,
    pub row_id: RowId,
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// One leg of an accepted pair. Every `pair_id` has exactly two legs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairRecord {
    pub group_key: GroupKey,
    pub pair_id: PairId,
    pub row_id: RowId,
}

// ---------------------------------------------------------------------------
// Bucket status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconStatus {
    PairedOk,
    PairedOkPreCutover,
    OrphanPreCutover,
    ReconciledAllCancelled,
    PairingIncomplete,
}

impl ReconStatus {
    pub const ALL: [ReconStatus; 5] = [
        Self::PairedOk,
        Self::PairedOkPreCutover,
        Self::OrphanPreCutover,
        Self::ReconciledAllCancelled,
        Self::PairingIncomplete,
    ];

    /// Fixed explanation attached to every bucket carrying this status.
    pub fn explanation(&self) -> &'static str {
        match self {
            Self::PairedOk => "every cancelled row is paired with an exact reversal",
            Self::PairedOkPreCutover => {
                "bucket starts before cutover; every cancelled row is nevertheless paired"
            }
            Self::OrphanPreCutover => {
                "bucket starts before cutover; unpaired cancelled rows tolerated because pre-cutover lineage is incomplete"
            }
            Self::ReconciledAllCancelled => {
                "every row in the bucket is cancelled and the bucket nets to zero on quantity, cash and cost"
            }
            Self::PairingIncomplete => {
                "at least one cancelled row has no mutually-preferred reversal; needs manual investigation"
            }
        }
    }
}

impl fmt::Display for ReconStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PairedOk => write!(f, "PAIRED_OK"),
            Self::PairedOkPreCutover => write!(f, "PAIRED_OK_PRE_CUTOVER"),
            Self::OrphanPreCutover => write!(f, "ORPHAN_PRE_CUTOVER"),
            Self::ReconciledAllCancelled => write!(f, "RECONCILED_ALL_CANCELLED"),
            Self::PairingIncomplete => write!(f, "PAIRING_INCOMPLETE"),
        }
    }
}

/// Reconciliation verdict for one bucket, with the metrics it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStatus {
    pub group_key: GroupKey,
    pub is_in_coverage: bool,
    pub status: ReconStatus,
    pub explanation: String,
    pub total_rows: usize,
    pub cancelled_rows: usize,
    pub paired_cancelled_rows: usize,
    pub min_trade_date: NaiveDate,
    /// Null when the bucket's amounts overflow when summed.
    pub net: Option<Amounts>,
    /// Bucket exceeded `max_bucket_size`; candidate enumeration was skipped.
    pub oversized: bool,
}

// ---------------------------------------------------------------------------
// Effective view
// ---------------------------------------------------------------------------

/// Externally consumed row: source record + effective cancellation + joined status.
///
/// Rows excluded as malformed carry no keys and no status. A duplicate copy
/// mirrors the row it repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveTransaction {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub row_id: Option<RowId>,
    pub group_key: Option<GroupKey>,
    pub is_cancelled_effective: bool,
    pub pair_id: Option<PairId>,
    pub status: Option<ReconStatus>,
    pub explanation: Option<String>,
    pub is_in_coverage: Option<bool>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub input_rows: usize,
    pub reconciled_rows: usize,
    pub excluded_rows: usize,
    pub buckets: usize,
    pub pairs: usize,
    pub effective_cancelled: usize,
    /// Rows whose effective flag is set although the source flag is not.
    pub inherited_cancellations: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub blocking_findings: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub cutover_date: NaiveDate,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub enriched: Vec<EnrichedTransaction>,
    pub pairs: Vec<PairRecord>,
    pub statuses: Vec<BucketStatus>,
    pub effective: Vec<EffectiveTransaction>,
    pub audit: AuditReport,
}
