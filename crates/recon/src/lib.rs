//! `ledgerline-recon` — Transaction cancellation reconciliation engine.
//!
//! Pure engine crate: receives landed transaction rows, pairs cancelled rows
//! with their reversals, assigns a status to every affected bucket and
//! projects one effective-cancellation flag per row. No CLI or IO
//! dependencies beyond parsing in-memory CSV text.

pub mod audit;
pub mod buckets;
pub mod candidates;
pub mod cast;
pub mod config;
pub mod effective;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod keys;
pub mod model;
pub mod pairing;

pub use audit::{AuditFinding, AuditReport, FindingKind, Severity};
pub use config::ReconConfig;
pub use engine::{load_csv_rows, run};
pub use error::ReconError;
pub use model::{ReconInput, ReconResult, ReconStatus, TransactionRecord};
