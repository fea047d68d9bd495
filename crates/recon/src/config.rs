use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Buckets whose earliest trade date falls before this date are not
    /// guaranteed complete pairing coverage.
    pub cutover_date: NaiveDate,
    #[serde(default = "default_max_bucket_size")]
    pub max_bucket_size: usize,
    /// Process buckets on the rayon pool. Output is identical either way.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub transaction_types: TypeCanonicalization,
    #[serde(default)]
    pub input: Option<InputConfig>,
}

fn default_max_bucket_size() -> usize {
    500
}

impl ReconConfig {
    /// Minimal config for in-memory runs.
    pub fn new(name: impl Into<String>, cutover_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            cutover_date,
            max_bucket_size: default_max_bucket_size(),
            parallel: false,
            transaction_types: TypeCanonicalization::default(),
            input: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction-type canonicalization
// ---------------------------------------------------------------------------

/// Curated mapping from raw transaction-type codes to the label used in
/// `GroupKey`. Codes are matched trimmed and upper-cased; anything not in
/// the map passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TypeCanonicalization {
    codes: BTreeMap<String, String>,
}

impl Default for TypeCanonicalization {
    fn default() -> Self {
        let codes = [
            ("BUY", "BUY"),
            ("BY", "BUY"),
            ("XBUY", "BUY"),
            ("XB", "BUY"),
            ("CROSS BUY", "BUY"),
            ("CROSS-BUY", "BUY"),
            ("CROSS_BUY", "BUY"),
        ]
        .into_iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect();
        Self { codes }
    }
}

impl TypeCanonicalization {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let codes = pairs
            .into_iter()
            .map(|(k, v)| (normalize_code(&k.into()), v.into()))
            .collect();
        Self { codes }
    }

    /// Canonical label for `code`. Unrecognized codes come back unchanged.
    pub fn label<'a>(&'a self, code: &'a str) -> &'a str {
        self.codes
            .get(&normalize_code(code))
            .map(String::as_str)
            .unwrap_or(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.codes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    fn normalized(self) -> Self {
        Self::from_pairs(self.codes)
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub boolean: BooleanCasting,
    #[serde(default)]
    pub decimal: DecimalCasting,
    #[serde(default)]
    pub dates: DateCasting,
}

fn default_delimiter() -> char {
    ','
}

impl InputConfig {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            delimiter: default_delimiter(),
            columns: ColumnMapping::default(),
            boolean: BooleanCasting::default(),
            decimal: DecimalCasting::default(),
            dates: DateCasting::default(),
        }
    }
}

/// CSV header for each `TransactionRecord` field. Defaults to the field name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub record_id: String,
    pub account_id: String,
    pub security_id: String,
    pub trade_date: String,
    pub settlement_date: String,
    pub currency: String,
    pub quantity: String,
    pub cash_amount: String,
    pub cost: String,
    pub transaction_type: String,
    pub description: String,
    pub reference_number: String,
    pub sequence_number: String,
    pub is_cancelled: String,
    pub process_date: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            record_id: "record_id".into(),
            account_id: "account_id".into(),
            security_id: "security_id".into(),
            trade_date: "trade_date".into(),
            settlement_date: "settlement_date".into(),
            currency: "currency".into(),
            quantity: "quantity".into(),
            cash_amount: "cash_amount".into(),
            cost: "cost".into(),
            transaction_type: "transaction_type".into(),
            description: "description".into(),
            reference_number: "reference_number".into(),
            sequence_number: "sequence_number".into(),
            is_cancelled: "is_cancelled".into(),
            process_date: "process_date".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Casting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    Preserve,
    False,
    True,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BooleanCasting {
    pub true_values: Vec<String>,
    pub false_values: Vec<String>,
    pub null_policy: NullPolicy,
}

impl Default for BooleanCasting {
    fn default() -> Self {
        Self {
            true_values: ["TRUE", "T", "YES", "Y", "1"].map(String::from).to_vec(),
            false_values: ["FALSE", "F", "NO", "N", "0"].map(String::from).to_vec(),
            null_policy: NullPolicy::Preserve,
        }
    }
}

/// Sign conventions for amount columns. At most one affix may be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecimalCasting {
    pub positive_suffix: Option<String>,
    pub negative_suffix: Option<String>,
    pub positive_prefix: Option<String>,
    pub negative_prefix: Option<String>,
    pub thousands_separator: char,
}

impl Default for DecimalCasting {
    fn default() -> Self {
        Self {
            positive_suffix: None,
            negative_suffix: None,
            positive_prefix: None,
            negative_prefix: None,
            thousands_separator: ',',
        }
    }
}

/// Two-digit years `<= pivot_year_short` land in the 2000s, the rest in the 1900s.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateCasting {
    pub pivot_year_short: u32,
}

impl Default for DateCasting {
    fn default() -> Self {
        Self { pivot_year_short: 25 }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let mut config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.transaction_types = config.transaction_types.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.max_bucket_size < 2 {
            return Err(ReconError::ConfigValidation(format!(
                "max_bucket_size must be at least 2, got {}",
                self.max_bucket_size
            )));
        }

        for (code, label) in self.transaction_types.iter() {
            if code.is_empty() {
                return Err(ReconError::ConfigValidation(
                    "transaction_types: empty code".into(),
                ));
            }
            if label.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "transaction_types: code '{code}' maps to an empty label"
                )));
            }
        }

        if let Some(ref input) = self.input {
            input.validate()?;
        }

        Ok(())
    }
}

impl InputConfig {
    pub fn validate(&self) -> Result<(), ReconError> {
        if !self.delimiter.is_ascii() {
            return Err(ReconError::ConfigValidation(format!(
                "input.delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )));
        }

        let trues: BTreeSet<String> =
            self.boolean.true_values.iter().map(|v| v.trim().to_uppercase()).collect();
        let overlap: Vec<&str> = self
            .boolean
            .false_values
            .iter()
            .map(|v| v.trim())
            .filter(|v| trues.contains(&v.to_uppercase()))
            .collect();
        if !overlap.is_empty() {
            return Err(ReconError::ConfigValidation(format!(
                "input.boolean: true_values and false_values overlap: {overlap:?}"
            )));
        }

        let d = &self.decimal;
        let affixes = [&d.positive_suffix, &d.negative_suffix, &d.positive_prefix, &d.negative_prefix];
        if affixes.iter().filter(|a| a.is_some()).count() > 1 {
            return Err(ReconError::ConfigValidation(
                "input.decimal: only one of positive_suffix, negative_suffix, positive_prefix, negative_prefix may be set".into(),
            ));
        }

        if self.dates.pivot_year_short > 99 {
            return Err(ReconError::ConfigValidation(format!(
                "input.dates.pivot_year_short must be 0..=99, got {}",
                self.dates.pivot_year_short
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
