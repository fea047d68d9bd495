//! Text → typed value casting for landed CSV snapshots.
//!
//! Every caster returns `Ok(None)` for empty input and `Err(reason)` when a
//! value is present but cannot be read. The loader turns errors into null
//! fields plus a non-blocking finding; it never aborts the run.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::config::{BooleanCasting, DateCasting, DecimalCasting, NullPolicy};

pub type CastResult<T> = Result<Option<T>, String>;

pub fn cast_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn cast_integer(raw: &str) -> CastResult<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|_| format!("not an integer: '{trimmed}'"))
}

pub fn cast_boolean(raw: &str, casting: &BooleanCasting) -> CastResult<bool> {
    let clean = raw.trim().to_uppercase();
    let matches = |values: &[String]| values.iter().any(|v| v.trim().to_uppercase() == clean);

    let value = if clean.is_empty() {
        None
    } else if matches(&casting.true_values) {
        Some(true)
    } else if matches(&casting.false_values) {
        Some(false)
    } else if casting.null_policy == NullPolicy::Preserve {
        return Err(format!("not a recognized boolean: '{}'", raw.trim()));
    } else {
        None
    };

    Ok(match (value, casting.null_policy) {
        (Some(v), _) => Some(v),
        (None, NullPolicy::Preserve) => None,
        (None, NullPolicy::False) => Some(false),
        (None, NullPolicy::True) => Some(true),
    })
}

pub fn cast_decimal(raw: &str, casting: &DecimalCasting) -> CastResult<Decimal> {
    let clean: String = raw
        .trim()
        .chars()
        .filter(|c| *c != casting.thousands_separator)
        .collect::<String>()
        .to_uppercase();
    if clean.is_empty() {
        return Ok(None);
    }

    let upper = |s: &Option<String>| s.as_ref().map(|a| a.to_uppercase());
    let mut negative = false;
    let owned: String;
    let mut unsigned = clean.as_str();

    let strip = |s: &str, affix: &Option<String>, suffix: bool| -> Option<String> {
        let affix = upper(affix)?;
        let rest = if suffix { s.strip_suffix(affix.as_str()) } else { s.strip_prefix(affix.as_str()) };
        rest.map(str::to_string)
    };
    if let Some(rest) = strip(unsigned, &casting.negative_suffix, true)
        .or_else(|| strip(unsigned, &casting.negative_prefix, false))
    {
        negative = true;
        owned = rest;
        unsigned = owned.as_str();
    } else if let Some(rest) = strip(unsigned, &casting.positive_suffix, true)
        .or_else(|| strip(unsigned, &casting.positive_prefix, false))
    {
        owned = rest;
        unsigned = owned.as_str();
    }

    let value = Decimal::from_str(unsigned.trim())
        .or_else(|_| Decimal::from_scientific(unsigned.trim()))
        .map_err(|_| format!("not a decimal: '{}'", raw.trim()))?;

    Ok(Some(if negative { -value } else { value }))
}

/// Accepts `YYYYMMDD`, `MMDDYYYY`, `YYMMDD`, `MMDDYY` (any separators), or ISO `YYYY-MM-DD`.
pub fn cast_date(raw: &str, casting: &DateCasting) -> CastResult<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let num = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    let ymd = |y: Option<u32>, m: Option<u32>, d: Option<u32>| match (y, m, d) {
        (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d),
        _ => None,
    };
    let full_year = |yy: Option<u32>| {
        yy.map(|yy| {
            if yy <= casting.pivot_year_short {
                2000 + yy
            } else {
                1900 + yy
            }
        })
    };

    let parsed = match digits.len() {
        8 => ymd(num(0..4), num(4..6), num(6..8)).or_else(|| ymd(num(4..8), num(0..2), num(2..4))),
        6 => ymd(full_year(num(0..2)), num(2..4), num(4..6))
            .or_else(|| ymd(full_year(num(4..6)), num(0..2), num(2..4))),
        _ => None,
    };

    parsed
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok())
        .map(Some)
        .ok_or_else(|| format!("not a date: '{trimmed}'"))
}
