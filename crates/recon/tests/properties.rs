// Property-based tests for keying and pairing.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use ledgerline_recon::config::{ReconConfig, TypeCanonicalization};
use ledgerline_recon::keys::group_key;
use ledgerline_recon::model::{ReconInput, TransactionRecord};
use ledgerline_recon::run;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn recon_config(parallel: bool) -> ReconConfig {
    let mut config = ReconConfig::new("prop", NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    config.parallel = parallel;
    config
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_amount() -> impl Strategy<Value = Option<Decimal>> {
    prop_oneof![
        4 => (-3i64..=3).prop_map(|n| Some(Decimal::from(n))),
        1 => (-99_999i64..99_999, 0u32..4).prop_map(|(n, scale)| Some(Decimal::new(n, scale))),
        1 => Just(None),
    ]
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    prop_oneof![
        Just(NaiveDate::from_ymd_opt(2022, 11, 30).unwrap()),
        Just(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
    ]
}

/// Rows drawn from a small domain so buckets collide and reversals exist.
fn arb_record() -> impl Strategy<Value = TransactionRecord> {
    (
        prop::sample::select(vec!["ACC1", "ACC2"]),
        arb_date(),
        prop::sample::select(vec!["BUY", "XBUY", "SELL"]),
        (-3i64..=3),
        prop::option::of(0i64..20),
        prop::sample::select(vec![None, Some("Buy"), Some("Reversal")]),
        any::<bool>(),
    )
        .prop_map(|(account, trade_date, kind, qty, seq, description, cancelled)| TransactionRecord {
            record_id: String::new(),
            account_id: Some(account.to_string()),
            security_id: Some("SEC1".into()),
            trade_date: Some(trade_date),
            settlement_date: Some(trade_date),
            currency: Some("CAD".into()),
            quantity: Some(Decimal::from(qty)),
            cash_amount: Some(Decimal::from(qty * -25)),
            cost: None,
            transaction_type: Some(kind.to_string()),
            description: description.map(String::from),
            reference_number: None,
            sequence_number: seq,
            is_cancelled: cancelled,
            process_date: None,
        })
}

fn arb_input() -> impl Strategy<Value = Vec<TransactionRecord>> {
    proptest::collection::vec(arb_record(), 0..40).prop_map(|mut rows| {
        for (i, row) in rows.iter_mut().enumerate() {
            row.record_id = format!("t{i}");
            // Distinct row identities, so duplicate exclusion never depends on order
            row.reference_number = Some(format!("R{i}"));
        }
        rows
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn group_key_is_sign_invariant(
        base in arb_record(),
        qty in arb_amount(),
        cash in arb_amount(),
        cost in arb_amount(),
    ) {
        let types = TypeCanonicalization::default();
        let row = TransactionRecord { quantity: qty, cash_amount: cash, cost, ..base };
        prop_assert_eq!(group_key(&row, &types), group_key(&row.sign_negated(), &types));
    }

    #[test]
    fn pairing_is_one_to_one_and_zero_sum(rows in arb_input()) {
        let result = run(&recon_config(false), &ReconInput::from_records(rows)).unwrap();
        prop_assert!(result.audit.passed, "{:?}", result.audit.findings);

        let mut seen = HashSet::new();
        for leg in &result.pairs {
            prop_assert!(seen.insert(leg.row_id.clone()), "row {} in two pairs", leg.row_id);
        }

        let by_row: BTreeMap<_, _> = result.enriched.iter().map(|r| (&r.row_id, r)).collect();
        let mut legs: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for leg in &result.pairs {
            legs.entry(&leg.pair_id).or_default().push(by_row[&leg.row_id]);
        }
        for (_, pair) in legs {
            prop_assert_eq!(pair.len(), 2);
            prop_assert_eq!(&pair[0].group_key, &pair[1].group_key);
            prop_assert!(pair[0].record.is_cancelled || pair[1].record.is_cancelled);
            prop_assert!(pair[0].record.amounts().is_negation_of(&pair[1].record.amounts()));
        }
    }

    #[test]
    fn permuted_input_gives_identical_tables(
        (rows, shuffled) in arb_input().prop_flat_map(|rows| {
            let shuffled = Just(rows.clone()).prop_shuffle();
            (Just(rows), shuffled)
        })
    ) {
        let a = run(&recon_config(false), &ReconInput::from_records(rows)).unwrap();
        let b = run(&recon_config(false), &ReconInput::from_records(shuffled)).unwrap();
        prop_assert_eq!(a.pairs, b.pairs);
        prop_assert_eq!(a.statuses, b.statuses);
    }

    #[test]
    fn parallel_and_sequential_agree(rows in arb_input()) {
        let input = ReconInput::from_records(rows);
        let a = run(&recon_config(false), &input).unwrap();
        let b = run(&recon_config(true), &input).unwrap();
        prop_assert_eq!(a.pairs, b.pairs);
        prop_assert_eq!(a.statuses, b.statuses);
        prop_assert_eq!(a.effective, b.effective);
    }

    #[test]
    fn effective_flag_covers_every_leg(rows in arb_input()) {
        let result = run(&recon_config(false), &ReconInput::from_records(rows)).unwrap();
        let paired: HashSet<_> = result.pairs.iter().map(|p| &p.row_id).collect();
        for row in &result.effective {
            if row.record.is_cancelled {
                prop_assert!(row.is_cancelled_effective);
            }
            if let Some(id) = &row.row_id {
                if paired.contains(id) {
                    prop_assert!(row.is_cancelled_effective);
                }
            }
        }
    }
}
