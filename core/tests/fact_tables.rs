//! Transaction and funnel fact transforms.

mod common;

use chrono::NaiveDate;
use common::ts;
use growth_etl_core::{
    config::DuplicateStepPolicy,
    fct_funnel::build_fct_funnel,
    fct_transactions::build_fct_transactions,
    raw::{FunnelRow, TransactionRow},
    types::{FunnelStep, TransactionType},
    EtlError,
};

fn tx(user_id: i64, at: &str, amount: f64) -> TransactionRow {
    TransactionRow {
        user_id,
        transaction_time: ts(at),
        amount_eur: amount,
        category: "Travel".into(),
        merchant_country: "ES".into(),
        transaction_type: TransactionType::AtmWithdrawal,
    }
}

fn step(user_id: i64, step: FunnelStep, at: &str) -> FunnelRow {
    FunnelRow {
        user_id,
        step_order: i64::from(step.order()),
        step,
        event_time: ts(at),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn transactions_keep_rows_and_derive_calendar_fields() {
    let rows = vec![
        tx(2, "2024-07-31 23:59:59", 40.0),
        tx(1, "2024-08-01 00:00:00", 0.0),
        tx(2, "2024-07-31 23:59:59", 40.0),
    ];
    let facts = build_fct_transactions(&rows).unwrap();

    // No dedup, no reordering.
    assert_eq!(facts.len(), 3);
    assert_eq!(
        facts.iter().map(|f| f.user_id).collect::<Vec<_>>(),
        vec![2, 1, 2]
    );
    assert_eq!(facts[0].transaction_date, NaiveDate::from_ymd_opt(2024, 7, 31).unwrap());
    assert_eq!(facts[0].transaction_hour, 23);
    assert_eq!(facts[1].transaction_date, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
    assert_eq!(facts[1].transaction_hour, 0);

    for (fact, row) in facts.iter().zip(&rows) {
        assert_eq!(fact.transaction_time, row.transaction_time);
        assert_eq!(fact.amount_eur, row.amount_eur);
        assert_eq!(fact.category, row.category);
        assert_eq!(fact.merchant_country, row.merchant_country);
        assert_eq!(fact.transaction_type, row.transaction_type);
    }
}

#[test]
fn negative_amount_is_a_consistency_error() {
    let err = build_fct_transactions(&[tx(1, "2024-08-01 10:00:00", -0.01)]).unwrap_err();
    assert!(matches!(err, EtlError::Consistency(_)), "got {err}");
}

#[test]
fn non_finite_amount_is_a_consistency_error() {
    let err = build_fct_transactions(&[tx(1, "2024-08-01 10:00:00", f64::NAN)]).unwrap_err();
    assert!(matches!(err, EtlError::Consistency(_)), "got {err}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Funnel
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn funnel_is_sorted_by_user_then_time() {
    let rows = vec![
        step(2, FunnelStep::StartedRegistration, "2024-01-01 10:10:00"),
        step(1, FunnelStep::KycCompleted, "2024-01-02 09:00:00"),
        step(2, FunnelStep::ViewedSignup, "2024-01-01 10:00:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
        step(1, FunnelStep::StartedRegistration, "2024-01-01 08:30:00"),
    ];
    let funnel = build_fct_funnel(&rows, DuplicateStepPolicy::KeepFirst, true).unwrap();

    let order: Vec<(i64, u8)> = funnel.rows.iter().map(|f| (f.user_id, f.step_order)).collect();
    assert_eq!(order, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2)]);
    assert_eq!(funnel.report.input_rows, 5);
    assert_eq!(funnel.report.output_rows, 5);
    assert_eq!(funnel.report.duplicates_resolved, 0);
    assert_eq!(funnel.report.out_of_order_users, 0);
    assert_eq!(funnel.report.gapped_users, 0);
}

#[test]
fn duplicate_steps_keep_first_by_default() {
    let rows = vec![
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:05:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:10:00"),
    ];
    let funnel = build_fct_funnel(&rows, DuplicateStepPolicy::default(), false).unwrap();
    assert_eq!(funnel.rows.len(), 1);
    assert_eq!(funnel.rows[0].event_time, ts("2024-01-01 08:00:00"));
    assert_eq!(funnel.report.duplicates_resolved, 2);
}

#[test]
fn duplicate_steps_keep_last_when_configured() {
    let rows = vec![
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:05:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:10:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
    ];
    let funnel = build_fct_funnel(&rows, DuplicateStepPolicy::KeepLast, false).unwrap();
    assert_eq!(funnel.rows.len(), 1);
    assert_eq!(funnel.rows[0].event_time, ts("2024-01-01 08:10:00"));
    assert_eq!(funnel.report.duplicates_resolved, 2);
}

#[test]
fn duplicate_steps_fail_when_configured() {
    let rows = vec![
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
    ];
    let err = build_fct_funnel(&rows, DuplicateStepPolicy::Fail, false).unwrap_err();
    assert!(matches!(err, EtlError::Consistency(_)), "got {err}");
}

#[test]
fn step_order_must_match_step_name() {
    let mut row = step(1, FunnelStep::CardActivated, "2024-01-01 08:00:00");
    row.step_order = 3;
    let err = build_fct_funnel(&[row], DuplicateStepPolicy::KeepFirst, false).unwrap_err();
    assert!(matches!(err, EtlError::Schema { .. }), "got {err}");
}

#[test]
fn step_order_outside_range_is_a_schema_error() {
    let mut row = step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00");
    row.step_order = 6;
    let err = build_fct_funnel(&[row], DuplicateStepPolicy::KeepFirst, false).unwrap_err();
    assert!(matches!(err, EtlError::Schema { .. }), "got {err}");
}

#[test]
fn out_of_order_and_gapped_funnels_are_flagged() {
    let rows = vec![
        // User 1: KYC completed before registration started.
        step(1, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
        step(1, FunnelStep::KycCompleted, "2024-01-01 08:30:00"),
        step(1, FunnelStep::StartedRegistration, "2024-01-01 09:00:00"),
        // User 2: skipped registration.
        step(2, FunnelStep::ViewedSignup, "2024-01-01 08:00:00"),
        step(2, FunnelStep::KycCompleted, "2024-01-01 09:00:00"),
    ];
    let funnel = build_fct_funnel(&rows, DuplicateStepPolicy::KeepFirst, false).unwrap();
    assert_eq!(funnel.report.out_of_order_users, 1);
    assert_eq!(funnel.report.gapped_users, 1);
    assert_eq!(funnel.rows.len(), 5);

    let err = build_fct_funnel(&rows, DuplicateStepPolicy::KeepFirst, true).unwrap_err();
    assert!(matches!(err, EtlError::Consistency(_)), "got {err}");
}
