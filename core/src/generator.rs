//! Synthetic onboarding data: the raw sources the pipeline consumes.
//!
//! Journey per user:
//!   VIEWED_SIGNUP → STARTED_REGISTRATION → KYC_COMPLETED
//!   → CARD_ACTIVATED (APPROVED only) → FIRST_TOPUP (+ transactions)
//! with a drop-off probability at every step.
//!
//! Same GeneratorConfig (seed included) = same files, byte for byte.

use crate::{
    config::GeneratorConfig,
    error::{EtlError, EtlResult},
    raw::{
        self, CardRow, FunnelRow, KycRow, RawSources, SignupRow, TransactionRow, CARDS_COLUMNS,
        FUNNEL_COLUMNS, KYC_COLUMNS, TIMESTAMP_FORMAT, TRANSACTIONS_COLUMNS, USERS_COLUMNS,
    },
    rng::{RngBank, StreamSlot},
    types::{FunnelStep, KycStatus, TransactionType},
    warehouse::replace_atomically,
};
use chrono::{Duration, NaiveDateTime};
use std::{fs, path::Path};

pub const COUNTRIES: [&str; 6] = ["AT", "DE", "UK", "FR", "ES", "IT"];
pub const DEVICES: [&str; 3] = ["iOS", "Android", "Web"];
pub const CHANNELS: [&str; 5] = ["Organic", "Paid Search", "Referral", "Social", "Influencer"];
pub const CARD_TYPES: [&str; 2] = ["Virtual", "Physical"];
pub const CATEGORIES: [&str; 6] = [
    "Groceries",
    "Restaurants",
    "Transport",
    "Online Shopping",
    "Travel",
    "Subscriptions",
];

fn funnel_row(user_id: i64, step: FunnelStep, event_time: NaiveDateTime) -> FunnelRow {
    FunnelRow {
        user_id,
        step_order: i64::from(step.order()),
        step,
        event_time,
    }
}

/// Generate all five raw sources in memory.
pub fn generate(config: &GeneratorConfig) -> EtlResult<RawSources> {
    let start = config.signup_start.and_hms_opt(0, 0, 0).ok_or_else(|| {
        EtlError::Consistency(format!("invalid signup_start {}", config.signup_start))
    })?;
    let days_range = (config.signup_end - config.signup_start).num_days();
    if days_range < 0 {
        return Err(EtlError::Consistency(format!(
            "signup_end {} precedes signup_start {}",
            config.signup_end, config.signup_start
        )));
    }

    let bank = RngBank::new(config.seed);
    let mut out = RawSources::default();

    // ── Users ─────────────────────────────────────
    let mut rng = bank.for_stream(StreamSlot::Users);
    for user_id in 1..=i64::from(config.users) {
        let signup_at = start
            + Duration::days(rng.range_inclusive(0, days_range))
            + Duration::seconds(rng.range_inclusive(0, 24 * 3600));
        out.users.push(SignupRow {
            user_id,
            signup_at,
            country: rng.pick(&COUNTRIES).to_string(),
            device: rng.pick(&DEVICES).to_string(),
            marketing_channel: rng.pick(&CHANNELS).to_string(),
        });
    }

    // ── Registration + KYC ────────────────────────
    let mut rng = bank.for_stream(StreamSlot::Onboarding);
    for user in &out.users {
        let uid = user.user_id;
        out.funnel.push(funnel_row(uid, FunnelStep::ViewedSignup, user.signup_at));

        if !rng.chance(config.p_start_registration) {
            continue;
        }
        let registered_at = user.signup_at + Duration::minutes(rng.range_inclusive(1, 60));
        out.funnel.push(funnel_row(uid, FunnelStep::StartedRegistration, registered_at));

        if !rng.chance(config.p_reach_kyc) {
            continue;
        }
        let kyc_start = registered_at + Duration::minutes(rng.range_inclusive(5, 120));
        let kyc_end = kyc_start + Duration::minutes(rng.range_inclusive(2, 60));
        let roll = rng.next_f64();
        let status = if roll < config.p_kyc_approved {
            KycStatus::Approved
        } else if roll < config.p_kyc_approved + config.p_kyc_failed {
            KycStatus::Failed
        } else {
            KycStatus::Pending
        };
        out.kyc.push(KycRow {
            user_id: uid,
            kyc_started_at: kyc_start,
            kyc_completed_at: Some(kyc_end),
            kyc_status: status,
        });
        out.funnel.push(funnel_row(uid, FunnelStep::KycCompleted, kyc_end));
    }

    // ── Cards (approved KYC only) ─────────────────
    let mut rng = bank.for_stream(StreamSlot::Cards);
    for kyc in &out.kyc {
        if kyc.kyc_status != KycStatus::Approved || !rng.chance(config.p_card_activation) {
            continue;
        }
        let Some(completed) = kyc.kyc_completed_at else {
            continue;
        };
        let activated_at = completed
            + Duration::days(rng.range_inclusive(0, 7))
            + Duration::minutes(rng.range_inclusive(10, 180));
        out.cards.push(CardRow {
            user_id: kyc.user_id,
            card_activated_at: activated_at,
            card_type: rng.pick(&CARD_TYPES).to_string(),
        });
        out.funnel.push(funnel_row(kyc.user_id, FunnelStep::CardActivated, activated_at));
    }

    // ── First top-up + spending ───────────────────
    let mut rng = bank.for_stream(StreamSlot::Transactions);
    let max_tx = i64::from(config.max_transactions_per_user.max(1));
    for card in &out.cards {
        let first_topup = card.card_activated_at + Duration::hours(rng.range_inclusive(1, 72));
        if !rng.chance(config.p_topup) {
            continue;
        }
        out.funnel.push(funnel_row(card.user_id, FunnelStep::FirstTopup, first_topup));

        for _ in 0..rng.range_inclusive(1, max_tx) {
            let transaction_time = first_topup
                + Duration::days(rng.range_inclusive(0, 90))
                + Duration::minutes(rng.range_inclusive(0, 24 * 60));
            let amount = rng.lognormal(config.amount_log_mean, config.amount_log_sigma);
            out.transactions.push(TransactionRow {
                user_id: card.user_id,
                transaction_time,
                amount_eur: (amount * 100.0).round() / 100.0,
                category: rng.pick(&CATEGORIES).to_string(),
                merchant_country: rng.pick(&COUNTRIES).to_string(),
                transaction_type: *rng.pick(&TransactionType::ALL),
            });
        }
    }

    log::info!(
        "generator: seed={} users={} kyc={} cards={} transactions={} funnel={}",
        config.seed,
        out.users.len(),
        out.kyc.len(),
        out.cards.len(),
        out.transactions.len(),
        out.funnel.len()
    );
    Ok(out)
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn write_csv<T>(
    dir: &Path,
    file_name: &str,
    header: &[&str],
    rows: &[T],
    render: impl Fn(&T) -> Vec<String>,
) -> EtlResult<()> {
    let path = dir.join(file_name);
    replace_atomically(&path, |tmp| {
        let mut writer = csv::Writer::from_path(tmp)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(render(row))?;
        }
        writer.flush().map_err(|e| EtlError::io(tmp, e))?;
        Ok(())
    })?;
    log::debug!("generator: wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write the raw sources as the five CSV files the pipeline reads.
pub fn write_raw_sources(dir: &Path, sources: &RawSources) -> EtlResult<()> {
    fs::create_dir_all(dir).map_err(|e| EtlError::io(dir, e))?;

    write_csv(dir, raw::USERS_FILE, &USERS_COLUMNS, &sources.users, |r| {
        vec![
            r.user_id.to_string(),
            fmt_ts(r.signup_at),
            r.country.clone(),
            r.device.clone(),
            r.marketing_channel.clone(),
        ]
    })?;
    write_csv(dir, raw::KYC_FILE, &KYC_COLUMNS, &sources.kyc, |r| {
        vec![
            r.user_id.to_string(),
            fmt_ts(r.kyc_started_at),
            r.kyc_completed_at.map(fmt_ts).unwrap_or_default(),
            r.kyc_status.as_str().to_string(),
        ]
    })?;
    write_csv(dir, raw::CARDS_FILE, &CARDS_COLUMNS, &sources.cards, |r| {
        vec![r.user_id.to_string(), fmt_ts(r.card_activated_at), r.card_type.clone()]
    })?;
    write_csv(
        dir,
        raw::TRANSACTIONS_FILE,
        &TRANSACTIONS_COLUMNS,
        &sources.transactions,
        |r| {
            vec![
                r.user_id.to_string(),
                fmt_ts(r.transaction_time),
                format!("{:.2}", r.amount_eur),
                r.category.clone(),
                r.merchant_country.clone(),
                r.transaction_type.as_str().to_string(),
            ]
        },
    )?;
    write_csv(dir, raw::FUNNEL_FILE, &FUNNEL_COLUMNS, &sources.funnel, |r| {
        vec![
            r.user_id.to_string(),
            r.step_order.to_string(),
            r.step.as_str().to_string(),
            fmt_ts(r.event_time),
        ]
    })?;
    Ok(())
}
