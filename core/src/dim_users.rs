//! User dimension: one row per signed-up user.
//!
//! The signup source is the anchor. KYC, card and transaction summaries
//! are reduced per user in a single pass each, then left-joined on
//! user_id through keyed lookups.
//!
//! Null policy:
//!   - Fields from a source the user never appears in stay None.
//!   - total_transactions / total_amount_eur default to 0.
//!   - The three flags are always defined.
//!   - An elapsed metric is None unless both endpoints exist and end >= start.
//!     A reversed interval is counted in ReversedIntervals and warned about.

use crate::{
    error::{EtlError, EtlResult},
    fct_funnel::{steps_per_user, FunnelFact},
    raw::RawSources,
    types::{KycStatus, UserId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const TABLE_NAME: &str = "dim_users";

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub signup_at: NaiveDateTime,
    pub country: String,
    pub device: String,
    pub marketing_channel: String,

    pub first_kyc_started_at: Option<NaiveDateTime>,
    pub first_kyc_completed_at: Option<NaiveDateTime>,
    pub kyc_status: Option<KycStatus>,
    pub has_kyc_approved: bool,

    pub card_activated_at: Option<NaiveDateTime>,
    pub card_type: Option<String>,
    pub has_card_activated: bool,

    pub first_transaction_at: Option<NaiveDateTime>,
    pub total_transactions: i64,
    pub total_amount_eur: f64,
    pub has_topup: bool,

    pub time_to_kyc_hours: Option<f64>,
    pub time_kyc_to_card_hours: Option<f64>,
    pub time_card_to_first_tx_hours: Option<f64>,

    pub steps_count: i64,
}

/// Rows in a downstream source whose user never signed up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrphanCounts {
    pub kyc: usize,
    pub cards: usize,
    pub transactions: usize,
    pub funnel: usize,
}

impl OrphanCounts {
    pub fn total(&self) -> usize {
        self.kyc + self.cards + self.transactions + self.funnel
    }
}

/// Users whose elapsed metric was nulled because its end precedes its start.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReversedIntervals {
    /// KYC rows whose completion precedes their own start.
    pub kyc_attempts: usize,
    pub time_to_kyc: usize,
    pub kyc_to_card: usize,
    pub card_to_first_tx: usize,
}

impl ReversedIntervals {
    pub fn total(&self) -> usize {
        self.kyc_attempts + self.time_to_kyc + self.kyc_to_card + self.card_to_first_tx
    }
}

#[derive(Debug, Clone)]
pub struct DimUsers {
    pub rows: Vec<UserRecord>,
    pub orphans: OrphanCounts,
    pub reversed: ReversedIntervals,
}

#[derive(Debug, Clone)]
struct KycSummary {
    first_started: NaiveDateTime,
    first_completed: Option<NaiveDateTime>,
    latest_started: NaiveDateTime,
    status: KycStatus,
}

#[derive(Debug, Clone)]
struct CardSummary {
    first_activated: NaiveDateTime,
    latest_activated: NaiveDateTime,
    card_type: String,
}

#[derive(Debug, Clone)]
struct TxSummary {
    first_at: NaiveDateTime,
    count: i64,
    total_amount: f64,
}

/// Elapsed hours from `start` to `end`.
/// None when either endpoint is missing or `end` precedes `start`.
pub fn elapsed_hours(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Option<f64> {
    let (start, end) = (start?, end?);
    if end < start {
        return None;
    }
    Some((end - start).num_microseconds()? as f64 / 3_600_000_000.0)
}

fn is_reversed(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> bool {
    matches!((start, end), (Some(start), Some(end)) if end < start)
}

pub fn build_dim_users(sources: &RawSources, funnel: &[FunnelFact]) -> EtlResult<DimUsers> {
    let mut known: HashSet<UserId> = HashSet::with_capacity(sources.users.len());
    for (i, user) in sources.users.iter().enumerate() {
        if !known.insert(user.user_id) {
            return Err(EtlError::Consistency(format!(
                "{TABLE_NAME}: user_id {} appears more than once in the signup source (data row {})",
                user.user_id,
                i + 1
            )));
        }
    }

    let kyc = summarize_kyc(sources);
    let cards = summarize_cards(sources);
    let txns = summarize_transactions(sources);
    let steps = steps_per_user(funnel);

    let orphans = OrphanCounts {
        kyc: sources.kyc.iter().filter(|r| !known.contains(&r.user_id)).count(),
        cards: sources.cards.iter().filter(|r| !known.contains(&r.user_id)).count(),
        transactions: sources
            .transactions
            .iter()
            .filter(|r| !known.contains(&r.user_id))
            .count(),
        funnel: funnel.iter().filter(|r| !known.contains(&r.user_id)).count(),
    };
    if orphans.total() > 0 {
        log::warn!("{TABLE_NAME}: ignoring rows for unknown users: {orphans:?}");
    }

    let mut reversed = ReversedIntervals {
        kyc_attempts: sources
            .kyc
            .iter()
            .filter(|r| known.contains(&r.user_id))
            .filter(|r| is_reversed(Some(r.kyc_started_at), r.kyc_completed_at))
            .count(),
        ..ReversedIntervals::default()
    };

    let rows: Vec<UserRecord> = sources
        .users
        .iter()
        .map(|user| {
            let k = kyc.get(&user.user_id);
            let c = cards.get(&user.user_id);
            let t = txns.get(&user.user_id);

            let first_kyc_started_at = k.map(|k| k.first_started);
            let first_kyc_completed_at = k.and_then(|k| k.first_completed);
            let card_activated_at = c.map(|c| c.first_activated);
            let first_transaction_at = t.map(|t| t.first_at);

            if is_reversed(Some(user.signup_at), first_kyc_started_at) {
                reversed.time_to_kyc += 1;
            }
            if is_reversed(first_kyc_completed_at, card_activated_at) {
                reversed.kyc_to_card += 1;
            }
            if is_reversed(card_activated_at, first_transaction_at) {
                reversed.card_to_first_tx += 1;
            }

            UserRecord {
                user_id: user.user_id,
                signup_at: user.signup_at,
                country: user.country.clone(),
                device: user.device.clone(),
                marketing_channel: user.marketing_channel.clone(),

                first_kyc_started_at,
                first_kyc_completed_at,
                kyc_status: k.map(|k| k.status),
                has_kyc_approved: k.is_some_and(|k| k.status == KycStatus::Approved),

                card_activated_at,
                card_type: c.map(|c| c.card_type.clone()),
                has_card_activated: c.is_some(),

                first_transaction_at,
                total_transactions: t.map_or(0, |t| t.count),
                total_amount_eur: t.map_or(0.0, |t| t.total_amount),
                has_topup: t.is_some(),

                time_to_kyc_hours: elapsed_hours(Some(user.signup_at), first_kyc_started_at),
                time_kyc_to_card_hours: elapsed_hours(first_kyc_completed_at, card_activated_at),
                time_card_to_first_tx_hours: elapsed_hours(card_activated_at, first_transaction_at),

                steps_count: steps.get(&user.user_id).copied().unwrap_or(0) as i64,
            }
        })
        .collect();

    if reversed.total() > 0 {
        log::warn!("{TABLE_NAME}: end before start, metrics left null: {reversed:?}");
    }

    log::debug!(
        "{TABLE_NAME}: {} rows, {} kyc approved, {} cards, {} topped up",
        rows.len(),
        rows.iter().filter(|r| r.has_kyc_approved).count(),
        rows.iter().filter(|r| r.has_card_activated).count(),
        rows.iter().filter(|r| r.has_topup).count()
    );
    Ok(DimUsers { rows, orphans, reversed })
}

/// Earliest start, earliest completion, status of the latest attempt
/// (ties on start time: the later row in the file wins).
fn summarize_kyc(sources: &RawSources) -> HashMap<UserId, KycSummary> {
    let mut out: HashMap<UserId, KycSummary> = HashMap::new();
    for row in &sources.kyc {
        match out.get_mut(&row.user_id) {
            None => {
                out.insert(
                    row.user_id,
                    KycSummary {
                        first_started: row.kyc_started_at,
                        first_completed: row.kyc_completed_at,
                        latest_started: row.kyc_started_at,
                        status: row.kyc_status,
                    },
                );
            }
            Some(s) => {
                s.first_started = s.first_started.min(row.kyc_started_at);
                s.first_completed = match (s.first_completed, row.kyc_completed_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if row.kyc_started_at >= s.latest_started {
                    s.latest_started = row.kyc_started_at;
                    s.status = row.kyc_status;
                }
            }
        }
    }
    out
}

/// Earliest activation; card type of the latest activation.
fn summarize_cards(sources: &RawSources) -> HashMap<UserId, CardSummary> {
    let mut out: HashMap<UserId, CardSummary> = HashMap::new();
    for row in &sources.cards {
        match out.get_mut(&row.user_id) {
            None => {
                out.insert(
                    row.user_id,
                    CardSummary {
                        first_activated: row.card_activated_at,
                        latest_activated: row.card_activated_at,
                        card_type: row.card_type.clone(),
                    },
                );
            }
            Some(s) => {
                s.first_activated = s.first_activated.min(row.card_activated_at);
                if row.card_activated_at >= s.latest_activated {
                    s.latest_activated = row.card_activated_at;
                    s.card_type = row.card_type.clone();
                }
            }
        }
    }
    out
}

fn summarize_transactions(sources: &RawSources) -> HashMap<UserId, TxSummary> {
    let mut out: HashMap<UserId, TxSummary> = HashMap::new();
    for row in &sources.transactions {
        let s = out.entry(row.user_id).or_insert(TxSummary {
            first_at: row.transaction_time,
            count: 0,
            total_amount: 0.0,
        });
        s.first_at = s.first_at.min(row.transaction_time);
        s.count += 1;
        s.total_amount += row.amount_eur;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn elapsed_hours_is_fractional() {
        let start = t0();
        let end = start + Duration::minutes(90);
        assert_eq!(elapsed_hours(Some(start), Some(end)), Some(1.5));
        assert_eq!(elapsed_hours(Some(start), Some(start)), Some(0.0));
    }

    #[test]
    fn elapsed_hours_keeps_sub_millisecond_precision() {
        let start = t0();
        let end = start + Duration::microseconds(900);
        assert_eq!(elapsed_hours(Some(start), Some(end)), Some(900.0 / 3_600_000_000.0));
        assert!(elapsed_hours(Some(start), Some(end)).is_some_and(|h| h > 0.0));
    }

    #[test]
    fn elapsed_hours_is_null_on_missing_or_reversed_endpoints() {
        let start = t0();
        assert_eq!(elapsed_hours(None, Some(start)), None);
        assert_eq!(elapsed_hours(Some(start), None), None);
        assert_eq!(elapsed_hours(Some(start), Some(start - Duration::seconds(1))), None);
    }
}
