//! Funnel fact table: one row per (user, step), chronologically ordered.
//!
//! Duplicate (user, step) rows are resolved by DuplicateStepPolicy and
//! always counted in the report. Out-of-order and gapped funnels are
//! flagged; they only abort the run in strict mode.

use crate::{
    config::DuplicateStepPolicy,
    error::{EtlError, EtlResult},
    raw::FunnelRow,
    types::{FunnelStep, UserId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const TABLE_NAME: &str = "fct_funnel";

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelFact {
    pub user_id: UserId,
    pub step_order: u8,
    pub step: FunnelStep,
    pub event_time: NaiveDateTime,
}

/// Data-quality findings from one funnel normalization pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunnelReport {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows dropped because another row for the same (user, step) was kept.
    pub duplicates_resolved: usize,
    /// Users whose steps, in time order, go backwards in step order.
    pub out_of_order_users: usize,
    /// Users whose recorded steps are not a 1..=k prefix of the funnel.
    pub gapped_users: usize,
}

#[derive(Debug, Clone)]
pub struct FctFunnel {
    pub rows: Vec<FunnelFact>,
    pub report: FunnelReport,
}

pub fn build_fct_funnel(
    rows: &[FunnelRow],
    policy: DuplicateStepPolicy,
    strict_order: bool,
) -> EtlResult<FctFunnel> {
    for (i, row) in rows.iter().enumerate() {
        check_step_order(i + 1, row)?;
    }

    // (user, step) -> index of the row currently kept.
    let mut kept: HashMap<(UserId, FunnelStep), usize> = HashMap::with_capacity(rows.len());
    let mut duplicates = 0usize;

    for (idx, row) in rows.iter().enumerate() {
        let key = (row.user_id, row.step);
        let Some(&current) = kept.get(&key) else {
            kept.insert(key, idx);
            continue;
        };
        duplicates += 1;
        let replace = match policy {
            DuplicateStepPolicy::KeepFirst => row.event_time < rows[current].event_time,
            DuplicateStepPolicy::KeepLast => row.event_time >= rows[current].event_time,
            DuplicateStepPolicy::Fail => {
                return Err(EtlError::Consistency(format!(
                    "duplicate funnel rows for user {} step {} (data rows {} and {})",
                    row.user_id,
                    row.step.as_str(),
                    current + 1,
                    idx + 1
                )));
            }
        };
        if replace {
            kept.insert(key, idx);
        }
    }

    let mut chosen: Vec<usize> = kept.into_values().collect();
    chosen.sort_unstable();

    let mut facts: Vec<FunnelFact> = chosen
        .into_iter()
        .map(|idx| {
            let row = &rows[idx];
            FunnelFact {
                user_id: row.user_id,
                step_order: row.step.order(),
                step: row.step,
                event_time: row.event_time,
            }
        })
        .collect();
    // Stable: equal keys keep input order.
    facts.sort_by(|a, b| {
        (a.user_id, a.event_time, a.step_order).cmp(&(b.user_id, b.event_time, b.step_order))
    });

    let (out_of_order_users, gapped_users) = audit_sequences(&facts);

    if duplicates > 0 {
        log::warn!("{TABLE_NAME}: resolved {duplicates} duplicate (user, step) rows with {policy:?}");
    }
    if out_of_order_users > 0 || gapped_users > 0 {
        log::warn!(
            "{TABLE_NAME}: {out_of_order_users} users with out-of-order steps, {gapped_users} users with gaps"
        );
        if strict_order {
            return Err(EtlError::Consistency(format!(
                "funnel sequence violations: {out_of_order_users} out-of-order users, {gapped_users} gapped users"
            )));
        }
    }

    let report = FunnelReport {
        input_rows: rows.len(),
        output_rows: facts.len(),
        duplicates_resolved: duplicates,
        out_of_order_users,
        gapped_users,
    };
    log::debug!("{TABLE_NAME}: {report:?}");
    Ok(FctFunnel { rows: facts, report })
}

/// Distinct steps recorded per user.
pub fn steps_per_user(facts: &[FunnelFact]) -> HashMap<UserId, usize> {
    let mut counts = HashMap::new();
    for fact in facts {
        *counts.entry(fact.user_id).or_insert(0) += 1;
    }
    counts
}

fn check_step_order(line: usize, row: &FunnelRow) -> EtlResult<()> {
    let expected = i64::from(row.step.order());
    if !(1..=FunnelStep::ALL.len() as i64).contains(&row.step_order) {
        return Err(EtlError::schema(
            TABLE_NAME,
            format!("row {line}: step_order {} outside 1..=5", row.step_order),
        ));
    }
    if row.step_order != expected {
        return Err(EtlError::schema(
            TABLE_NAME,
            format!(
                "row {line}: step_order {} does not match {} (expected {expected})",
                row.step_order,
                row.step.as_str()
            ),
        ));
    }
    Ok(())
}

/// Returns (out_of_order_users, gapped_users). Expects facts sorted by
/// (user, time) with at most one row per (user, step).
fn audit_sequences(facts: &[FunnelFact]) -> (usize, usize) {
    let mut per_user: BTreeMap<UserId, Vec<u8>> = BTreeMap::new();
    for fact in facts {
        per_user.entry(fact.user_id).or_default().push(fact.step_order);
    }

    let mut out_of_order = 0;
    let mut gapped = 0;
    for orders in per_user.values() {
        if orders.windows(2).any(|w| w[1] < w[0]) {
            out_of_order += 1;
        }
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        if sorted.iter().enumerate().any(|(i, order)| usize::from(*order) != i + 1) {
            gapped += 1;
        }
    }
    (out_of_order, gapped)
}
