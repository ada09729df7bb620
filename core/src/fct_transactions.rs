//! Transaction fact table: the raw transaction source at row granularity,
//! with calendar date and hour-of-day derived from the timestamp.

use crate::{
    error::{EtlError, EtlResult},
    raw::TransactionRow,
    types::{TransactionType, UserId},
};
use chrono::{NaiveDate, NaiveDateTime, Timelike};

pub const TABLE_NAME: &str = "fct_transactions";

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFact {
    pub user_id: UserId,
    pub transaction_time: NaiveDateTime,
    pub amount_eur: f64,
    pub category: String,
    pub merchant_country: String,
    pub transaction_type: TransactionType,
    pub transaction_date: NaiveDate,
    /// 0..=23, same clock as `transaction_time`.
    pub transaction_hour: u32,
}

impl TransactionFact {
    fn from_row(row: &TransactionRow) -> Self {
        Self {
            user_id: row.user_id,
            transaction_time: row.transaction_time,
            amount_eur: row.amount_eur,
            category: row.category.clone(),
            merchant_country: row.merchant_country.clone(),
            transaction_type: row.transaction_type,
            transaction_date: row.transaction_time.date(),
            transaction_hour: row.transaction_time.hour(),
        }
    }
}

/// One output row per input row, in input order. No dedup, no aggregation.
pub fn build_fct_transactions(rows: &[TransactionRow]) -> EtlResult<Vec<TransactionFact>> {
    let mut facts = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if !row.amount_eur.is_finite() || row.amount_eur < 0.0 {
            return Err(EtlError::Consistency(format!(
                "{TABLE_NAME}: row {} for user {} has invalid amount {}",
                i + 1,
                row.user_id,
                row.amount_eur
            )));
        }
        facts.push(TransactionFact::from_row(row));
    }
    log::debug!("{TABLE_NAME}: {} rows", facts.len());
    Ok(facts)
}
