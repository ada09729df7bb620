//! Raw event store: the five delimited-text sources the generator produces.
//!
//! RULE: Headers are checked before any row is parsed.
//! A missing column is a schema error; an unparseable cell is a data type
//! error carrying the 1-based data row. Nothing is skipped or defaulted here.

use crate::{
    error::{EtlError, EtlResult},
    types::{FunnelStep, KycStatus, TransactionType, UserId},
};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ByteRecord, StringRecord};
use std::{fs::File, path::Path};

pub const USERS_FILE: &str = "users.csv";
pub const KYC_FILE: &str = "kyc.csv";
pub const CARDS_FILE: &str = "cards.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const FUNNEL_FILE: &str = "funnel_events.csv";

pub const USERS_COLUMNS: [&str; 5] =
    ["user_id", "signup_at", "country", "device", "marketing_channel"];
pub const KYC_COLUMNS: [&str; 4] =
    ["user_id", "kyc_started_at", "kyc_completed_at", "kyc_status"];
pub const CARDS_COLUMNS: [&str; 3] = ["user_id", "card_activated_at", "card_type"];
pub const TRANSACTIONS_COLUMNS: [&str; 6] = [
    "user_id",
    "transaction_time",
    "amount_eur",
    "category",
    "merchant_country",
    "transaction_type",
];
pub const FUNNEL_COLUMNS: [&str; 4] = ["user_id", "step_order", "step_name", "event_time"];

/// Rendering used when the generator writes timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_PARSE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq)]
pub struct SignupRow {
    pub user_id: UserId,
    pub signup_at: NaiveDateTime,
    pub country: String,
    pub device: String,
    pub marketing_channel: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KycRow {
    pub user_id: UserId,
    pub kyc_started_at: NaiveDateTime,
    pub kyc_completed_at: Option<NaiveDateTime>,
    pub kyc_status: KycStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardRow {
    pub user_id: UserId,
    pub card_activated_at: NaiveDateTime,
    pub card_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub user_id: UserId,
    pub transaction_time: NaiveDateTime,
    pub amount_eur: f64,
    pub category: String,
    pub merchant_country: String,
    pub transaction_type: TransactionType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelRow {
    pub user_id: UserId,
    /// As found in the file; checked against `step` by the funnel transform.
    pub step_order: i64,
    pub step: FunnelStep,
    pub event_time: NaiveDateTime,
}

/// All raw sources for one pipeline run, fully in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSources {
    pub users: Vec<SignupRow>,
    pub kyc: Vec<KycRow>,
    pub cards: Vec<CardRow>,
    pub transactions: Vec<TransactionRow>,
    pub funnel: Vec<FunnelRow>,
}

impl RawSources {
    /// Read every source file from `dir`.
    pub fn load(dir: &Path) -> EtlResult<Self> {
        let sources = Self {
            users: read_source(&dir.join(USERS_FILE), &USERS_COLUMNS, parse_signup)?,
            kyc: read_source(&dir.join(KYC_FILE), &KYC_COLUMNS, parse_kyc)?,
            cards: read_source(&dir.join(CARDS_FILE), &CARDS_COLUMNS, parse_card)?,
            transactions: read_source(
                &dir.join(TRANSACTIONS_FILE),
                &TRANSACTIONS_COLUMNS,
                parse_transaction,
            )?,
            funnel: read_source(&dir.join(FUNNEL_FILE), &FUNNEL_COLUMNS, parse_funnel)?,
        };
        log::info!(
            "raw: loaded {} users, {} kyc, {} cards, {} transactions, {} funnel events",
            sources.users.len(),
            sources.kyc.len(),
            sources.cards.len(),
            sources.transactions.len(),
            sources.funnel.len()
        );
        Ok(sources)
    }
}

/// Parse a naive timestamp. No timezone conversion is ever applied.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// One data row with its header mapping, for typed cell access.
/// Cells stay raw bytes until a required column is read.
struct Row<'a> {
    table: &'a str,
    line: usize,
    record: &'a ByteRecord,
    columns: &'a [&'a str],
    positions: &'a [usize],
}

impl<'a> Row<'a> {
    fn text(&self, col: usize) -> EtlResult<&'a str> {
        let bytes = self.record.get(self.positions[col]).unwrap_or_default();
        std::str::from_utf8(bytes)
            .map(str::trim)
            .map_err(|_| self.fail(col, &String::from_utf8_lossy(bytes)))
    }

    fn fail(&self, col: usize, value: &str) -> EtlError {
        EtlError::data_type(self.table, self.line, self.columns[col], value)
    }

    fn parsed<T>(&self, col: usize, parse: impl FnOnce(&str) -> Option<T>) -> EtlResult<T> {
        let text = self.text(col)?;
        parse(text).ok_or_else(|| self.fail(col, text))
    }

    fn string(&self, col: usize) -> EtlResult<String> {
        self.text(col).map(str::to_string)
    }

    fn int(&self, col: usize) -> EtlResult<i64> {
        self.parsed(col, |t| t.parse().ok())
    }

    fn float(&self, col: usize) -> EtlResult<f64> {
        self.parsed(col, |t| t.parse().ok())
    }

    fn timestamp(&self, col: usize) -> EtlResult<NaiveDateTime> {
        self.parsed(col, parse_timestamp)
    }

    fn optional_timestamp(&self, col: usize) -> EtlResult<Option<NaiveDateTime>> {
        if self.text(col)?.is_empty() {
            return Ok(None);
        }
        self.timestamp(col).map(Some)
    }

    fn code<T>(&self, col: usize, from_code: fn(&str) -> Option<T>) -> EtlResult<T> {
        self.parsed(col, from_code)
    }
}

fn read_source<T>(
    path: &Path,
    columns: &[&str],
    parse: fn(&Row<'_>) -> EtlResult<T>,
) -> EtlResult<Vec<T>> {
    let table = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file = File::open(path).map_err(|e| EtlError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader.headers()?.clone();
    let positions = resolve_columns(&table, &headers, columns)?;

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    let mut line = 0usize;
    while reader.read_byte_record(&mut record)? {
        line += 1;
        let row = Row {
            table: &table,
            line,
            record: &record,
            columns,
            positions: &positions,
        };
        rows.push(parse(&row)?);
    }
    log::debug!("raw: {table}: {} rows", rows.len());
    Ok(rows)
}

/// Map each required column name to its position in the header.
fn resolve_columns(table: &str, headers: &StringRecord, columns: &[&str]) -> EtlResult<Vec<usize>> {
    columns
        .iter()
        .map(|col| {
            headers
                .iter()
                .position(|h| h.trim() == *col)
                .ok_or_else(|| EtlError::schema(table, format!("missing required column '{col}'")))
        })
        .collect()
}

fn parse_signup(row: &Row<'_>) -> EtlResult<SignupRow> {
    Ok(SignupRow {
        user_id: row.int(0)?,
        signup_at: row.timestamp(1)?,
        country: row.string(2)?,
        device: row.string(3)?,
        marketing_channel: row.string(4)?,
    })
}

fn parse_kyc(row: &Row<'_>) -> EtlResult<KycRow> {
    Ok(KycRow {
        user_id: row.int(0)?,
        kyc_started_at: row.timestamp(1)?,
        kyc_completed_at: row.optional_timestamp(2)?,
        kyc_status: row.code(3, KycStatus::from_code)?,
    })
}

fn parse_card(row: &Row<'_>) -> EtlResult<CardRow> {
    Ok(CardRow {
        user_id: row.int(0)?,
        card_activated_at: row.timestamp(1)?,
        card_type: row.string(2)?,
    })
}

fn parse_transaction(row: &Row<'_>) -> EtlResult<TransactionRow> {
    Ok(TransactionRow {
        user_id: row.int(0)?,
        transaction_time: row.timestamp(1)?,
        amount_eur: row.float(2)?,
        category: row.string(3)?,
        merchant_country: row.string(4)?,
        transaction_type: row.code(5, TransactionType::from_code)?,
    })
}

fn parse_funnel(row: &Row<'_>) -> EtlResult<FunnelRow> {
    Ok(FunnelRow {
        user_id: row.int(0)?,
        step_order: row.int(1)?,
        step: row.code(2, FunnelStep::from_code)?,
        event_time: row.timestamp(3)?,
    })
}
