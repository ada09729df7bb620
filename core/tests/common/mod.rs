//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use arrow::{
    array::{Array, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray},
    compute::concat_batches,
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, NaiveDateTime};
use growth_etl_core::{
    raw::{parse_timestamp, CARDS_FILE, FUNNEL_FILE, KYC_FILE, TRANSACTIONS_FILE, USERS_FILE},
    warehouse::read_table,
    PipelineConfig,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub const USERS_HEADER: &str = "user_id,signup_at,country,device,marketing_channel\n";
pub const KYC_HEADER: &str = "user_id,kyc_started_at,kyc_completed_at,kyc_status\n";
pub const CARDS_HEADER: &str = "user_id,card_activated_at,card_type\n";
pub const TRANSACTIONS_HEADER: &str =
    "user_id,transaction_time,amount_eur,category,merchant_country,transaction_type\n";
pub const FUNNEL_HEADER: &str = "user_id,step_order,step_name,event_time\n";

pub fn ts(raw: &str) -> NaiveDateTime {
    parse_timestamp(raw).expect("valid test timestamp")
}

/// A scratch project: `raw/` holding header-only CSVs, `warehouse/` empty.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = Self { dir };
        fs::create_dir_all(fixture.raw_dir()).expect("raw dir");
        fixture.write(USERS_FILE, USERS_HEADER);
        fixture.write(KYC_FILE, KYC_HEADER);
        fixture.write(CARDS_FILE, CARDS_HEADER);
        fixture.write(TRANSACTIONS_FILE, TRANSACTIONS_HEADER);
        fixture.write(FUNNEL_FILE, FUNNEL_HEADER);
        fixture
    }

    /// The two-user dataset used across tests:
    /// user 1 walks the whole journey, user 2 only signs up.
    pub fn journey() -> Self {
        let fixture = Self::new();
        fixture.write(
            USERS_FILE,
            &format!(
                "{USERS_HEADER}\
                 1,2024-03-01 10:00:00,DE,iOS,Organic\n\
                 2,2024-03-02 08:00:00,FR,Web,Referral\n"
            ),
        );
        fixture.write(
            KYC_FILE,
            &format!("{KYC_HEADER}1,2024-03-01 11:00:00,2024-03-01 11:30:00,APPROVED\n"),
        );
        fixture.write(
            CARDS_FILE,
            &format!("{CARDS_HEADER}1,2024-03-01 20:00:00,Virtual\n"),
        );
        fixture.write(
            TRANSACTIONS_FILE,
            &format!(
                "{TRANSACTIONS_HEADER}\
                 1,2024-03-03 09:15:00,7.25,Transport,AT,TRANSFER\n\
                 1,2024-03-01 22:00:00,12.50,Groceries,DE,CARD_PAYMENT\n"
            ),
        );
        fixture.write(
            FUNNEL_FILE,
            &format!(
                "{FUNNEL_HEADER}\
                 1,1,VIEWED_SIGNUP,2024-03-01 10:00:00\n\
                 2,1,VIEWED_SIGNUP,2024-03-02 08:00:00\n\
                 1,2,STARTED_REGISTRATION,2024-03-01 10:20:00\n\
                 1,3,KYC_COMPLETED,2024-03-01 11:30:00\n\
                 1,4,CARD_ACTIVATED,2024-03-01 20:00:00\n\
                 1,5,FIRST_TOPUP,2024-03-01 22:00:00\n"
            ),
        );
        fixture
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.dir.path().join("raw")
    }

    pub fn warehouse_dir(&self) -> PathBuf {
        self.dir.path().join("warehouse")
    }

    pub fn write(&self, file: &str, contents: &str) {
        fs::write(self.raw_dir().join(file), contents).expect("write fixture file");
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.raw_dir(), self.warehouse_dir())
    }

    pub fn table(&self, name: &str) -> PathBuf {
        self.warehouse_dir().join(format!("{name}.parquet"))
    }
}

/// Read a Parquet table into a single batch.
pub fn load_batch(path: &Path) -> RecordBatch {
    let batches = read_table(path).expect("read table");
    let schema = batches
        .first()
        .map(|b| b.schema())
        .expect("table has at least one batch");
    concat_batches(&schema, &batches).expect("concat")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("column {name} has unexpected type"))
}

pub fn i64_col(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    column::<Int64Array>(batch, name).iter().collect()
}

pub fn i32_col(batch: &RecordBatch, name: &str) -> Vec<Option<i32>> {
    column::<Int32Array>(batch, name).iter().collect()
}

pub fn f64_col(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
    column::<Float64Array>(batch, name).iter().collect()
}

pub fn date_col(batch: &RecordBatch, name: &str) -> Vec<Option<NaiveDate>> {
    let array = column::<Date32Array>(batch, name);
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value_as_date(i)).flatten())
        .collect()
}

pub fn bool_col(batch: &RecordBatch, name: &str) -> Vec<Option<bool>> {
    column::<BooleanArray>(batch, name).iter().collect()
}

pub fn str_col(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    column::<StringArray>(batch, name)
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

pub fn null_count(batch: &RecordBatch, name: &str) -> usize {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .null_count()
}
