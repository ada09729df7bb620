//! Warehouse writer: Arrow schemas and Parquet artifacts.
//!
//! RULE: Only warehouse.rs writes warehouse files.
//! Every artifact is written to `<name>.tmp` beside its final path and
//! renamed into place. A run's tables are staged together: nothing is
//! renamed until every temp file is complete, so a failed write leaves
//! all previous tables in place.

use crate::{
    dim_users::{self, UserRecord},
    error::{EtlError, EtlResult},
    fct_funnel::{self, FunnelFact},
    fct_transactions::{self, TransactionFact},
};
use arrow::{
    array::{
        ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
        TimestampMicrosecondArray,
    },
    datatypes::{DataType, Date32Type, Field, Schema, SchemaRef, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::NaiveDateTime;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

pub const FILE_EXTENSION: &str = "parquet";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

pub fn dim_users_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("signup_at", timestamp_type(), false),
        Field::new("country", DataType::Utf8, false),
        Field::new("device", DataType::Utf8, false),
        Field::new("marketing_channel", DataType::Utf8, false),
        // KYC
        Field::new("first_kyc_started_at", timestamp_type(), true),
        Field::new("first_kyc_completed_at", timestamp_type(), true),
        Field::new("kyc_status", DataType::Utf8, true),
        Field::new("has_kyc_approved", DataType::Boolean, false),
        // Card
        Field::new("card_activated_at", timestamp_type(), true),
        Field::new("card_type", DataType::Utf8, true),
        Field::new("has_card_activated", DataType::Boolean, false),
        // Transactions
        Field::new("first_transaction_at", timestamp_type(), true),
        Field::new("total_transactions", DataType::Int64, false),
        Field::new("total_amount_eur", DataType::Float64, false),
        Field::new("has_topup", DataType::Boolean, false),
        // Durations (hours)
        Field::new("time_to_kyc_hours", DataType::Float64, true),
        Field::new("time_kyc_to_card_hours", DataType::Float64, true),
        Field::new("time_card_to_first_tx_hours", DataType::Float64, true),
        // Funnel
        Field::new("steps_count", DataType::Int64, false),
    ]))
}

pub fn fct_transactions_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("transaction_time", timestamp_type(), false),
        Field::new("amount_eur", DataType::Float64, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("merchant_country", DataType::Utf8, false),
        Field::new("transaction_type", DataType::Utf8, false),
        Field::new("transaction_date", DataType::Date32, false),
        Field::new("transaction_hour", DataType::Int32, false),
    ]))
}

pub fn fct_funnel_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("step_order", DataType::Int32, false),
        Field::new("step_name", DataType::Utf8, false),
        Field::new("event_time", timestamp_type(), false),
    ]))
}

/// Every warehouse table with its schema, keyed by table name.
pub fn all_schemas() -> Vec<(&'static str, SchemaRef)> {
    vec![
        (dim_users::TABLE_NAME, dim_users_schema()),
        (fct_transactions::TABLE_NAME, fct_transactions_schema()),
        (fct_funnel::TABLE_NAME, fct_funnel_schema()),
    ]
}

fn micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

fn ts_column<I: IntoIterator<Item = Option<NaiveDateTime>>>(values: I) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(
        values.into_iter().map(|v| v.map(micros)).collect::<Vec<_>>(),
    ))
}

fn str_column<'a, I: IntoIterator<Item = Option<&'a str>>>(values: I) -> ArrayRef {
    Arc::new(StringArray::from(values.into_iter().collect::<Vec<_>>()))
}

pub fn dim_users_batch(rows: &[UserRecord]) -> EtlResult<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.user_id))),
        ts_column(rows.iter().map(|r| Some(r.signup_at))),
        str_column(rows.iter().map(|r| Some(r.country.as_str()))),
        str_column(rows.iter().map(|r| Some(r.device.as_str()))),
        str_column(rows.iter().map(|r| Some(r.marketing_channel.as_str()))),
        ts_column(rows.iter().map(|r| r.first_kyc_started_at)),
        ts_column(rows.iter().map(|r| r.first_kyc_completed_at)),
        str_column(rows.iter().map(|r| r.kyc_status.map(|s| s.as_str()))),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.has_kyc_approved).collect::<Vec<_>>())),
        ts_column(rows.iter().map(|r| r.card_activated_at)),
        str_column(rows.iter().map(|r| r.card_type.as_deref())),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.has_card_activated).collect::<Vec<_>>())),
        ts_column(rows.iter().map(|r| r.first_transaction_at)),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.total_transactions))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.total_amount_eur))),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.has_topup).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.time_to_kyc_hours).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.time_kyc_to_card_hours).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.time_card_to_first_tx_hours).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.steps_count))),
    ];
    Ok(RecordBatch::try_new(dim_users_schema(), columns)?)
}

pub fn fct_transactions_batch(rows: &[TransactionFact]) -> EtlResult<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.user_id))),
        ts_column(rows.iter().map(|r| Some(r.transaction_time))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.amount_eur))),
        str_column(rows.iter().map(|r| Some(r.category.as_str()))),
        str_column(rows.iter().map(|r| Some(r.merchant_country.as_str()))),
        str_column(rows.iter().map(|r| Some(r.transaction_type.as_str()))),
        Arc::new(Date32Array::from_iter_values(
            rows.iter().map(|r| Date32Type::from_naive_date(r.transaction_date)),
        )),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.transaction_hour as i32))),
    ];
    Ok(RecordBatch::try_new(fct_transactions_schema(), columns)?)
}

pub fn fct_funnel_batch(rows: &[FunnelFact]) -> EtlResult<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.user_id))),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| i32::from(r.step_order)))),
        str_column(rows.iter().map(|r| Some(r.step.as_str()))),
        ts_column(rows.iter().map(|r| Some(r.event_time))),
    ];
    Ok(RecordBatch::try_new(fct_funnel_schema(), columns)?)
}

/// Fixed writer settings. Nothing time- or host-dependent goes into the
/// file, so identical batches give identical bytes.
fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    PathBuf::from(tmp_name)
}

/// Write `path` through a sibling temp file. The temp file is removed if
/// `write` fails; the previous artifact at `path` is only ever replaced
/// by a complete file.
pub fn replace_atomically<F>(path: &Path, write: F) -> EtlResult<()>
where
    F: FnOnce(&Path) -> EtlResult<()>,
{
    let tmp_path = tmp_path_for(path);
    if let Err(e) = write(&tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        EtlError::io(path, e)
    })
}

/// Complete temp files waiting to be renamed over their final paths.
/// Dropping a batch without committing removes its temp files.
#[derive(Debug, Default)]
struct StagedFiles {
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedFiles {
    fn stage<F>(&mut self, path: &Path, write: F) -> EtlResult<()>
    where
        F: FnOnce(&Path) -> EtlResult<()>,
    {
        let tmp_path = tmp_path_for(path);
        if let Err(e) = write(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        self.pending.push((tmp_path, path.to_path_buf()));
        Ok(())
    }

    fn commit(mut self) -> EtlResult<Vec<PathBuf>> {
        let pending = std::mem::take(&mut self.pending);
        let mut committed = Vec::with_capacity(pending.len());
        let mut remaining = pending.into_iter();
        while let Some((tmp_path, path)) = remaining.next() {
            if let Err(e) = fs::rename(&tmp_path, &path) {
                let _ = fs::remove_file(&tmp_path);
                for (tmp, _) in remaining {
                    let _ = fs::remove_file(tmp);
                }
                return Err(EtlError::io(&path, e));
            }
            committed.push(path);
        }
        Ok(committed)
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for (tmp_path, _) in &self.pending {
            let _ = fs::remove_file(tmp_path);
        }
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> EtlResult<()> {
    let file = File::create(path).map_err(|e| EtlError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
    writer.write(batch)?;
    let file = writer.into_inner()?;
    file.sync_all().map_err(|e| EtlError::io(path, e))?;
    Ok(())
}

/// The on-disk warehouse: one Parquet file per table under `dir`.
#[derive(Debug, Clone)]
pub struct Warehouse {
    dir: PathBuf,
}

impl Warehouse {
    /// Open the warehouse directory, creating it if needed.
    pub fn open(dir: &Path) -> EtlResult<Self> {
        fs::create_dir_all(dir).map_err(|e| EtlError::io(dir, e))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.{FILE_EXTENSION}"))
    }

    /// Replace several tables as one unit. Every table is written to its
    /// temp file first; renames start only once all writes succeeded.
    /// On a write failure no table is replaced and every temp file is removed.
    pub fn write_tables(&self, tables: &[(&str, &RecordBatch)]) -> EtlResult<Vec<PathBuf>> {
        let mut staged = StagedFiles::default();
        for (table, batch) in tables {
            let path = self.table_path(table);
            staged.stage(&path, |tmp| write_parquet(tmp, batch))?;
            log::debug!("warehouse: staged {} rows for {}", batch.num_rows(), path.display());
        }
        let paths = staged.commit()?;
        for ((_, batch), path) in tables.iter().zip(&paths) {
            log::info!("warehouse: wrote {} rows to {}", batch.num_rows(), path.display());
        }
        Ok(paths)
    }
}

/// Read the Arrow schema stored in a written table.
pub fn read_table_schema(path: &Path) -> EtlResult<SchemaRef> {
    let file = File::open(path).map_err(|e| EtlError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().clone())
}

/// Read a whole table back into memory.
pub fn read_table(path: &Path) -> EtlResult<Vec<RecordBatch>> {
    let file = File::open(path).map_err(|e| EtlError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}
