use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Schema error in {table}: {detail}")]
    Schema { table: String, detail: String },

    #[error("Data type error in {table} row {row}, column '{column}': cannot parse {value:?}")]
    DataType {
        table:  String,
        row:    usize,
        column: String,
        value:  String,
    },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("I/O error at {}: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err:  std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EtlError {
    pub fn schema(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Schema { table: table.into(), detail: detail.into() }
    }

    pub fn data_type(table: &str, row: usize, column: &str, value: &str) -> Self {
        Self::DataType {
            table:  table.to_string(),
            row,
            column: column.to_string(),
            value:  value.to_string(),
        }
    }

    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), err }
    }
}

pub type EtlResult<T> = Result<T, EtlError>;
