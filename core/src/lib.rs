//! Growth analytics ETL: raw onboarding events in, three warehouse tables out.

pub mod config;
pub mod dim_users;
pub mod error;
pub mod fct_funnel;
pub mod fct_transactions;
pub mod generator;
pub mod pipeline;
pub mod raw;
pub mod rng;
pub mod semantic;
pub mod types;
pub mod warehouse;

pub use config::{DuplicateStepPolicy, GeneratorConfig, PipelineConfig};
pub use error::{EtlError, EtlResult};
pub use pipeline::{run_pipeline, RunSummary};
