//! The pipeline entry point.
//!
//! EXECUTION ORDER (fixed, single pass, no partial output):
//!   1. Load all raw sources
//!   2. Funnel fact        (its dedup feeds steps_count)
//!   3. User dimension
//!   4. Transaction fact
//!   5. Semantic model check against the warehouse schemas
//!   6. Write the three tables (staged together, then renamed into place)
//!
//! RULES:
//!   - Every error aborts the run before any table is replaced.
//!     A write failure on any table leaves all previous tables intact.
//!   - Identical inputs produce byte-identical tables.

use crate::{
    config::PipelineConfig,
    dim_users::{self, build_dim_users, OrphanCounts, ReversedIntervals},
    error::EtlResult,
    fct_funnel::{self, build_fct_funnel, FunnelReport},
    fct_transactions::{self, build_fct_transactions},
    raw::RawSources,
    semantic::SemanticModel,
    warehouse::{self, Warehouse},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub dim_users_rows: usize,
    pub fct_transactions_rows: usize,
    pub fct_funnel_rows: usize,
    pub funnel: FunnelReport,
    pub orphans: OrphanCounts,
    pub reversed: ReversedIntervals,
    pub outputs: Vec<PathBuf>,
}

pub fn run_pipeline(config: &PipelineConfig) -> EtlResult<RunSummary> {
    log::info!(
        "pipeline: raw={} warehouse={}",
        config.raw_dir.display(),
        config.warehouse_dir.display()
    );

    let sources = RawSources::load(&config.raw_dir)?;

    log::info!("pipeline: building {} (one row per funnel step per user)", fct_funnel::TABLE_NAME);
    let funnel = build_fct_funnel(
        &sources.funnel,
        config.duplicate_funnel_steps,
        config.strict_funnel_order,
    )?;

    log::info!("pipeline: building {} (one row per user)", dim_users::TABLE_NAME);
    let users = build_dim_users(&sources, &funnel.rows)?;

    log::info!("pipeline: building {} (one row per transaction)", fct_transactions::TABLE_NAME);
    let transactions = build_fct_transactions(&sources.transactions)?;

    let dim_batch = warehouse::dim_users_batch(&users.rows)?;
    let tx_batch = warehouse::fct_transactions_batch(&transactions)?;
    let funnel_batch = warehouse::fct_funnel_batch(&funnel.rows)?;

    SemanticModel::bundled()?.validate(&warehouse::all_schemas())?;

    let store = Warehouse::open(&config.warehouse_dir)?;
    let outputs = store.write_tables(&[
        (dim_users::TABLE_NAME, &dim_batch),
        (fct_transactions::TABLE_NAME, &tx_batch),
        (fct_funnel::TABLE_NAME, &funnel_batch),
    ])?;

    let summary = RunSummary {
        dim_users_rows: users.rows.len(),
        fct_transactions_rows: transactions.len(),
        fct_funnel_rows: funnel.rows.len(),
        funnel: funnel.report,
        orphans: users.orphans,
        reversed: users.reversed,
        outputs,
    };
    log::info!(
        "pipeline: done, {} users, {} transactions, {} funnel rows",
        summary.dim_users_rows,
        summary.fct_transactions_rows,
        summary.fct_funnel_rows
    );
    Ok(summary)
}
