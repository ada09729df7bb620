//! etl-runner: headless runner for the growth analytics warehouse.
//!
//! Usage:
//!   etl-runner generate --seed 42 --users 2000 --raw-dir data/raw
//!   etl-runner run --raw-dir data/raw --warehouse-dir data/warehouse
//!   etl-runner run --config pipeline.json
//!   etl-runner all --seed 42          (generate, then run)

use anyhow::{bail, Result};
use growth_etl_core::{
    generator::{generate, write_raw_sources},
    run_pipeline, GeneratorConfig, PipelineConfig, RunSummary,
};
use std::env;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args
        .get(1)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .unwrap_or("run");
    let base = PathBuf::from(flag_value(&args, "--base-dir").unwrap_or("."));

    let pipeline_config = match flag_value(&args, "--config") {
        Some(path) => PipelineConfig::load(Path::new(path))?,
        None => {
            let mut config = PipelineConfig::from_base_dir(&base);
            if let Some(raw) = flag_value(&args, "--raw-dir") {
                config.raw_dir = PathBuf::from(raw);
            }
            if let Some(out) = flag_value(&args, "--warehouse-dir") {
                config.warehouse_dir = PathBuf::from(out);
            }
            config
        }
    };

    match command {
        "generate" => run_generate(&args, &pipeline_config.raw_dir),
        "run" => run_etl(&pipeline_config),
        "all" => {
            run_generate(&args, &pipeline_config.raw_dir)?;
            run_etl(&pipeline_config)
        }
        other => bail!("unknown command '{other}' (expected generate, run or all)"),
    }
}

fn run_generate(args: &[String], raw_dir: &Path) -> Result<()> {
    let defaults = GeneratorConfig::default();
    let config = GeneratorConfig {
        seed: parse_arg(args, "--seed", defaults.seed),
        users: parse_arg(args, "--users", defaults.users),
        ..defaults
    };

    println!("growth-etl: generate");
    println!("  seed:      {}", config.seed);
    println!("  users:     {}", config.users);
    println!("  raw_dir:   {}", raw_dir.display());
    println!();

    let sources = generate(&config)?;
    write_raw_sources(raw_dir, &sources)?;

    println!("=== GENERATED ===");
    println!("  users:         {}", sources.users.len());
    println!("  kyc:           {}", sources.kyc.len());
    println!("  cards:         {}", sources.cards.len());
    println!("  transactions:  {}", sources.transactions.len());
    println!("  funnel events: {}", sources.funnel.len());
    Ok(())
}

fn run_etl(config: &PipelineConfig) -> Result<()> {
    let started = chrono::Utc::now();
    let summary = run_pipeline(config)?;
    let elapsed = chrono::Utc::now() - started;
    print_summary(&summary, elapsed.num_milliseconds());
    log::debug!("summary json: {}", serde_json::to_string(&summary)?);
    Ok(())
}

fn print_summary(summary: &RunSummary, elapsed_ms: i64) {
    println!("=== RUN SUMMARY ===");
    println!("  dim_users:           {}", summary.dim_users_rows);
    println!("  fct_transactions:    {}", summary.fct_transactions_rows);
    println!("  fct_funnel:          {}", summary.fct_funnel_rows);
    println!("  elapsed:             {elapsed_ms} ms");

    println!();
    println!("=== DATA QUALITY ===");
    println!("  duplicate steps:     {}", summary.funnel.duplicates_resolved);
    println!("  out-of-order users:  {}", summary.funnel.out_of_order_users);
    println!("  gapped users:        {}", summary.funnel.gapped_users);
    println!("  orphan rows:         {}", summary.orphans.total());
    println!("  reversed intervals:  {}", summary.reversed.total());

    println!();
    println!("=== WAREHOUSE ===");
    for path in &summary.outputs {
        println!("  - {}", path.display());
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
