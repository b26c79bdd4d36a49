//! survey-etl: batch runner for the household survey pipeline.
//!
//! Usage:
//!   survey-etl --config data/sources.json --data-dir data --db survey.db
//!   survey-etl --replace              # clear and reload every segment type
//!   survey-etl --aggregate-only       # refresh burn rate / inequality only
//!   survey-etl --reset                # wipe facts, dimensions and views first

use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use survey_core::{
    config::PipelineConfig,
    loader::LoadMode,
    pipeline::{BatchReport, EtlPipeline, FileStatus},
    store::SurveyStore,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = arg_value(&args, "--config").unwrap_or("./data/sources.json");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let db = arg_value(&args, "--db").unwrap_or("survey.db");
    let replace = has_flag(&args, "--replace");
    let aggregate_only = has_flag(&args, "--aggregate-only");
    let reset = has_flag(&args, "--reset");

    println!("survey-etl");
    println!("  config:    {config_path}");
    println!("  data_dir:  {data_dir}");
    println!("  db:        {db}");
    println!();

    let config = PipelineConfig::load(config_path)?;
    let store = SurveyStore::open(db).with_context(|| format!("opening {db}"))?;
    store.migrate()?;

    let pipeline = EtlPipeline::new(&store, &config).context("invalid source configuration")?;

    if reset {
        log::warn!("reset requested: clearing facts, dimensions and derived views");
        store.reset_all()?;
    }

    let report = if aggregate_only {
        pipeline.aggregate_only()?
    } else {
        let mode = if replace { LoadMode::Replace } else { LoadMode::SkipExisting };
        pipeline.run(Path::new(data_dir), mode)?
    };

    print_summary(&store, &report)?;
    Ok(())
}

fn print_summary(store: &SurveyStore, report: &BatchReport) -> Result<()> {
    println!("=== BATCH SUMMARY ===");
    println!("  run_id:   {}", report.run_id);
    println!("  loaded:   {}", report.count("loaded"));
    println!("  skipped:  {}", report.count("skipped"));
    println!("  failed:   {}", report.count("failed"));
    println!("  facts:    {}", store.fact_count_total()?);

    if !report.files.is_empty() {
        println!();
        println!("=== FILES ===");
        for f in &report.files {
            match &f.status {
                FileStatus::Loaded { facts, segments } => println!(
                    "  {:<32} {:<20} loaded  {facts} facts / {segments} segments",
                    f.source_file, f.segment_type
                ),
                FileStatus::Skipped { existing_facts } => println!(
                    "  {:<32} {:<20} skipped ({existing_facts} facts already loaded)",
                    f.source_file, f.segment_type
                ),
                FileStatus::Failed { error } => println!(
                    "  {:<32} {:<20} FAILED  {error}",
                    f.source_file, f.segment_type
                ),
            }
        }
    }

    if let Some(agg) = &report.aggregates {
        println!();
        println!("=== AGGREGATES ===");
        println!("  burn-rate rows:     {}", agg.burn_rate.len());
        println!("  inequality rows:    {}", agg.inequality.len());
        println!(
            "  segments excluded:  {} of {}",
            agg.segments_excluded, agg.segments_considered
        );
        println!("  items excluded:     {}", agg.items_excluded);
        for w in &agg.warnings {
            println!(
                "  WARN {}/{}: {}",
                w.segment_type, w.segment_value, w.reason
            );
        }

        let mut top: Vec<_> = agg.inequality.iter().collect();
        top.sort_by(|a, b| b.inequality_ratio.cmp(&a.inequality_ratio));
        if !top.is_empty() {
            println!();
            println!("=== MOST UNEQUAL ITEMS ===");
            for r in top.iter().take(5) {
                println!(
                    "  {:<20} {:<32} {}x ({} {} vs {} {})",
                    r.segment_type,
                    r.item_name,
                    r.inequality_ratio,
                    r.high_segment,
                    r.high_spend,
                    r.low_segment,
                    r.low_spend
                );
            }
        }
    }
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
