use anyhow::{bail, Result};
use feed_ingest::{config::AppConfig, observability, pipeline::parse_day, pipeline_from_config};
use std::env;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_energy <start YYYYMMDD> [end YYYYMMDD] [location]");
    }
    let start = parse_day(&args[1])?;
    let end = match args.get(2) {
        Some(raw) => parse_day(raw)?,
        None => start,
    };

    // FEED_INGEST_CONFIG can point at a backfill-specific file.
    let mut cfg = AppConfig::load()?;
    if let Some(location) = args.get(3) {
        cfg.energy.location = location.clone();
    }

    let pipeline = pipeline_from_config(&cfg)?;
    let report = pipeline.run_energy_range(start, end).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.per_day.values().any(|d| d.is_failed()) {
        bail!("one or more days failed");
    }
    Ok(())
}
