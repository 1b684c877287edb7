use anyhow::{bail, Context, Result};
use feed_client::table::write_wide_csv;
use feed_ingest::{
    observability,
    transform::{flatten_dwml, LengthPolicy, RunContext},
};
use std::{env, fs};
use time::OffsetDateTime;

fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        bail!("usage: flatten_dwml_file <dwml_xml_path> <lat> <lon>");
    }
    let doc = fs::read(&args[1]).with_context(|| format!("failed to read {}", args[1]))?;
    let ctx = RunContext {
        scrape_time_utc: OffsetDateTime::now_utc(),
        location_lat: args[2].parse().context("invalid latitude")?,
        location_lon: args[3].parse().context("invalid longitude")?,
    };

    let table = flatten_dwml(&doc, ctx, LengthPolicy::Truncate)?;
    print!("{}", write_wide_csv(&table)?);
    Ok(())
}
