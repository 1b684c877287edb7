use anyhow::Result;
use feed_ingest::{config::AppConfig, metrics_server, observability, pipeline_from_config};
use std::time::Duration;
use time::OffsetDateTime;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pipeline = pipeline_from_config(&cfg)?;

    loop {
        let report = pipeline.run(OffsetDateTime::now_utc().date()).await;
        println!("{}", serde_json::to_string(&report)?);

        match cfg.schedule.interval_secs {
            Some(secs) => {
                tracing::info!(next_run_in_secs = secs, "run complete, sleeping");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            None => break,
        }
    }

    Ok(())
}
