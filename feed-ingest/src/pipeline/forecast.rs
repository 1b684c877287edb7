use feed_client::table::write_wide_csv;

use super::{ensure_success, raw_blob_path, scrape_stamp, BlobStore, Fetcher, Pipeline, PipelineError, Transform};
use crate::pipeline::report::ForecastReport;
use crate::transform::DwmlFlatten;

impl<F, B> Pipeline<F, B>
where
    F: Fetcher,
    B: BlobStore,
{
    /// Fetch the configured forecast point once, archive the raw document and
    /// publish its flattened table as a per-run CSV.
    pub async fn run_forecast_once(&self) -> Result<ForecastReport, PipelineError> {
        let cfg = &self.forecast;
        let url = cfg.request_url();

        let env = self.source.fetch(&url, None).await?;
        ensure_success(&env.payload, &url)?;
        let stamp = scrape_stamp(env.received_at)?;

        let raw_path = raw_blob_path(&cfg.raw_prefix, "dwml", None, &env.payload.body_bytes, "xml");
        let (raw_uri, raw_reused) = self
            .store_raw(&raw_path, &env.payload.body_text, "application/xml")
            .await?;

        let flatten = DwmlFlatten {
            location_lat: cfg.lat,
            location_lon: cfg.lon,
            policy: cfg.length_policy,
        };
        let table = flatten.apply(env).await?.payload;

        let csv = write_wide_csv(&table)?;
        let csv_path = format!("{}flat_{stamp}.csv", cfg.csv_prefix);
        self.sink.write_text(&csv_path, &csv, "text/csv").await?;

        metrics::counter!("forecast_runs_total").increment(1);
        tracing::info!(
            url = %url,
            rows = table.len(),
            columns = table.columns.len(),
            raw_reused,
            "forecast run complete"
        );

        Ok(ForecastReport {
            url,
            raw_uri,
            raw_reused,
            per_run_csv: self.sink.uri(&csv_path),
            rows_this_run: table.len(),
            columns: table.columns.len(),
        })
    }
}
