use std::collections::BTreeMap;

use feed_client::{
    domain::{EnergyRecord, MasterTable},
    table::{read_energy_csv, write_energy_csv},
};
use time::{macros::format_description, Date};

use super::{
    ensure_success, raw_blob_path, scrape_stamp, BlobStore, Credentials, Fetcher, Pipeline, PipelineError, Transform,
};
use crate::pipeline::report::{DayFailure, DayOutcome, DaySummary, EnergyRangeReport, Stage};
use crate::transform::{merge, EnergyExtract};

/// Parse a `YYYYMMDD` day.
pub fn parse_day(raw: &str) -> Result<Date, PipelineError> {
    Date::parse(raw.trim(), format_description!("[year][month][day]"))
        .map_err(|e| PipelineError::Transform(format!("invalid day {raw:?}: {e}")))
}

pub fn format_day(day: Date) -> String {
    format!("{:04}{:02}{:02}", day.year(), u8::from(day.month()), day.day())
}

fn failed(stage: Stage, url: &str) -> impl FnOnce(PipelineError) -> DayFailure + '_ {
    move |e| DayFailure {
        stage,
        url: url.to_string(),
        error: format!("{}: {e}", stage.failure_tag()),
    }
}

impl<F, B> Pipeline<F, B>
where
    F: Fetcher,
    B: BlobStore,
{
    /// Process every day in `[start, end]`, one after another.
    ///
    /// A failed day is recorded and the range carries on; the report is
    /// returned whatever happened to individual days.
    pub async fn run_energy_range(&self, start: Date, end: Date) -> EnergyRangeReport {
        let mut report = EnergyRangeReport {
            start_date: format_day(start),
            end_date: format_day(end),
            location: self.energy.location.clone(),
            days_requested: 0,
            total_rows: 0,
            total_accepted: 0,
            per_day: BTreeMap::new(),
        };

        let mut day = Some(start);
        while let Some(current) = day.filter(|d| *d <= end) {
            let outcome = match self.run_energy_day(current).await {
                Ok(summary) => {
                    report.total_rows += summary.rows_this_run;
                    report.total_accepted += summary.accepted_rows;
                    DayOutcome::Completed(summary)
                }
                Err(failure) => {
                    metrics::counter!("energy_days_failed_total").increment(1);
                    tracing::warn!(
                        day = %format_day(current),
                        stage = failure.stage.failure_tag(),
                        error = %failure.error,
                        "energy day failed"
                    );
                    DayOutcome::Failed(failure)
                }
            };
            report.days_requested += 1;
            report.per_day.insert(format_day(current), outcome);
            day = current.next_day();
        }

        tracing::info!(
            start = %report.start_date,
            end = %report.end_date,
            days = report.days_requested,
            rows = report.total_rows,
            accepted = report.total_accepted,
            "energy range complete"
        );
        report
    }

    /// Fetch, archive, normalize and merge one day of the energy feed.
    pub async fn run_energy_day(&self, day: Date) -> Result<DaySummary, DayFailure> {
        let cfg = &self.energy;
        let day_str = format_day(day);
        let url = cfg.day_url(&day_str);
        let credentials = cfg.credentials();

        let env = self
            .fetch_checked(&url, credentials.as_ref())
            .await
            .map_err(failed(Stage::Fetch, &url))?;

        let (raw_uri, raw_reused) = {
            let body = &env.payload;
            let (ext, content_type) = if body.body_text.trim_start().starts_with('<') {
                ("xml", "application/xml")
            } else {
                ("json", "application/json")
            };
            let raw_path = raw_blob_path(&cfg.raw_prefix, "energy", Some(&day_str), &body.body_bytes, ext);
            self.store_raw(&raw_path, &body.body_text, content_type)
                .await
                .map_err(failed(Stage::UploadRaw, &url))?
        };

        let extract = EnergyExtract {
            location_id: cfg.location.clone(),
        };
        let received_at = env.received_at;
        let records = extract
            .apply(env)
            .await
            .map_err(failed(Stage::Flatten, &url))?
            .payload;

        let per_run_csv = self
            .write_day_csv(&day_str, received_at, &records)
            .await
            .map_err(failed(Stage::UploadCsv, &url))?;

        let rows_this_run = records.len();
        let (accepted_rows, master_rows) = self
            .merge_into_master(records)
            .await
            .map_err(failed(Stage::Merge, &url))?;

        metrics::counter!("energy_days_completed_total").increment(1);
        tracing::info!(day = %day_str, rows = rows_this_run, accepted = accepted_rows, "energy day complete");

        Ok(DaySummary {
            url,
            raw_uri,
            raw_reused,
            per_run_csv,
            rows_this_run,
            accepted_rows,
            master_uri: self.sink.uri(&cfg.master_path()),
            master_rows,
        })
    }

    async fn fetch_checked(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<super::Envelope<super::FetchResponse>, PipelineError> {
        let env = self.source.fetch(url, credentials).await?;
        ensure_success(&env.payload, url)?;
        Ok(env)
    }

    async fn write_day_csv(
        &self,
        day_str: &str,
        received_at: std::time::SystemTime,
        records: &[EnergyRecord],
    ) -> Result<String, PipelineError> {
        let stamp = scrape_stamp(received_at)?;
        let path = format!("{}energy_flat_{day_str}_{stamp}.csv", self.energy.csv_prefix);
        let csv = write_energy_csv(records)?;
        self.sink.write_text(&path, &csv, "text/csv").await?;
        Ok(self.sink.uri(&path))
    }

    /// Merge a batch into the location's master table under its lease.
    /// Returns the accepted count and the master row count afterwards.
    async fn merge_into_master(&self, records: Vec<EnergyRecord>) -> Result<(usize, usize), PipelineError> {
        let path = self.energy.master_path();
        let _lease = self.sink.lease(&path).await?;

        let exists = self.sink.exists(&path).await?;
        let existing = if exists {
            MasterTable::new(read_energy_csv(&self.sink.read_text(&path).await?)?)
        } else {
            MasterTable::default()
        };

        let (table, accepted) = merge(existing, records);
        if accepted > 0 || !exists {
            self.sink
                .write_text(&path, &write_energy_csv(&table.records)?, "text/csv")
                .await?;
        }
        Ok((accepted, table.len()))
    }
}
