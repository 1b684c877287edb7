use std::time::SystemTime;

use feed_client::table::TableError;

pub mod energy;
pub mod forecast;
pub mod report;

pub use energy::parse_day;
pub use report::{DayFailure, DayOutcome, DaySummary, EnergyRangeReport, ForecastReport, JobOutcome, RunReport, Stage};

use crate::config::{EnergyConfig, ForecastConfig};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Body of one fetched document.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body_text: String,
    pub body_bytes: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP Basic credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Exclusive hold on a blob path, released on drop.
pub struct Lease {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Lease {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one document. A non-2xx status is returned, not raised; callers
    /// decide whether it fails their unit of work.
    async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Envelope<FetchResponse>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, PipelineError>;

    async fn read_text(&self, path: &str) -> Result<String, PipelineError>;

    async fn write_text(&self, path: &str, content: &str, content_type: &str) -> Result<(), PipelineError>;

    /// Take the single-writer lease on `path`. Fails if another holder has it.
    async fn lease(&self, path: &str) -> Result<Lease, PipelineError>;

    /// Display form of a blob location, for reports.
    fn uri(&self, path: &str) -> String;
}

/// Forecast and energy jobs over one fetcher and one blob store.
///
/// Every unit of work runs to completion before the next starts; the master
/// table lease only guards against other processes.
pub struct Pipeline<F, B> {
    pub source: F,
    pub sink: B,
    pub forecast: ForecastConfig,
    pub energy: EnergyConfig,
}

impl<F, B> Pipeline<F, B>
where
    F: Fetcher,
    B: BlobStore,
{
    /// Run the forecast job, then the energy range through `today`.
    pub async fn run(&self, today: time::Date) -> RunReport {
        let forecast = if !self.forecast.enabled {
            JobOutcome::Skipped {
                reason: "forecast disabled".to_string(),
            }
        } else {
            match self.run_forecast_once().await {
                Ok(report) => JobOutcome::Completed(report),
                Err(e) => {
                    tracing::error!(error = %e, "forecast run failed");
                    JobOutcome::Failed { error: e.to_string() }
                }
            }
        };

        let energy = if !self.energy.enabled {
            JobOutcome::Skipped {
                reason: "energy disabled".to_string(),
            }
        } else {
            match self.energy.start_date.as_deref() {
                None => JobOutcome::Skipped {
                    reason: "no energy start_date configured".to_string(),
                },
                Some(raw) => match parse_day(raw) {
                    Ok(start) => JobOutcome::Completed(self.run_energy_range(start, today).await),
                    Err(e) => JobOutcome::Failed {
                        error: format!("bad_start_date: {e}"),
                    },
                },
            }
        };

        RunReport { forecast, energy }
    }

    /// Store a raw payload under its content-addressed path unless an
    /// identical payload is already there. Returns the URI and whether the
    /// existing blob was reused.
    async fn store_raw(&self, path: &str, body: &str, content_type: &str) -> Result<(String, bool), PipelineError> {
        if self.sink.exists(path).await? {
            metrics::counter!("raw_payloads_reused_total").increment(1);
            tracing::debug!(path, "raw payload unchanged, not re-uploading");
            return Ok((self.sink.uri(path), true));
        }
        self.sink.write_text(path, body, content_type).await?;
        Ok((self.sink.uri(path), false))
    }
}

/// `<prefix><kind>_[<day>_]<hash>.<ext>`, where `hash` is a blake3 prefix of
/// the payload bytes.
pub fn raw_blob_path(prefix: &str, kind: &str, day: Option<&str>, body: &[u8], ext: &str) -> String {
    let hash = blake3::hash(body).to_hex();
    let short = &hash.as_str()[..16];
    match day {
        Some(day) => format!("{prefix}{kind}_{day}_{short}.{ext}"),
        None => format!("{prefix}{kind}_{short}.{ext}"),
    }
}

/// `YYYYMMDDTHHMMSSZ` in UTC.
pub fn scrape_stamp(at: SystemTime) -> Result<String, PipelineError> {
    let fmt = time::macros::format_description!("[year][month][day]T[hour][minute][second]Z");
    time::OffsetDateTime::from(at)
        .format(fmt)
        .map_err(|e| PipelineError::Transform(format!("failed to format scrape stamp: {e}")))
}

fn ensure_success(response: &FetchResponse, url: &str) -> Result<(), PipelineError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(PipelineError::Source(format!("HTTP {} from {url}", response.status)))
    }
}
