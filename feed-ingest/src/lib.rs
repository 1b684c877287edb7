pub mod pipeline;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod observability;
pub mod metrics_server;

pub use pipeline::{BlobStore, Envelope, Fetcher, Pipeline, PipelineError};

use std::time::Duration;

/// Pipeline over HTTP and the configured local storage root.
pub fn pipeline_from_config(
    cfg: &config::AppConfig,
) -> Result<Pipeline<sources::HttpFetcher, sinks::LocalBlobStore>, PipelineError> {
    Ok(Pipeline {
        source: sources::HttpFetcher::new(Duration::from_secs(cfg.fetch.timeout_secs), &cfg.fetch.user_agent)?,
        sink: sinks::LocalBlobStore::new(&cfg.storage.root_dir),
        forecast: cfg.forecast.clone(),
        energy: cfg.energy.clone(),
    })
}
