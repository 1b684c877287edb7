use std::time::{Duration, SystemTime};

use reqwest::Client;

use crate::pipeline::{Credentials, Envelope, FetchResponse, Fetcher, PipelineError};

/// Plain GET fetcher. No retries: a failed request fails the unit of work
/// that issued it.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| PipelineError::Source(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Envelope<FetchResponse>, PipelineError> {
        let mut request = self.client.get(url);
        if let Some(c) = credentials {
            request = request.basic_auth(&c.username, Some(&c.password));
        }

        let response = request.send().await.map_err(|e| {
            metrics::counter!("http_fetch_errors_total").increment(1);
            PipelineError::Source(format!("request to {url} failed: {e}"))
        })?;
        let status = response.status().as_u16();
        let received_at = SystemTime::now();
        let body = response.bytes().await.map_err(|e| {
            metrics::counter!("http_fetch_errors_total").increment(1);
            PipelineError::Source(format!("failed to read body from {url}: {e}"))
        })?;

        metrics::counter!("http_fetch_requests_total").increment(1);
        metrics::histogram!("http_fetch_body_bytes").record(body.len() as f64);
        tracing::debug!(url, status, bytes = body.len(), "fetched");

        Ok(Envelope {
            payload: FetchResponse {
                status,
                body_text: String::from_utf8_lossy(&body).into_owned(),
                body_bytes: body.to_vec(),
            },
            received_at,
        })
    }
}
