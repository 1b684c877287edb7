use crate::pipeline::{Envelope, FetchResponse, PipelineError, Transform};
use feed_client::domain::{EnergyRecord, WideTable};
use time::OffsetDateTime;

pub mod coerce;
pub mod dwml;
pub mod energy;
pub mod merge;
pub mod xml;

pub use dwml::{flatten_dwml, FlattenError, LengthPolicy, RunContext};
pub use energy::{extract_energy_records, EnergyPayload};
pub use merge::merge;

/// Fetched DWML document → wide forecast table, stamped with the fetch time.
#[derive(Debug, Clone, Copy)]
pub struct DwmlFlatten {
    pub location_lat: f64,
    pub location_lon: f64,
    pub policy: LengthPolicy,
}

#[async_trait::async_trait]
impl Transform<FetchResponse, WideTable> for DwmlFlatten {
    async fn apply(&self, input: Envelope<FetchResponse>) -> Result<Envelope<WideTable>, PipelineError> {
        let ctx = RunContext {
            scrape_time_utc: OffsetDateTime::from(input.received_at),
            location_lat: self.location_lat,
            location_lon: self.location_lon,
        };
        match flatten_dwml(&input.payload.body_bytes, ctx, self.policy) {
            Ok(table) => Ok(Envelope {
                payload: table,
                received_at: input.received_at,
            }),
            Err(e) => {
                metrics::counter!("dwml_documents_rejected_total").increment(1);
                Err(PipelineError::Transform(e.to_string()))
            }
        }
    }
}

/// Fetched energy payload → narrow records for one location.
///
/// Never fails: an unusable payload is an empty batch.
#[derive(Debug, Clone)]
pub struct EnergyExtract {
    pub location_id: String,
}

#[async_trait::async_trait]
impl Transform<FetchResponse, Vec<EnergyRecord>> for EnergyExtract {
    async fn apply(&self, input: Envelope<FetchResponse>) -> Result<Envelope<Vec<EnergyRecord>>, PipelineError> {
        let records = extract_energy_records(
            EnergyPayload::Bytes(&input.payload.body_bytes),
            OffsetDateTime::from(input.received_at),
            &self.location_id,
        );
        Ok(Envelope {
            payload: records,
            received_at: input.received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn envelope(body: &str) -> Envelope<FetchResponse> {
        Envelope {
            payload: FetchResponse {
                status: 200,
                body_text: body.to_string(),
                body_bytes: body.as_bytes().to_vec(),
            },
            received_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_756_123_200),
        }
    }

    #[tokio::test]
    async fn dwml_flatten_stamps_scrape_time() {
        let body = r#"<dwml><data>
            <time-layout><layout-key>k</layout-key>
              <start-valid-time>2025-08-25T08:00:00-04:00</start-valid-time>
            </time-layout>
            <parameters><temperature type="hourly" time-layout="k"><value>71</value></temperature></parameters>
        </data></dwml>"#;
        let t = DwmlFlatten {
            location_lat: 41.94,
            location_lon: -72.685,
            policy: LengthPolicy::Truncate,
        };

        let out = t.apply(envelope(body)).await.unwrap();
        assert_eq!(out.payload.scrape_time_utc, time::macros::datetime!(2025-08-25 12:00:00 UTC));
        assert_eq!(out.payload.location_lat, 41.94);
        assert_eq!(out.payload.len(), 1);
    }

    #[tokio::test]
    async fn dwml_flatten_rejects_garbage() {
        let t = DwmlFlatten {
            location_lat: 0.0,
            location_lon: 0.0,
            policy: LengthPolicy::Truncate,
        };
        let res = t.apply(envelope("not xml at all <")).await;
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[tokio::test]
    async fn energy_extract_tolerates_unusable_payload() {
        let t = EnergyExtract {
            location_id: "4004".to_string(),
        };
        let out = t.apply(envelope("{\"status\":\"ok\"}")).await.unwrap();
        assert!(out.payload.is_empty());
    }
}
