use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, SystemTime},
};

use feed_client::table::read_energy_csv;
use feed_ingest::{
    config::AppConfig,
    pipeline::{
        BlobStore, Credentials, DayOutcome, Envelope, FetchResponse, Fetcher, JobOutcome, Pipeline, PipelineError,
        Stage,
    },
    sinks::{LocalBlobStore, MemoryBlobStore},
};
use time::macros::date;

const CONFIG: &str = r#"
    [storage]
    root_dir = "unused"

    [forecast]
    url = "http://nws.test/dwml"
    lat = 41.94
    lon = -72.685

    [energy]
    url_base = "http://iso.test/demand"
    location = "4004"
    start_date = "20250825"
    username = "user"
    password = "secret"
"#;

const DWML: &str = r#"<?xml version="1.0"?>
<dwml><data>
  <time-layout><layout-key>k-p1h-n2-1</layout-key>
    <start-valid-time>2025-08-25T08:00:00-04:00</start-valid-time>
    <start-valid-time>2025-08-25T09:00:00-04:00</start-valid-time>
  </time-layout>
  <parameters>
    <temperature type="hourly" time-layout="k-p1h-n2-1"><value>68</value><value>70</value></temperature>
    <probability-of-precipitation time-layout="k-p1h-n2-1"><value>10</value><value/></probability-of-precipitation>
  </parameters>
</data></dwml>"#;

fn day_json(hour: u8, load: f64) -> String {
    format!(
        r#"{{"HourlyRtDemands":{{"HourlyRtDemand":[
            {{"BeginDate":"2025-08-25T{hour:02}:00:00.000-04:00","Load":{load},"Location":{{"Name":".Z.CONNECTICUT","LocId":4004}}}}
        ]}}}}"#
    )
}

/// Serves canned bodies by URL and records the credentials it saw.
#[derive(Default)]
struct ScriptedFetcher {
    responses: Mutex<HashMap<String, (u16, String)>>,
    seen_users: Mutex<Vec<Option<String>>>,
}

impl ScriptedFetcher {
    fn serve(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Envelope<FetchResponse>, PipelineError> {
        self.seen_users
            .lock()
            .unwrap()
            .push(credentials.map(|c| c.username.clone()));
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::Source(format!("connection refused: {url}")))?;
        Ok(Envelope {
            payload: FetchResponse {
                status,
                body_bytes: body.as_bytes().to_vec(),
                body_text: body,
            },
            received_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_756_123_200),
        })
    }
}

fn pipeline(fetcher: ScriptedFetcher, store: MemoryBlobStore) -> Pipeline<ScriptedFetcher, MemoryBlobStore> {
    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    Pipeline {
        source: fetcher,
        sink: store,
        forecast: cfg.forecast,
        energy: cfg.energy,
    }
}

#[tokio::test]
async fn forecast_run_archives_raw_and_writes_wide_csv() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://nws.test/dwml", 200, DWML);
    let store = MemoryBlobStore::new();
    let p = pipeline(fetcher, store.clone());

    let first = p.run_forecast_once().await.unwrap();
    assert!(!first.raw_reused);
    assert_eq!(first.rows_this_run, 2);
    assert_eq!(first.per_run_csv, "memory://nws_flat/flat_20250825T120000Z.csv");

    let csv = store.get("nws_flat/flat_20250825T120000Z.csv").unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("scrape_time_utc,location_lat,location_lon,forecast_time_utc,temp_F,pop_pct")
    );
    assert_eq!(lines.count(), 2);

    let second = p.run_forecast_once().await.unwrap();
    assert!(second.raw_reused);
    assert_eq!(second.raw_uri, first.raw_uri);
    let raw: Vec<String> = store.paths().into_iter().filter(|p| p.starts_with("nws_raw/")).collect();
    assert_eq!(raw.len(), 1);
}

#[tokio::test]
async fn forecast_http_error_fails_the_run() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://nws.test/dwml", 503, "busy");
    let p = pipeline(fetcher, MemoryBlobStore::new());

    assert!(matches!(p.run_forecast_once().await, Err(PipelineError::Source(_))));
}

#[tokio::test]
async fn energy_range_records_failed_days_and_continues() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, &day_json(3, 2552.328));
    fetcher.serve("http://iso.test/demand/day/20250826/location/4004", 500, "oops");
    fetcher.serve("http://iso.test/demand/day/20250827/location/4004", 200, &day_json(4, 2400.0));
    let store = MemoryBlobStore::new();
    let p = pipeline(fetcher, store.clone());

    let report = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 27)).await;

    assert_eq!(report.days_requested, 3);
    assert_eq!(report.total_rows, 2);
    assert_eq!(report.total_accepted, 2);
    match &report.per_day["20250826"] {
        DayOutcome::Failed(f) => {
            assert_eq!(f.stage, Stage::Fetch);
            assert!(f.error.starts_with("fetch_failed: "));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!report.per_day["20250825"].is_failed());
    assert!(!report.per_day["20250827"].is_failed());

    let master = read_energy_csv(&store.get("nws_energy_flat/master_4004.csv").unwrap()).unwrap();
    assert_eq!(master.len(), 2);
    assert_eq!(master[0].location_id, "4004");
    assert_eq!(master[0].load, Some(2552.328));
    assert_eq!(master[1].load, Some(2400.0));

    let users = p.source.seen_users.lock().unwrap().clone();
    assert!(users.iter().all(|u| u.as_deref() == Some("user")));
}

#[tokio::test]
async fn energy_rerun_accepts_nothing_new() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, &day_json(3, 2552.328));
    let store = MemoryBlobStore::new();
    let p = pipeline(fetcher, store.clone());

    let first = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;
    let master_before = store.get("nws_energy_flat/master_4004.csv").unwrap();
    let second = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;

    assert_eq!(first.total_accepted, 1);
    assert_eq!(second.total_accepted, 0);
    assert_eq!(second.total_rows, 1);
    assert_eq!(store.get("nws_energy_flat/master_4004.csv").unwrap(), master_before);
    match &second.per_day["20250825"] {
        DayOutcome::Completed(s) => {
            assert!(s.raw_reused);
            assert_eq!(s.master_rows, 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn held_master_lease_fails_the_merge_stage() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, &day_json(3, 1.0));
    let store = MemoryBlobStore::new();
    let p = pipeline(fetcher, store.clone());

    let _other_writer = store.lease("nws_energy_flat/master_4004.csv").await.unwrap();
    let report = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;

    match &report.per_day["20250825"] {
        DayOutcome::Failed(f) => assert_eq!(f.stage, Stage::Merge),
        other => panic!("expected merge failure, got {other:?}"),
    }
    assert!(store.get("nws_energy_flat/master_4004.csv").is_none());
}

#[tokio::test]
async fn unusable_energy_payload_still_creates_empty_master() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, "");
    let store = MemoryBlobStore::new();
    let p = pipeline(fetcher, store.clone());

    let report = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;

    assert_eq!(report.total_rows, 0);
    assert!(!report.per_day["20250825"].is_failed());
    let master = store.get("nws_energy_flat/master_4004.csv").unwrap();
    assert!(read_energy_csv(&master).unwrap().is_empty());
}

#[tokio::test]
async fn full_run_reports_both_jobs() {
    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://nws.test/dwml", 200, DWML);
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, &day_json(3, 2552.328));
    let p = pipeline(fetcher, MemoryBlobStore::new());

    let report = p.run(date!(2025 - 08 - 25)).await;

    assert!(matches!(report.forecast, JobOutcome::Completed(_)));
    match report.energy {
        JobOutcome::Completed(r) => assert_eq!(r.days_requested, 1),
        other => panic!("expected energy range, got {other:?}"),
    }

    let json = serde_json::to_value(&p.run(date!(2025 - 08 - 25)).await).unwrap();
    assert_eq!(json["forecast"]["status"], "completed");
    assert_eq!(json["energy"]["per_day"]["20250825"]["accepted_rows"], 0);
}

#[tokio::test]
async fn leftover_lease_marker_does_not_block_merges() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nws_energy_flat")).unwrap();
    std::fs::write(dir.path().join("nws_energy_flat/master_4004.csv.lease"), b"").unwrap();

    let fetcher = ScriptedFetcher::default();
    fetcher.serve("http://iso.test/demand/day/20250825/location/4004", 200, &day_json(3, 2552.328));
    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    let p = Pipeline {
        source: fetcher,
        sink: LocalBlobStore::new(dir.path()),
        forecast: cfg.forecast,
        energy: cfg.energy,
    };

    let first = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;
    let second = p.run_energy_range(date!(2025 - 08 - 25), date!(2025 - 08 - 25)).await;

    assert!(!first.per_day["20250825"].is_failed());
    assert_eq!(first.total_accepted, 1);
    assert!(!second.per_day["20250825"].is_failed());
    assert_eq!(second.total_accepted, 0);
    let master = std::fs::read_to_string(dir.path().join("nws_energy_flat/master_4004.csv")).unwrap();
    assert_eq!(read_energy_csv(&master).unwrap().len(), 1);
}
