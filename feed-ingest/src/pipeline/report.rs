use std::collections::BTreeMap;

use serde::Serialize;

/// Step of a per-day energy run that can fail it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    UploadRaw,
    Flatten,
    UploadCsv,
    Merge,
}

impl Stage {
    pub fn failure_tag(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch_failed",
            Stage::UploadRaw => "upload_raw_failed",
            Stage::Flatten => "flatten_failed",
            Stage::UploadCsv => "upload_csv_failed",
            Stage::Merge => "merge_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub url: String,
    pub raw_uri: String,
    pub raw_reused: bool,
    pub per_run_csv: String,
    pub rows_this_run: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub url: String,
    pub raw_uri: String,
    pub raw_reused: bool,
    pub per_run_csv: String,
    pub rows_this_run: usize,
    pub accepted_rows: usize,
    pub master_uri: String,
    pub master_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayFailure {
    pub stage: Stage,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DayOutcome {
    Completed(DaySummary),
    Failed(DayFailure),
}

impl DayOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DayOutcome::Failed(_))
    }
}

/// Summary of one energy backfill, keyed by `YYYYMMDD`.
#[derive(Debug, Clone, Serialize)]
pub struct EnergyRangeReport {
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    pub days_requested: usize,
    pub total_rows: usize,
    pub total_accepted: usize,
    pub per_day: BTreeMap<String, DayOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome<T> {
    Completed(T),
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub forecast: JobOutcome<ForecastReport>,
    pub energy: JobOutcome<EnergyRangeReport>,
}
