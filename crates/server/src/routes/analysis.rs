use std::sync::Arc;

use analysis_worker::analyzer::{self, AnalysisSettings, Candidate};
use analysis_worker::SeverityThresholds;
use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Config;
use crate::error::AppError;

/// Caps how many jobs run an engine at the same time.
#[derive(Clone)]
pub struct JobSlots(Arc<Semaphore>);

impl JobSlots {
    pub fn new(max_jobs: usize) -> Self {
        Self(Arc::new(Semaphore::new(max_jobs.max(1))))
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.0
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("job slots closed".into()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub pgn: Option<String>,
    pub fast_depth: Option<u32>,
    pub thresholds: Option<SeverityThresholds>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeCandidatesRequest {
    pub candidates: Vec<Candidate>,
    pub depth: Option<u32>,
    pub thresholds: Option<SeverityThresholds>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub pgn: Option<String>,
    pub depth: Option<u32>,
    pub fast_depth: Option<u32>,
    pub thresholds: Option<SeverityThresholds>,
}

fn parse_body<T: DeserializeOwned>(
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<T, AppError> {
    let Json(value) = body?;
    serde_json::from_value(value).map_err(|e| AppError::BadRequest(format!("Invalid request: {e}")))
}

fn require_pgn(pgn: Option<String>) -> Result<String, AppError> {
    pgn.filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing pgn".into()))
}

fn settings(
    thresholds: Option<SeverityThresholds>,
    fast_depth: Option<u32>,
    depth: Option<u32>,
) -> Result<AnalysisSettings, AppError> {
    let defaults = AnalysisSettings::default();
    let settings = AnalysisSettings {
        thresholds: thresholds.unwrap_or(defaults.thresholds),
        fast_depth: fast_depth.unwrap_or(defaults.fast_depth),
        depth: depth.unwrap_or(defaults.depth),
    };
    settings.validate()?;
    Ok(settings)
}

/// POST /scan
pub async fn scan(
    Extension(config): Extension<Config>,
    Extension(slots): Extension<JobSlots>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let req: ScanRequest = parse_body(body)?;
    let pgn = require_pgn(req.pgn)?;
    let settings = settings(req.thresholds, req.fast_depth, None)?;
    let plies = analyzer::parse_pgn(&pgn)?;

    let _permit = slots.acquire().await?;
    let candidates = analyzer::scan_plies(&config.worker, &plies, &settings).await?;

    Ok(Json(json!({ "candidates": candidates })))
}

/// POST /analyze-candidates
pub async fn analyze_candidates(
    Extension(config): Extension<Config>,
    Extension(slots): Extension<JobSlots>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let Json(value) = body?;
    if !value.get("candidates").is_some_and(JsonValue::is_array) {
        return Err(AppError::BadRequest("candidates must be an array".into()));
    }
    let req: AnalyzeCandidatesRequest = parse_body(Ok(Json(value)))?;
    let settings = settings(req.thresholds, None, req.depth)?;
    for candidate in &req.candidates {
        candidate.validate()?;
    }

    let _permit = slots.acquire().await?;
    let mistakes = analyzer::analyze_candidates(&config.worker, &req.candidates, &settings).await?;

    Ok(Json(json!({ "mistakes": mistakes })))
}

/// POST /analyze
pub async fn analyze(
    Extension(config): Extension<Config>,
    Extension(slots): Extension<JobSlots>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<JsonValue>, AppError> {
    let req: AnalyzeRequest = parse_body(body)?;
    let pgn = require_pgn(req.pgn)?;
    let settings = settings(req.thresholds, req.fast_depth, req.depth)?;
    let plies = analyzer::parse_pgn(&pgn)?;

    let _permit = slots.acquire().await?;
    let mistakes = analyzer::analyze_plies(&config.worker, &plies, &settings).await?;

    Ok(Json(json!({ "mistakes": mistakes })))
}
