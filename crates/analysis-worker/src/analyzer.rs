//! Two-pass mistake finder.
//!
//! Pass 1 scans every move at a shallow depth and keeps only the moves that
//! look like mistakes. Pass 2 re-checks those candidates at full depth, so the
//! expensive search runs on a handful of positions instead of the whole game.

use std::future::Future;
use std::ops::RangeInclusive;

use chess_core::{PlyRecord, Side};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::session::{with_engine, EngineSession};
use crate::severity::{classify, evaluation_drop, Severity, SeverityThresholds};
use crate::uci::EvaluationResult;

pub const DEFAULT_DEPTH: u32 = 12;
pub const FAST_DEPTH_RANGE: RangeInclusive<u32> = 4..=30;
pub const DEPTH_RANGE: RangeInclusive<u32> = 6..=30;

/// Anything that can score a position to a fixed depth.
pub trait PositionEvaluator {
    fn evaluate(
        &self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<EvaluationResult, WorkerError>> + Send;
}

impl PositionEvaluator for EngineSession {
    fn evaluate(
        &self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<EvaluationResult, WorkerError>> + Send {
        self.analyze(fen, depth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    pub thresholds: SeverityThresholds,
    /// Depth of the scanning pass
    pub fast_depth: u32,
    /// Depth of the verification pass
    pub depth: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            thresholds: SeverityThresholds::default(),
            fast_depth: DEFAULT_DEPTH,
            depth: DEFAULT_DEPTH,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<(), WorkerError> {
        if !FAST_DEPTH_RANGE.contains(&self.fast_depth) {
            return Err(WorkerError::InvalidInput(format!(
                "fastDepth must be between {} and {} (got {})",
                FAST_DEPTH_RANGE.start(),
                FAST_DEPTH_RANGE.end(),
                self.fast_depth
            )));
        }
        if !DEPTH_RANGE.contains(&self.depth) {
            return Err(WorkerError::InvalidInput(format!(
                "depth must be between {} and {} (got {})",
                DEPTH_RANGE.start(),
                DEPTH_RANGE.end(),
                self.depth
            )));
        }
        self.thresholds.validate()
    }
}

/// A move flagged by the scanning pass, awaiting verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(alias = "fenBefore")]
    pub position_before: String,
    #[serde(alias = "fenAfter")]
    pub position_after: String,
    #[serde(alias = "side")]
    pub side_to_move: Side,
    #[serde(alias = "san")]
    pub move_san: String,
    #[serde(alias = "uci")]
    pub move_played_uci: String,
}

impl From<&PlyRecord> for Candidate {
    fn from(ply: &PlyRecord) -> Self {
        Self {
            position_before: ply.fen_before.clone(),
            position_after: ply.fen_after.clone(),
            side_to_move: ply.side,
            move_san: ply.san.clone(),
            move_played_uci: ply.uci.clone(),
        }
    }
}

impl Candidate {
    /// Reject candidates that could not have come from a scan.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.move_played_uci.trim().is_empty() {
            return Err(WorkerError::InvalidInput("candidate has no played move".into()));
        }
        chess_core::validate_fen(&self.position_before)?;
        chess_core::validate_fen(&self.position_after)?;
        Ok(())
    }
}

/// A verified mistake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mistake {
    /// Position before the move
    pub fen: String,
    pub side: Side,
    /// Move played, in SAN
    pub played: String,
    /// Engine's best move, in coordinate notation
    pub best: Option<String>,
    pub delta_cp: u32,
    pub severity: Severity,
    #[serde(alias = "pvUci")]
    pub principal_variation: Vec<String>,
}

/// Counters for one scanning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub positions_evaluated: usize,
    pub matched_best: usize,
    pub candidates: usize,
}

enum Judgement {
    /// The played move is the engine's choice
    MatchesBest,
    /// Drop too small to classify
    Tolerated { drop: u32 },
    Flagged {
        before: EvaluationResult,
        drop: u32,
        severity: Severity,
    },
}

fn normalize_move(mv: &str) -> String {
    mv.trim().to_ascii_lowercase()
}

fn is_best_move(played: &str, best: Option<&str>) -> bool {
    best.is_some_and(|best| normalize_move(best) == normalize_move(played))
}

/// Evaluate one move at `depth`. The position after the move is only
/// searched when the played move differs from the engine's choice.
async fn judge_move<E: PositionEvaluator>(
    engine: &E,
    fen_before: &str,
    fen_after: &str,
    played_uci: &str,
    depth: u32,
    thresholds: &SeverityThresholds,
) -> Result<(Judgement, usize), WorkerError> {
    let before = engine.evaluate(fen_before, depth).await?;
    if is_best_move(played_uci, before.best_move.as_deref()) {
        return Ok((Judgement::MatchesBest, 1));
    }

    let after = engine.evaluate(fen_after, depth).await?;
    let drop = evaluation_drop(before.centipawns, after.centipawns);

    let judgement = match classify(drop, thresholds) {
        Some(severity) => Judgement::Flagged {
            before,
            drop,
            severity,
        },
        None => Judgement::Tolerated { drop },
    };
    Ok((judgement, 2))
}

/// Pass 1: shallow scan of every ply.
pub async fn scan<E: PositionEvaluator>(
    engine: &E,
    plies: &[PlyRecord],
    settings: &AnalysisSettings,
) -> Result<(Vec<Candidate>, ScanReport), WorkerError> {
    let mut candidates = Vec::new();
    let mut report = ScanReport::default();

    for ply in plies {
        let (judgement, evaluated) = judge_move(
            engine,
            &ply.fen_before,
            &ply.fen_after,
            &ply.uci,
            settings.fast_depth,
            &settings.thresholds,
        )
        .await?;
        report.positions_evaluated += evaluated;

        match judgement {
            Judgement::MatchesBest => report.matched_best += 1,
            Judgement::Tolerated { drop } => {
                debug!(ply = ply.ply, san = %ply.san, drop, "Below threshold at shallow depth");
            }
            Judgement::Flagged { drop, severity, .. } => {
                debug!(ply = ply.ply, san = %ply.san, drop, %severity, "Candidate");
                candidates.push(Candidate::from(ply));
            }
        }
    }

    report.candidates = candidates.len();
    Ok((candidates, report))
}

/// Pass 2: re-check candidates at full depth.
pub async fn verify<E: PositionEvaluator>(
    engine: &E,
    candidates: &[Candidate],
    settings: &AnalysisSettings,
) -> Result<Vec<Mistake>, WorkerError> {
    let mut mistakes = Vec::new();

    for candidate in candidates {
        let (judgement, _) = judge_move(
            engine,
            &candidate.position_before,
            &candidate.position_after,
            &candidate.move_played_uci,
            settings.depth,
            &settings.thresholds,
        )
        .await?;

        match judgement {
            Judgement::MatchesBest => {
                debug!(san = %candidate.move_san, "Shallow false positive: best at full depth");
            }
            Judgement::Tolerated { drop } => {
                debug!(san = %candidate.move_san, drop, "Below threshold at full depth");
            }
            Judgement::Flagged {
                before,
                drop,
                severity,
            } => mistakes.push(Mistake {
                fen: candidate.position_before.clone(),
                side: candidate.side_to_move,
                played: candidate.move_san.clone(),
                best: before.best_move,
                delta_cp: drop,
                severity,
                principal_variation: before.principal_variation,
            }),
        }
    }

    Ok(mistakes)
}

/// Both passes back to back against one evaluator.
pub async fn analyze<E: PositionEvaluator>(
    engine: &E,
    plies: &[PlyRecord],
    settings: &AnalysisSettings,
) -> Result<Vec<Mistake>, WorkerError> {
    let (candidates, report) = scan(engine, plies, settings).await?;
    info!(
        plies = plies.len(),
        evaluated = report.positions_evaluated,
        matched = report.matched_best,
        candidates = report.candidates,
        "Scan complete"
    );
    verify(engine, &candidates, settings).await
}

/// Replay a PGN game into plies. Cheap; callers run it before reserving an engine.
pub fn parse_pgn(pgn: &str) -> Result<Vec<PlyRecord>, WorkerError> {
    if pgn.trim().is_empty() {
        return Err(WorkerError::InvalidInput("Missing pgn".into()));
    }
    Ok(chess_core::parse_game(pgn)?.plies)
}

/// Scan a PGN game with a dedicated engine.
pub async fn scan_game(
    config: &WorkerConfig,
    pgn: &str,
    settings: &AnalysisSettings,
) -> Result<Vec<Candidate>, WorkerError> {
    settings.validate()?;
    let plies = parse_pgn(pgn)?;
    scan_plies(config, &plies, settings).await
}

/// Scan already-replayed plies with a dedicated engine.
pub async fn scan_plies(
    config: &WorkerConfig,
    plies: &[PlyRecord],
    settings: &AnalysisSettings,
) -> Result<Vec<Candidate>, WorkerError> {
    settings.validate()?;
    info!(plies = plies.len(), fast_depth = settings.fast_depth, "Starting scan");

    let (candidates, report) =
        with_engine(config, |engine| async move { scan(&*engine, plies, settings).await }).await?;

    info!(
        evaluated = report.positions_evaluated,
        matched = report.matched_best,
        candidates = report.candidates,
        "Scan complete"
    );
    Ok(candidates)
}

/// Verify candidates from an earlier scan with a dedicated engine.
pub async fn analyze_candidates(
    config: &WorkerConfig,
    candidates: &[Candidate],
    settings: &AnalysisSettings,
) -> Result<Vec<Mistake>, WorkerError> {
    settings.validate()?;
    for candidate in candidates {
        candidate.validate()?;
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    info!(candidates = candidates.len(), depth = settings.depth, "Starting verification");

    let mistakes =
        with_engine(config, |engine| async move { verify(&*engine, candidates, settings).await })
            .await?;

    info!(mistakes = mistakes.len(), "Verification complete");
    Ok(mistakes)
}

/// Scan and verify a PGN game, sharing one engine between both passes.
pub async fn analyze_game(
    config: &WorkerConfig,
    pgn: &str,
    settings: &AnalysisSettings,
) -> Result<Vec<Mistake>, WorkerError> {
    settings.validate()?;
    let plies = parse_pgn(pgn)?;
    analyze_plies(config, &plies, settings).await
}

/// Both passes over already-replayed plies with a dedicated engine.
pub async fn analyze_plies(
    config: &WorkerConfig,
    plies: &[PlyRecord],
    settings: &AnalysisSettings,
) -> Result<Vec<Mistake>, WorkerError> {
    settings.validate()?;
    info!(
        plies = plies.len(),
        fast_depth = settings.fast_depth,
        depth = settings.depth,
        "Starting analysis"
    );

    let mistakes =
        with_engine(config, |engine| async move { analyze(&*engine, plies, settings).await })
            .await?;

    info!(mistakes = mistakes.len(), "Analysis complete");
    Ok(mistakes)
}
