//! UCI protocol codec: outgoing commands and incoming engine lines.
//!
//! Decoding never fails. Lines the codec does not understand become
//! [`EngineEvent::Unrecognized`] and carry no information for the session.

use serde::{Deserialize, Serialize};

/// Centipawn value a forced mate is mapped to, signed by who mates.
pub const MATE_SCORE: i32 = 10_000;

/// Principal variations are truncated to this many moves.
pub const MAX_PV_LEN: usize = 12;

/// Commands sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the handshake
    Uci,
    IsReady,
    /// Reset engine state for a new game
    UciNewGame,
    PositionFen(String),
    SetOption { name: String, value: String },
    GoDepth(u32),
    Quit,
}

impl Command {
    pub fn threads(threads: u32) -> Self {
        Self::option("Threads", threads)
    }

    pub fn hash(megabytes: u32) -> Self {
        Self::option("Hash", megabytes)
    }

    pub fn multi_pv(lines: u32) -> Self {
        Self::option("MultiPV", lines)
    }

    pub fn analyse_mode(enabled: bool) -> Self {
        Self::option("UCI_AnalyseMode", enabled)
    }

    pub fn ponder(enabled: bool) -> Self {
        Self::option("Ponder", enabled)
    }

    fn option(name: &str, value: impl ToString) -> Self {
        Command::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Format as a protocol line (without the trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Command::Uci => "uci".to_string(),
            Command::IsReady => "isready".to_string(),
            Command::UciNewGame => "ucinewgame".to_string(),
            Command::PositionFen(fen) => format!("position fen {fen}"),
            Command::SetOption { name, value } => format!("setoption name {name} value {value}"),
            Command::GoDepth(depth) => format!("go depth {depth}"),
            Command::Quit => "quit".to_string(),
        }
    }
}

/// Engine score from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, zero or negative = gets mated)
    Mate(i32),
}

impl Score {
    /// Centipawn value, with mate scores saturated to ±`MATE_SCORE`.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) if n > 0 => MATE_SCORE,
            Score::Mate(_) => -MATE_SCORE,
        }
    }

    pub fn mate_distance(self) -> Option<i32> {
        match self {
            Score::Mate(n) => Some(n),
            Score::Centipawns(_) => None,
        }
    }
}

/// One decoded line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// `id name ...`
    Identity { name: String },
    /// `uciok`
    HandshakeAck,
    /// `readyok`
    ReadinessAck,
    /// `info ...`
    SearchProgress {
        depth: Option<u32>,
        score: Option<Score>,
        pv: Vec<String>,
    },
    /// `bestmove <move> [ponder <move>]`; `None` when the engine has no legal move
    SearchComplete { best_move: Option<String> },
    Unrecognized(String),
}

/// Decode a single line of engine output.
pub fn decode(line: &str) -> EngineEvent {
    let line = line.trim();
    let mut parts = line.split_whitespace();

    match parts.next() {
        Some("uciok") => EngineEvent::HandshakeAck,
        Some("readyok") => EngineEvent::ReadinessAck,
        Some("id") if parts.next() == Some("name") => EngineEvent::Identity {
            name: parts.collect::<Vec<_>>().join(" "),
        },
        Some("info") => parse_info(line),
        Some("bestmove") => EngineEvent::SearchComplete {
            best_move: parts.next().and_then(normalize_best_move),
        },
        _ => EngineEvent::Unrecognized(line.to_string()),
    }
}

fn normalize_best_move(token: &str) -> Option<String> {
    match token {
        "(none)" | "0000" | "none" | "null" => None,
        mv => Some(mv.to_ascii_lowercase()),
    }
}

/// Parse an info line. `info string ...` carries free text and is treated as empty.
fn parse_info(line: &str) -> EngineEvent {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut depth = None;
    let mut score = None;
    let mut pv = Vec::new();

    let mut i = 1; // Skip "info"
    while i < parts.len() {
        match parts[i] {
            "string" => break,
            "depth" => {
                depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                let value = parts.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                score = match (parts.get(i + 1).copied(), value) {
                    (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                    _ => score,
                };
                i += 3;
            }
            "pv" => {
                // PV runs to the end of the line
                pv = parts[i + 1..]
                    .iter()
                    .take(MAX_PV_LEN)
                    .map(|s| s.to_string())
                    .collect();
                break;
            }
            _ => i += 1,
        }
    }

    EngineEvent::SearchProgress { depth, score, pv }
}

/// Result of a single position evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Centipawns from the side to move's perspective, mate saturated to ±10000
    pub centipawns: i32,
    pub mate: Option<i32>,
    /// Best move in coordinate notation
    pub best_move: Option<String>,
    pub principal_variation: Vec<String>,
    /// Deepest depth reported by the engine
    pub depth: Option<u32>,
}

/// Accumulates search-progress lines until the terminal `bestmove` line.
/// Later lines overwrite earlier ones, so the deepest report wins.
#[derive(Debug, Default)]
pub struct SearchTracker {
    score: Option<Score>,
    pv: Vec<String>,
    depth: Option<u32>,
}

impl SearchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, depth: Option<u32>, score: Option<Score>, pv: &[String]) {
        if depth.is_some() {
            self.depth = depth;
        }
        if score.is_some() {
            self.score = score;
        }
        if !pv.is_empty() {
            self.pv = pv.to_vec();
        }
    }

    /// Build the result for a finished search and reset for the next one.
    pub fn finish(&mut self, best_move: Option<String>) -> EvaluationResult {
        let tracked = std::mem::take(self);
        EvaluationResult {
            centipawns: tracked.score.map(Score::to_centipawns).unwrap_or(0),
            mate: tracked.score.and_then(Score::mate_distance),
            best_move,
            principal_variation: tracked.pv,
            depth: tracked.depth,
        }
    }
}
