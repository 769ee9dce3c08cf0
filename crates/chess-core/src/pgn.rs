//! PGN parsing: regex tokenizer for the move text, shakmaty for replay.

use std::sync::LazyLock;

use regex::Regex;
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use thiserror::Error;

use crate::game_data::{GameData, GameMetadata, PlyRecord, Side};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

static HEADER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("header tag pattern"));

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("header line pattern"));

static SAN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"O-O-O[+#]?|O-O[+#]?|0-0-0[+#]?|0-0[+#]?|[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=?[QRBN])?[+#]?",
    )
    .expect("SAN token pattern")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgnError {
    #[error("PGN contains no moves")]
    NoMoves,

    #[error("Invalid FEN header: {0}")]
    InvalidFen(String),

    #[error("Illegal or unreadable move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

/// Parse a PGN string and replay its main line.
/// Comments, variations and NAGs are ignored. A `[FEN]` header sets the start position.
pub fn parse_game(pgn: &str) -> Result<GameData, PgnError> {
    let metadata = parse_headers(pgn);

    let start: Chess = match metadata.start_fen.as_deref() {
        Some(fen) => fen
            .parse::<Fen>()
            .map_err(|_| PgnError::InvalidFen(fen.to_string()))?
            .into_position(CastlingMode::Standard)
            .map_err(|_| PgnError::InvalidFen(fen.to_string()))?,
        None => Chess::default(),
    };

    let tokens = extract_moves(pgn);
    if tokens.is_empty() {
        return Err(PgnError::NoMoves);
    }

    let plies = replay(start, &tokens)?;
    Ok(GameData { metadata, plies })
}

/// Check that `fen` describes a legal position.
pub fn validate_fen(fen: &str) -> Result<(), PgnError> {
    let invalid = || PgnError::InvalidFen(fen.to_string());
    fen.trim()
        .parse::<Fen>()
        .map_err(|_| invalid())?
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|_| invalid())?;
    Ok(())
}

fn parse_headers(pgn: &str) -> GameMetadata {
    let mut metadata = GameMetadata::default();

    for cap in HEADER_TAG.captures_iter(pgn) {
        let value = cap[2].trim().to_string();
        if value.is_empty() {
            continue;
        }
        if &cap[1] == "FEN" {
            metadata.start_fen = Some(value);
        }
    }

    metadata
}

/// Play SAN tokens from `start`, recording FEN before/after and the coordinate move.
fn replay(start: Chess, tokens: &[String]) -> Result<Vec<PlyRecord>, PgnError> {
    let mut pos = start;
    let mut plies = Vec::with_capacity(tokens.len());

    for (ply, token) in tokens.iter().enumerate() {
        let illegal = || PgnError::IllegalMove {
            ply,
            san: token.clone(),
        };
        let san_plus: SanPlus = token.parse().map_err(|_| illegal())?;
        let mv = san_plus.san.to_move(&pos).map_err(|_| illegal())?;

        let fen_before = Fen::from_position(&pos, EnPassantMode::Legal).to_string();
        let side = Side::from_color(pos.turn());
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let mut san = San::from_move(&pos, mv).to_string();

        pos.play_unchecked(mv);

        if pos.is_checkmate() {
            san.push('#');
        } else if pos.is_check() {
            san.push('+');
        }
        let fen_after = Fen::from_position(&pos, EnPassantMode::Legal).to_string();

        plies.push(PlyRecord {
            ply,
            side,
            san,
            uci,
            fen_before,
            fen_after,
        });
    }

    Ok(plies)
}

/// Extract SAN move tokens from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = HEADER_LINE.replace_all(pgn, "");
    let movetext = strip_annotations(&no_headers);

    SAN_TOKEN
        .find_iter(&movetext)
        .map(|m| m.as_str().replace('0', "O"))
        .collect()
}

/// Drop `{...}` and `;` comments and `(...)` variations, which may nest.
fn strip_annotations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut variation_depth = 0usize;
    let mut in_brace = false;
    let mut in_line_comment = false;

    for c in text.chars() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push(' ');
            }
            continue;
        }
        if in_brace {
            if c == '}' {
                in_brace = false;
                out.push(' ');
            }
            continue;
        }
        match c {
            '{' => in_brace = true,
            ';' => in_line_comment = true,
            '(' => variation_depth += 1,
            ')' => variation_depth = variation_depth.saturating_sub(1),
            _ if variation_depth > 0 => {}
            _ => out.push(c),
        }
    }

    out
}
