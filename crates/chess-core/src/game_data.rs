use serde::{Deserialize, Serialize};

/// Side to move in a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "w", alias = "white")]
    White,
    #[serde(rename = "b", alias = "black")]
    Black,
}

impl Side {
    pub fn from_color(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Side::White,
            shakmaty::Color::Black => Side::Black,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "w",
            Side::Black => "b",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Starting position when the game carries a `[FEN]` header
    pub start_fen: Option<String>,
}

/// One half-move of a replayed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlyRecord {
    /// Zero-based half-move index
    pub ply: usize,
    /// Side that played the move
    pub side: Side,
    /// Canonical SAN, with check/mate suffix
    pub san: String,
    /// Coordinate move ("e2e4", "e1g1", "a7a8q")
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameData {
    pub metadata: GameMetadata,
    pub plies: Vec<PlyRecord>,
}

impl GameData {
    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serializes_as_single_letter() {
        assert_eq!(serde_json::to_string(&Side::White).unwrap(), "\"w\"");
        assert_eq!(serde_json::to_string(&Side::Black).unwrap(), "\"b\"");
        let side: Side = serde_json::from_str("\"black\"").unwrap();
        assert_eq!(side, Side::Black);
    }

    #[test]
    fn test_ply_record_camel_case() {
        let ply = PlyRecord {
            ply: 0,
            side: Side::White,
            san: "e4".into(),
            uci: "e2e4".into(),
            fen_before: "a".into(),
            fen_after: "b".into(),
        };
        let json = serde_json::to_value(&ply).unwrap();
        assert_eq!(json["fenBefore"], "a");
        assert_eq!(json["fenAfter"], "b");
        assert_eq!(json["side"], "w");
    }
}
