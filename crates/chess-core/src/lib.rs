//! Rules-engine boundary: turns PGN move text into replayed plies
//! (FEN before/after, SAN, coordinate move) using shakmaty.

pub mod game_data;
pub mod pgn;

pub use game_data::{GameData, GameMetadata, PlyRecord, Side};
pub use pgn::{parse_game, validate_fen, PgnError, STANDARD_START_FEN};
