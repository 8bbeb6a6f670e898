//! FEN parsing and canonical serialization.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Move '{uci}' is not legal in '{fen}'")]
    IllegalMove { fen: String, uci: String },
}

/// Parse a FEN string into a playable position.
///
/// Rejects both malformed text and setups that are not legal chess positions.
pub fn parse_fen(fen: &str) -> Result<Chess, PositionError> {
    let trimmed = fen.trim();
    let invalid = |reason: String| PositionError::InvalidFen {
        fen: trimmed.to_string(),
        reason,
    };

    let setup: Fen = trimmed.parse().map_err(|e| invalid(format!("{e}")))?;
    setup
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| invalid(format!("{e}")))
}

/// Canonical FEN of a position. Two positions are the same position
/// exactly when their canonical FENs are equal.
///
/// The en passant square is only written when a capture is actually
/// possible, so inputs that always record it still compare equal.
pub fn canonical_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// UCI text of a move ("e2e4", "e1g1", "e7e8q").
pub fn move_to_uci(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// Play a UCI move on a copy of `pos`.
pub fn play_uci(pos: &Chess, uci: &str) -> Result<Chess, PositionError> {
    let illegal = || PositionError::IllegalMove {
        fen: canonical_fen(pos),
        uci: uci.to_string(),
    };

    let parsed: UciMove = uci.parse().map_err(|_| illegal())?;
    let mv = parsed.to_move(pos).map_err(|_| illegal())?;

    let mut next = pos.clone();
    next.play_unchecked(mv);
    Ok(next)
}
