//! Recover the move played between two position snapshots.
//!
//! Producers of move events only hand us the FEN before and the FEN after a
//! move. The move itself is recovered by replaying every legal move of the
//! "before" position and comparing canonical FENs with the "after" position.

use shakmaty::{Chess, Color, Move, Position};
use thiserror::Error;

use crate::position::{canonical_fen, move_to_uci, parse_fen, PositionError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Invalid {side} position: {source}")]
    InvalidPosition {
        side: &'static str,
        #[source]
        source: PositionError,
    },

    #[error("No legal move from '{before}' reaches '{after}'")]
    NoMatchingMove { before: String, after: String },

    #[error("{} legal moves from '{before}' reach '{after}': {}", candidates.len(), candidates.join(", "))]
    AmbiguousMove {
        before: String,
        after: String,
        candidates: Vec<String>,
    },
}

/// A move recovered from a before/after pair, with the positions it connects.
#[derive(Debug, Clone)]
pub struct ResolvedMove {
    pub mv: Move,
    /// UCI text of `mv`
    pub uci: String,
    pub before: Chess,
    pub after: Chess,
}

impl ResolvedMove {
    /// The side that played the move.
    pub fn mover(&self) -> Color {
        self.before.turn()
    }
}

/// Find the single legal move of `before` that produces `after`.
///
/// Fails when no legal move matches, and also when more than one does: the
/// played move is never guessed.
pub fn find_move(before: &Chess, after: &Chess) -> Result<Move, DiffError> {
    let target = canonical_fen(after);

    let mut matches: Vec<Move> = before
        .legal_moves()
        .into_iter()
        .filter(|mv| {
            let mut candidate = before.clone();
            candidate.play_unchecked(*mv);
            canonical_fen(&candidate) == target
        })
        .collect();

    match matches.len() {
        0 => Err(DiffError::NoMatchingMove {
            before: canonical_fen(before),
            after: target,
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(DiffError::AmbiguousMove {
            before: canonical_fen(before),
            after: target,
            candidates: matches.iter().map(move_to_uci).collect(),
        }),
    }
}

/// Parse both FENs and recover the move between them.
pub fn find_move_between(fen_before: &str, fen_after: &str) -> Result<ResolvedMove, DiffError> {
    let before = parse_fen(fen_before).map_err(|source| DiffError::InvalidPosition {
        side: "before",
        source,
    })?;
    let after = parse_fen(fen_after).map_err(|source| DiffError::InvalidPosition {
        side: "after",
        source,
    })?;

    let mv = find_move(&before, &after)?;
    let uci = move_to_uci(&mv);

    Ok(ResolvedMove {
        mv,
        uci,
        before,
        after,
    })
}
