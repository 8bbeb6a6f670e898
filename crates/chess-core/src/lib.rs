//! Chess primitives shared by the evaluation worker.
//!
//! Rules, move generation and FEN handling come from `shakmaty`; this crate
//! only adds the pieces the worker needs on top of it:
//!
//! - [`position`] - FEN parsing and canonical serialization
//! - [`differ`] - recovering the move played between two positions
//! - [`color`] - the player colour as it appears on the wire

pub mod color;
pub mod differ;
pub mod position;

pub use color::{ParseColorError, PlayerColor};
pub use differ::{find_move, find_move_between, DiffError, ResolvedMove};
pub use position::{canonical_fen, move_to_uci, parse_fen, play_uci, PositionError};
