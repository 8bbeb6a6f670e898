//! Single-move evaluation worker.
//!
//! Pulls evaluate-move requests off SQS, judges each move with a dedicated
//! Stockfish process and writes the result onto the move's database row.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod payload;
pub mod session;
pub mod sqs;
pub mod stockfish;

pub use error::EvalError;
