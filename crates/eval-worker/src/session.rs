//! The seam between the evaluation pipeline and an analysis engine.
//!
//! A launcher opens sessions; a session is one conversation with one engine
//! process. Sessions take `&mut self` for every call, so a session can serve
//! several sequential analyses but never two at once.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::analysis::RawScore;

/// Errors raised while talking to an engine process.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine at {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine handshake failed: {0}")]
    Handshake(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Engine closed unexpectedly")]
    Closed,
}

/// Budget for a single analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLimit {
    /// Thinking time handed to the engine
    pub movetime: Duration,
    /// Fixed search depth; takes precedence over `movetime` when set
    pub depth: Option<u32>,
}

impl SearchLimit {
    pub fn movetime(movetime: Duration) -> Self {
        Self {
            movetime,
            depth: None,
        }
    }

    /// The UCI `go` command for this budget.
    pub fn go_command(&self) -> String {
        match self.depth {
            Some(depth) => format!("go depth {depth}"),
            None => format!("go movetime {}", self.movetime.as_millis()),
        }
    }
}

/// What the engine reported for one position.
///
/// `score` is relative to the side to move in the analyzed position, which is
/// how UCI engines report it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchInfo {
    pub score: RawScore,
    /// First move of the principal variation, `None` when the engine has no move
    pub best_move: Option<String>,
    pub pv: Vec<String>,
    pub depth: u32,
    pub nodes: u64,
    pub nps: u64,
}

/// One open conversation with an analysis engine.
pub trait EngineSession: Send {
    /// Analyze the position given as FEN within `limit`.
    fn analyze(
        &mut self,
        fen: &str,
        limit: &SearchLimit,
    ) -> impl Future<Output = Result<SearchInfo, EngineError>> + Send;

    /// Release the engine. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens engine sessions.
pub trait EngineLauncher: Sync {
    type Session: EngineSession;

    fn open(&self) -> impl Future<Output = Result<Self::Session, EngineError>> + Send;
}
