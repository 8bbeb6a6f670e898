//! Worker error types

use chess_core::DiffError;
use thiserror::Error;

use crate::session::EngineError;

/// Where in the evaluation pipeline an engine call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Position before the played move
    Before,
    /// Position after the played move
    After,
    /// Position after the engine's preferred move
    BestLine,
}

impl AnalysisStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStage::Before => "before",
            AnalysisStage::After => "after",
            AnalysisStage::BestLine => "best-line",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Both positions parsed but no single legal move links them
    #[error("Move resolution failed: {0}")]
    MoveResolution(#[source] DiffError),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),

    #[error("Analysis of {stage} position failed ({fen}): {source}")]
    AnalysisFailed {
        stage: AnalysisStage,
        fen: String,
        #[source]
        source: EngineError,
    },

    #[error("Analysis of {stage} position timed out after {timeout_ms}ms ({fen})")]
    AnalysisTimeout {
        stage: AnalysisStage,
        fen: String,
        timeout_ms: u64,
    },

    #[error("Move not found: game {game_id}, move {move_id}")]
    MoveNotFound { game_id: String, move_id: String },

    #[error("SQS error: {0}")]
    Sqs(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DiffError> for EvalError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::InvalidPosition { .. } => EvalError::InvalidInput(err.to_string()),
            DiffError::NoMatchingMove { .. } | DiffError::AmbiguousMove { .. } => {
                EvalError::MoveResolution(err)
            }
        }
    }
}

impl EvalError {
    /// Whether running the same request again could succeed.
    ///
    /// Business failures (bad payloads, unresolvable moves, unknown moves)
    /// are permanent; engine and infrastructure failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EvalError::InvalidInput(_)
            | EvalError::MoveResolution(_)
            | EvalError::MoveNotFound { .. }
            | EvalError::Json(_) => false,
            EvalError::Config(_)
            | EvalError::EngineUnavailable(_)
            | EvalError::AnalysisFailed { .. }
            | EvalError::AnalysisTimeout { .. }
            | EvalError::Sqs(_)
            | EvalError::Database(_) => true,
        }
    }
}
