//! Wire formats for evaluation requests and results.

use chess_core::PlayerColor;
use serde::{Deserialize, Serialize};

use crate::analyzer::MoveJudgment;
use crate::error::EvalError;

/// An evaluate-move request as delivered by the queue.
///
/// Required fields default to empty so that a missing field is reported by
/// [`validate`](EvaluateMoveRequest::validate) together with the other problems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateMoveRequest {
    #[serde(default)]
    pub fen_before: String,
    #[serde(default)]
    pub fen_after: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub move_id: String,
    /// Side that played the move; must match the side to move in `fen_before`
    #[serde(default, alias = "color", skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerColor>,
    /// Who produced the move ("human", "ai", a model name, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EvaluateMoveRequest {
    pub fn from_json(body: &str) -> Result<Self, EvalError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Check required fields before any work is done.
    pub fn validate(&self) -> Result<(), EvalError> {
        let missing: Vec<&str> = [
            ("fenBefore", &self.fen_before),
            ("fenAfter", &self.fen_after),
            ("gameId", &self.game_id),
            ("moveId", &self.move_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EvalError::InvalidInput(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// The evaluation written back for a move. Scores are from `color`'s side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEvaluationOutput {
    /// Normalized evaluation after the move, in [-1, 1]
    pub evaluation: f64,
    /// Centipawns after the move, `None` when the engine sees a mate
    pub evaluation_cp: Option<i32>,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
    pub best_move: Option<String>,
    pub move_played: String,
    pub move_quality: f64,
    pub evaluation_swing: u32,
    pub move_accuracy: f64,
    pub is_blunder: bool,
    pub depth: u32,
    pub nodes: u64,
    pub nps: u64,
    pub game_id: String,
    pub move_id: String,
    pub color: PlayerColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MoveEvaluationOutput {
    pub fn new(request: &EvaluateMoveRequest, judgment: &MoveJudgment) -> Self {
        let after = &judgment.evaluation_after;
        Self {
            evaluation: after.normalized.value,
            evaluation_cp: after.raw_score.centipawns(),
            is_mate: judgment.is_mate,
            mate_in: judgment.mate_in,
            best_move: judgment.best_move.clone(),
            move_played: judgment.move_played.clone(),
            move_quality: judgment.move_quality,
            evaluation_swing: judgment.evaluation_swing,
            move_accuracy: judgment.move_accuracy,
            is_blunder: judgment.is_blunder,
            depth: after.depth,
            nodes: after.nodes,
            nps: after.nps,
            game_id: request.game_id.clone(),
            move_id: request.move_id.clone(),
            color: judgment.perspective.into(),
            source: request.source.clone(),
        }
    }
}
