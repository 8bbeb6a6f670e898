//! Move quality evaluation
//!
//! Resolves the move played between two positions, asks the engine about the
//! position before it, after it and (when the engine preferred something
//! else) after the engine's choice, and turns the answers into a judgment.

use std::time::Duration;

use chess_core::{canonical_fen, find_move_between, play_uci, PlayerColor, ResolvedMove};
use shakmaty::{Color, Position};
use tracing::{debug, info};

use crate::analysis::{self, Evaluation};
use crate::error::{AnalysisStage, EvalError};
use crate::session::{EngineError, EngineLauncher, EngineSession, SearchLimit};

/// Inputs for one judgment.
#[derive(Debug, Clone)]
pub struct JudgeRequest<'a> {
    pub fen_before: &'a str,
    pub fen_after: &'a str,
    /// Side whose move is judged; every score in the result is relative to it
    pub perspective: Color,
    pub limit: &'a SearchLimit,
    /// Hard cap on each engine call
    pub hard_timeout: Duration,
}

/// The verdict on one played move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveJudgment {
    /// UCI text of the move that was played
    pub move_played: String,
    pub perspective: Color,
    pub evaluation_before: Evaluation,
    pub evaluation_after: Evaluation,
    /// The engine's top choice in the position before the move
    pub best_move: Option<String>,
    /// Centipawns lost against the engine's choice, 0 when it was played
    pub evaluation_swing: u32,
    pub move_quality: f64,
    pub move_accuracy: f64,
    pub is_blunder: bool,
    pub is_mate: bool,
    pub mate_in: Option<i32>,
}

/// Judge the move that turns `fen_before` into `fen_after`.
///
/// The move is resolved before any engine is started. One session serves all
/// engine calls and is closed on every path out, including failures.
pub async fn judge<L: EngineLauncher>(
    launcher: &L,
    request: &JudgeRequest<'_>,
) -> Result<MoveJudgment, EvalError> {
    let resolved = find_move_between(request.fen_before, request.fen_after)?;

    if resolved.mover() != request.perspective {
        return Err(EvalError::InvalidInput(format!(
            "move {} was played by {}, not {}",
            resolved.uci,
            PlayerColor::from(resolved.mover()),
            PlayerColor::from(request.perspective)
        )));
    }
    debug!(move_played = %resolved.uci, "Resolved played move");

    let mut session = launcher.open().await.map_err(EvalError::EngineUnavailable)?;
    let outcome = judge_with_session(&mut session, &resolved, request).await;
    session.close().await;

    outcome
}

async fn judge_with_session<S: EngineSession>(
    session: &mut S,
    resolved: &ResolvedMove,
    request: &JudgeRequest<'_>,
) -> Result<MoveJudgment, EvalError> {
    let before_fen = canonical_fen(&resolved.before);
    let before = analyze_stage(
        session,
        AnalysisStage::Before,
        &before_fen,
        resolved.before.turn(),
        request,
    )
    .await?;

    let best_move = before.best_move.clone().ok_or_else(|| EvalError::AnalysisFailed {
        stage: AnalysisStage::Before,
        fen: before_fen.clone(),
        source: EngineError::Protocol("no best move reported".into()),
    })?;

    let after = analyze_stage(
        session,
        AnalysisStage::After,
        &canonical_fen(&resolved.after),
        resolved.after.turn(),
        request,
    )
    .await?;

    let played_is_best = best_move == resolved.uci;
    let evaluation_swing = if played_is_best {
        0
    } else {
        let best_position =
            play_uci(&resolved.before, &best_move).map_err(|e| EvalError::AnalysisFailed {
                stage: AnalysisStage::Before,
                fen: before_fen.clone(),
                source: EngineError::Protocol(e.to_string()),
            })?;
        let best_line = analyze_stage(
            session,
            AnalysisStage::BestLine,
            &canonical_fen(&best_position),
            best_position.turn(),
            request,
        )
        .await?;
        analysis::evaluation_swing(best_line.centipawns, after.centipawns)
    };

    let move_quality = analysis::move_quality(before.normalized, after.normalized);
    let move_accuracy = analysis::move_accuracy(played_is_best, move_quality);
    let is_blunder = analysis::is_blunder(evaluation_swing);

    info!(
        move_played = %resolved.uci,
        best_move = %best_move,
        evaluation = after.normalized.value,
        move_quality,
        move_accuracy,
        evaluation_swing,
        is_blunder,
        "Move judged"
    );

    Ok(MoveJudgment {
        move_played: resolved.uci.clone(),
        perspective: request.perspective,
        is_mate: after.raw_score.is_mate(),
        mate_in: after.raw_score.mate_in(),
        evaluation_before: before,
        evaluation_after: after,
        best_move: Some(best_move),
        evaluation_swing,
        move_quality,
        move_accuracy,
        is_blunder,
    })
}

/// One engine call under the hard timeout, seen from the judged side.
async fn analyze_stage<S: EngineSession>(
    session: &mut S,
    stage: AnalysisStage,
    fen: &str,
    side_to_move: Color,
    request: &JudgeRequest<'_>,
) -> Result<Evaluation, EvalError> {
    debug!(stage = %stage, fen, "Analyzing position");

    let info = match tokio::time::timeout(request.hard_timeout, session.analyze(fen, request.limit)).await
    {
        Ok(Ok(info)) => info,
        Ok(Err(source)) => {
            return Err(EvalError::AnalysisFailed {
                stage,
                fen: fen.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(EvalError::AnalysisTimeout {
                stage,
                fen: fen.to_string(),
                timeout_ms: u64::try_from(request.hard_timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    };

    Ok(Evaluation::from_search(info, side_to_move, request.perspective))
}
