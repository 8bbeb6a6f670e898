//! Evaluate-move request handling
//!
//! Parses and validates a request, judges the move and hands the result to
//! an [`EvaluationSink`].

use std::future::Future;
use std::time::Duration;

use chess_core::{parse_fen, DiffError};
use shakmaty::{Color, Position};
use tracing::{debug, info};

use crate::analyzer::{judge, JudgeRequest};
use crate::error::EvalError;
use crate::payload::{EvaluateMoveRequest, MoveEvaluationOutput};
use crate::session::{EngineLauncher, SearchLimit};

/// Destination for finished evaluations.
pub trait EvaluationSink: Sync {
    fn save(
        &self,
        output: &MoveEvaluationOutput,
    ) -> impl Future<Output = Result<(), EvalError>> + Send;
}

/// Prints each evaluation as JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl EvaluationSink for StdoutSink {
    async fn save(&self, output: &MoveEvaluationOutput) -> Result<(), EvalError> {
        println!("{}", serde_json::to_string_pretty(output)?);
        Ok(())
    }
}

pub struct RequestHandler<L, S> {
    launcher: L,
    sink: S,
    limit: SearchLimit,
    hard_timeout: Duration,
}

impl<L: EngineLauncher, S: EvaluationSink> RequestHandler<L, S> {
    pub fn new(launcher: L, sink: S, limit: SearchLimit, hard_timeout: Duration) -> Self {
        Self {
            launcher,
            sink,
            limit,
            hard_timeout,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Handle a raw queue message body.
    pub async fn handle_message(&self, body: &str) -> Result<MoveEvaluationOutput, EvalError> {
        let request = EvaluateMoveRequest::from_json(body)?;
        self.handle(&request).await
    }

    pub async fn handle(
        &self,
        request: &EvaluateMoveRequest,
    ) -> Result<MoveEvaluationOutput, EvalError> {
        request.validate()?;
        info!(
            game_id = %request.game_id,
            move_id = %request.move_id,
            source = request.source.as_deref().unwrap_or("-"),
            "Evaluating move"
        );

        let perspective = match request.player {
            Some(player) => Color::from(player),
            None => side_to_move(&request.fen_before)?,
        };

        let judgment = judge(
            &self.launcher,
            &JudgeRequest {
                fen_before: &request.fen_before,
                fen_after: &request.fen_after,
                perspective,
                limit: &self.limit,
                hard_timeout: self.hard_timeout,
            },
        )
        .await?;

        let output = MoveEvaluationOutput::new(request, &judgment);
        self.sink.save(&output).await?;
        debug!(game_id = %request.game_id, move_id = %request.move_id, "Evaluation saved");

        Ok(output)
    }
}

fn side_to_move(fen: &str) -> Result<Color, EvalError> {
    let position = parse_fen(fen).map_err(|source| DiffError::InvalidPosition {
        side: "before",
        source,
    })?;
    Ok(position.turn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RawScore;
    use crate::session::{EngineError, EngineSession, SearchInfo};
    use chess_core::PlayerColor;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    /// Every session answers with the same scripted scores.
    struct ScriptedLauncher {
        scores: Vec<(i32, &'static str)>,
        opened: AtomicUsize,
    }

    struct ScriptedSession {
        scores: VecDeque<(i32, &'static str)>,
    }

    impl EngineLauncher for ScriptedLauncher {
        type Session = ScriptedSession;

        async fn open(&self) -> Result<ScriptedSession, EngineError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedSession {
                scores: self.scores.iter().copied().collect(),
            })
        }
    }

    impl EngineSession for ScriptedSession {
        async fn analyze(&mut self, _fen: &str, _limit: &SearchLimit) -> Result<SearchInfo, EngineError> {
            let (cp, best) = self.scores.pop_front().ok_or(EngineError::Closed)?;
            Ok(SearchInfo {
                score: RawScore::Centipawns(cp),
                best_move: Some(best.to_string()),
                pv: vec![best.to_string()],
                depth: 12,
                nodes: 5000,
                nps: 100_000,
            })
        }

        async fn close(&mut self) {}
    }

    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<MoveEvaluationOutput>>,
        fail: bool,
    }

    impl EvaluationSink for MemorySink {
        async fn save(&self, output: &MoveEvaluationOutput) -> Result<(), EvalError> {
            if self.fail {
                return Err(EvalError::MoveNotFound {
                    game_id: output.game_id.clone(),
                    move_id: output.move_id.clone(),
                });
            }
            self.saved.lock().unwrap().push(output.clone());
            Ok(())
        }
    }

    fn handler(scores: Vec<(i32, &'static str)>, sink: MemorySink) -> RequestHandler<ScriptedLauncher, MemorySink> {
        RequestHandler::new(
            ScriptedLauncher {
                scores,
                opened: AtomicUsize::new(0),
            },
            sink,
            SearchLimit::movetime(Duration::from_millis(10)),
            Duration::from_secs(5),
        )
    }

    fn body(player: Option<&str>) -> String {
        let mut json = serde_json::json!({
            "fenBefore": START_FEN,
            "fenAfter": AFTER_E4,
            "gameId": "game-7",
            "moveId": "move-1",
            "source": "human",
        });
        if let Some(player) = player {
            json["player"] = player.into();
        }
        json.to_string()
    }

    #[tokio::test]
    async fn test_message_is_judged_and_saved() {
        let handler = handler(vec![(30, "e2e4"), (-25, "e7e5")], MemorySink::default());

        let output = handler.handle_message(&body(Some("white"))).await.unwrap();

        assert_eq!(output.move_played, "e2e4");
        assert_eq!(output.best_move.as_deref(), Some("e2e4"));
        assert_eq!(output.evaluation_cp, Some(25));
        assert_eq!(output.move_accuracy, 100.0);
        assert_eq!(output.color, PlayerColor::White);
        assert_eq!(output.source.as_deref(), Some("human"));

        let saved = handler.sink().saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0], output);
    }

    #[tokio::test]
    async fn test_missing_player_uses_side_to_move() {
        let handler = handler(vec![(30, "e2e4"), (-25, "e7e5")], MemorySink::default());
        let output = handler.handle_message(&body(None)).await.unwrap();
        assert_eq!(output.color, PlayerColor::White);
    }

    #[tokio::test]
    async fn test_wrong_player_is_rejected_without_engine() {
        let handler = handler(vec![], MemorySink::default());
        let err = handler.handle_message(&body(Some("black"))).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
        assert_eq!(handler.launcher.opened.load(Ordering::SeqCst), 0);
        assert!(handler.sink().saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_retryable() {
        let handler = handler(vec![], MemorySink::default());
        let err = handler.handle_message("{not json").await.unwrap_err();
        assert!(matches!(err, EvalError::Json(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let handler = handler(vec![], MemorySink::default());
        let err = handler
            .handle_message(r#"{"fenBefore": "x", "fenAfter": "y"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_bad_fen_with_player() {
        let handler = handler(vec![], MemorySink::default());
        let body = serde_json::json!({
            "fenBefore": START_FEN,
            "fenAfter": "garbage",
            "gameId": "g",
            "moveId": "m",
            "player": "white",
        })
        .to_string();
        let err = handler.handle_message(&body).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
        assert_eq!(handler.launcher.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_fen_without_player() {
        let handler = handler(vec![], MemorySink::default());
        let body = serde_json::json!({
            "fenBefore": "not a fen",
            "fenAfter": AFTER_E4,
            "gameId": "g",
            "moveId": "m",
        })
        .to_string();
        let err = handler.handle_message(&body).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_sink_error_propagates() {
        let sink = MemorySink {
            fail: true,
            ..Default::default()
        };
        let handler = handler(vec![(30, "e2e4"), (-25, "e7e5")], sink);
        let err = handler.handle_message(&body(Some("white"))).await.unwrap_err();
        assert!(matches!(err, EvalError::MoveNotFound { .. }));
    }
}
