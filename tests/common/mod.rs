use std::sync::Mutex;
use std::time::Duration;

use eval_worker::handler::{EvaluationSink, RequestHandler};
use eval_worker::payload::MoveEvaluationOutput;
use eval_worker::session::SearchLimit;
use eval_worker::stockfish::StockfishLauncher;
use eval_worker::EvalError;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

/// 1.e4 g6, white to move
pub const BEFORE_QH5: &str = "rnbqkbnr/pppppp1p/6p1/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
/// 2.Qh5??, the queen hangs to the g6 pawn
pub const AFTER_QH5: &str = "rnbqkbnr/pppppp1p/6p1/7Q/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 2";

/// UCI engine that answers by side to move: +30 for white (best e2e4),
/// -25 for black (best e7e5).
pub const OPENING_ENGINE: &str = r#"
fen=""
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    position*) fen="$line" ;;
    go*)
      case "$fen" in
        *" w "*) echo "info depth 10 score cp 30 nodes 1000 nps 50000 pv e2e4 e7e5"; echo "bestmove e2e4" ;;
        *) echo "info depth 10 score cp -25 nodes 1000 nps 50000 pv e7e5 g1f3"; echo "bestmove e7e5" ;;
      esac ;;
    quit) exit 0 ;;
  esac
done
"#;

/// UCI engine that knows the Qh5 position: white prefers Nf3, and after
/// Qh5 black wins the queen.
pub const QUEEN_BLUNDER_ENGINE: &str = r#"
fen=""
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    position*) fen="$line" ;;
    go*)
      case "$fen" in
        *" w "*) echo "info depth 14 score cp 35 nodes 9000 nps 90000 pv g1f3"; echo "bestmove g1f3" ;;
        *7Q/*) echo "info depth 14 score cp 870 nodes 9000 nps 90000 pv g6h5"; echo "bestmove g6h5" ;;
        *) echo "info depth 14 score cp -30 nodes 9000 nps 90000 pv f8g7"; echo "bestmove f8g7" ;;
      esac ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Completes the handshake, then dies when asked to search.
pub const CRASHING_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exit 1 ;;
  esac
done
"#;

/// Records its PID in `PID_FILE`, then hangs on the first `go`.
/// `exec` keeps the PID, so the recorded one is the searching process.
pub const PID_RECORDING_HANGING_ENGINE: &str = r#"
echo $$ > "PID_FILE"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exec sleep 30 ;;
  esac
done
"#;

pub fn sh_engine(script: &str) -> StockfishLauncher {
    StockfishLauncher::from_command("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

/// Collects evaluations in memory.
#[derive(Default)]
pub struct MemorySink {
    pub saved: Mutex<Vec<MoveEvaluationOutput>>,
}

impl MemorySink {
    pub fn count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl EvaluationSink for MemorySink {
    async fn save(&self, output: &MoveEvaluationOutput) -> Result<(), EvalError> {
        self.saved.lock().unwrap().push(output.clone());
        Ok(())
    }
}

pub fn handler(launcher: StockfishLauncher) -> RequestHandler<StockfishLauncher, MemorySink> {
    RequestHandler::new(
        launcher,
        MemorySink::default(),
        SearchLimit::movetime(Duration::from_millis(50)),
        Duration::from_secs(5),
    )
}

/// Queue message body for a move.
pub fn message(fen_before: &str, fen_after: &str, player: &str) -> String {
    serde_json::json!({
        "fenBefore": fen_before,
        "fenAfter": fen_after,
        "gameId": "game-42",
        "moveId": "move-3",
        "player": player,
        "source": "integration",
    })
    .to_string()
}
