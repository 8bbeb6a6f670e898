//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::analysis::RawScore;
use crate::config::EngineConfig;
use crate::session::{EngineError, EngineLauncher, EngineSession, SearchInfo, SearchLimit};

/// Maximum number of lines to read before giving up on a UCI response.
pub const MAX_UCI_LINES: usize = 100_000;

/// How long a process gets to exit after `quit` before it is killed
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Spawns one Stockfish process per session.
#[derive(Clone, Debug)]
pub struct StockfishLauncher {
    program: PathBuf,
    args: Vec<String>,
    threads: u32,
    hash_mb: u32,
    handshake_timeout: Duration,
}

impl StockfishLauncher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            program: config.path.clone(),
            args: Vec::new(),
            threads: config.threads,
            hash_mb: config.hash_mb,
            handshake_timeout: config.hard_timeout,
        }
    }

    /// Launch an arbitrary command speaking UCI on stdin/stdout.
    pub fn from_command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            threads: 1,
            hash_mb: 16,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineLauncher for StockfishLauncher {
    type Session = StockfishEngine;

    async fn open(&self) -> Result<StockfishEngine, EngineError> {
        StockfishEngine::spawn(self).await
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    name: String,
    closed: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    async fn spawn(launcher: &StockfishLauncher) -> Result<Self, EngineError> {
        let path = launcher.program.display().to_string();

        let mut process = Command::new(&launcher.program)
            .args(&launcher.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn { path, source })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Handshake("stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| EngineError::Handshake("stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
            name: String::new(),
            closed: false,
        };

        // Dropping `engine` on any failure below kills the process.
        match tokio::time::timeout(launcher.handshake_timeout, engine.handshake(launcher)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Handshake(e.to_string())),
            Err(_) => {
                return Err(EngineError::Handshake(format!(
                    "no response within {}ms",
                    launcher.handshake_timeout.as_millis()
                )))
            }
        }

        debug!(engine = %engine.name, "Engine ready");
        Ok(engine)
    }

    async fn handshake(&mut self, launcher: &StockfishLauncher) -> Result<(), EngineError> {
        self.send("uci").await?;
        let mut uciok = false;
        for _ in 0..MAX_UCI_LINES {
            let line = self.read_line().await?;
            if let Some(name) = line.strip_prefix("id name ") {
                self.name = name.to_string();
            } else if line == "uciok" {
                uciok = true;
                break;
            }
        }
        if !uciok {
            return Err(EngineError::Handshake(format!(
                "no uciok within {MAX_UCI_LINES} lines"
            )));
        }

        self.send(&format!("setoption name Threads value {}", launcher.threads))
            .await?;
        self.send(&format!("setoption name Hash value {}", launcher.hash_mb))
            .await?;
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    /// The engine's name as reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, EngineError> {
        let mut line = String::new();
        let bytes = self.stdout.read_line(&mut line).await?;
        if bytes == 0 {
            return Err(EngineError::Closed);
        }
        let trimmed = line.trim();
        debug!(line = trimmed, "SF >");
        Ok(trimmed.to_string())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), EngineError> {
        for _ in 0..MAX_UCI_LINES {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
        Err(EngineError::Protocol(format!(
            "no '{expected}' within {MAX_UCI_LINES} lines"
        )))
    }
}

impl EngineSession for StockfishEngine {
    async fn analyze(&mut self, fen: &str, limit: &SearchLimit) -> Result<SearchInfo, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }

        self.send(&format!("position fen {fen}")).await?;
        self.send(&limit.go_command()).await?;

        let mut latest: Option<InfoLine> = None;
        for _ in 0..MAX_UCI_LINES {
            let line = self.read_line().await?;

            if line.starts_with("info") {
                if let Some(info) = parse_info_line(&line) {
                    latest = Some(info);
                }
            } else if line.starts_with("bestmove") {
                let info = latest.ok_or_else(|| {
                    EngineError::Protocol(format!("no score reported before '{line}'"))
                })?;
                let best_move = info
                    .pv
                    .first()
                    .cloned()
                    .or_else(|| parse_bestmove(&line));

                return Ok(SearchInfo {
                    score: info.score,
                    best_move,
                    pv: info.pv,
                    depth: info.depth,
                    nodes: info.nodes,
                    nps: info.nps,
                });
            }
        }

        Err(EngineError::Protocol(
            "too many lines without bestmove".to_string(),
        ))
    }

    /// Send quit command and wait for process to exit, killing it if it lingers
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let _ = self.send("quit").await;
        match tokio::time::timeout(QUIT_GRACE, self.process.wait()).await {
            Ok(_) => debug!("Engine exited"),
            Err(_) => {
                warn!("Engine ignored quit, killing process");
                let _ = self.process.kill().await;
            }
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Cancelled before close(): kill synchronously so the process never outlives us.
        if !self.closed {
            let _ = self.process.start_kill();
        }
    }
}

/// Fields of one scored `info` line
#[derive(Debug, Clone, PartialEq)]
struct InfoLine {
    depth: u32,
    score: RawScore,
    nodes: u64,
    nps: u64,
    pv: Vec<String>,
}

/// Parse a UCI info line to extract depth, score, nodes, nps and PV.
///
/// Lines without both a depth and an exact score (`info string`, `currmove`
/// updates, bound-only scores, secondary multipv lines) are skipped.
fn parse_info_line(line: &str) -> Option<InfoLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    let mut depth: Option<u32> = None;
    let mut score: Option<RawScore> = None;
    let mut nodes: u64 = 0;
    let mut nps: u64 = 0;
    let mut pv: Vec<String> = Vec::new();

    let mut i = 1;
    while i < parts.len() {
        match parts[i] {
            "string" => return None,
            "depth" => {
                depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 1;
            }
            "multipv" => {
                if parts.get(i + 1) != Some(&"1") {
                    return None;
                }
                i += 1;
            }
            "score" => {
                let value = parts.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                score = match (parts.get(i + 1), value) {
                    (Some(&"cp"), Some(cp)) => Some(RawScore::Centipawns(cp)),
                    (Some(&"mate"), Some(n)) => Some(RawScore::Mate(n)),
                    _ => None,
                };
                i += 2;
            }
            "lowerbound" | "upperbound" => return None,
            "nodes" => {
                nodes = parts.get(i + 1).and_then(|v| v.parse().ok()).unwrap_or(0);
                i += 1;
            }
            "nps" => {
                nps = parts.get(i + 1).and_then(|v| v.parse().ok()).unwrap_or(0);
                i += 1;
            }
            "pv" => {
                pv = parts[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    Some(InfoLine {
        depth: depth?,
        score: score?,
        nodes,
        nps,
        pv,
    })
}

/// Parse "bestmove e2e4 ponder e7e5"; "(none)" means there is no move.
fn parse_bestmove(line: &str) -> Option<String> {
    line.split_whitespace()
        .nth(1)
        .filter(|mv| *mv != "(none)")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_line_centipawn() {
        let line = "info depth 15 seldepth 21 multipv 1 score cp 35 nodes 50000 nps 1200000 tbhits 0 time 41 pv e2e4 e7e5 g1f3";
        let info = parse_info_line(line).unwrap();
        assert_eq!(info.depth, 15);
        assert_eq!(info.score, RawScore::Centipawns(35));
        assert_eq!(info.nodes, 50000);
        assert_eq!(info.nps, 1_200_000);
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_parse_info_line_mate() {
        let line = "info depth 12 score mate -3 nodes 10000 pv d1h5 g6h5";
        let info = parse_info_line(line).unwrap();
        assert_eq!(info.score, RawScore::Mate(-3));
        assert_eq!(info.pv.len(), 2);
    }

    #[test]
    fn test_parse_info_line_mated_position() {
        let info = parse_info_line("info depth 0 score mate 0").unwrap();
        assert_eq!(info.score, RawScore::Mate(0));
        assert!(info.pv.is_empty());
    }

    #[test]
    fn test_parse_info_line_skips_partial_lines() {
        assert!(parse_info_line("info string NNUE evaluation using nn-1111.nnue").is_none());
        assert!(parse_info_line("info depth 20 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_info_line("info score cp 35 nodes 50000 pv e2e4").is_none());
        assert!(parse_info_line("info depth 18 score cp 40 lowerbound nodes 9 pv e2e4").is_none());
        assert!(parse_info_line("info depth 18 multipv 2 score cp 20 pv d2d4").is_none());
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(parse_bestmove("bestmove e2e4 ponder e7e5"), Some("e2e4".to_string()));
        assert_eq!(parse_bestmove("bestmove e7e8q"), Some("e7e8q".to_string()));
        assert_eq!(parse_bestmove("bestmove (none)"), None);
        assert_eq!(parse_bestmove("bestmove"), None);
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        /// A shell script that answers like a tiny UCI engine.
        const FAKE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish 1.0"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*)
      echo "info string thinking"
      echo "info depth 1 score cp 12 nodes 20 pv d2d4"
      echo "info depth 12 seldepth 15 multipv 1 score cp 31 nodes 20480 nps 409600 time 50 pv e2e4 e7e5"
      echo "bestmove e2e4 ponder e7e5" ;;
    quit) exit 0 ;;
  esac
done
"#;

        /// Completes the handshake, then never answers `go`.
        const HANGING_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exec sleep 30 ;;
  esac
done
"#;

        fn sh(script: &str) -> StockfishLauncher {
            StockfishLauncher::from_command("/bin/sh", vec!["-c".to_string(), script.to_string()])
        }

        const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

        #[tokio::test]
        async fn test_analyze_against_fake_engine() {
            let mut engine = sh(FAKE_ENGINE).open().await.unwrap();
            assert_eq!(engine.name(), "FakeFish 1.0");

            let limit = SearchLimit::movetime(Duration::from_millis(100));
            let info = engine.analyze(START_FEN, &limit).await.unwrap();
            assert_eq!(info.score, RawScore::Centipawns(31));
            assert_eq!(info.best_move.as_deref(), Some("e2e4"));
            assert_eq!(info.depth, 12);
            assert_eq!(info.nodes, 20480);
            assert_eq!(info.nps, 409600);

            // Same session serves a second request.
            let again = engine.analyze(START_FEN, &limit).await.unwrap();
            assert_eq!(again, info);

            engine.close().await;
            assert!(engine.process.try_wait().unwrap().is_some());

            // Idempotent, and the session refuses further work.
            engine.close().await;
            assert!(matches!(
                engine.analyze(START_FEN, &limit).await,
                Err(EngineError::Closed)
            ));
        }

        #[tokio::test]
        async fn test_missing_binary_is_spawn_error() {
            let launcher = StockfishLauncher::from_command("/nonexistent/path/to/stockfish", vec![]);
            match launcher.open().await {
                Err(EngineError::Spawn { path, .. }) => {
                    assert_eq!(path, "/nonexistent/path/to/stockfish");
                }
                Err(other) => panic!("expected Spawn error, got {other}"),
                Ok(_) => panic!("expected Spawn error"),
            }
        }

        #[tokio::test]
        async fn test_silent_process_fails_handshake() {
            let result = sh("exit 0").open().await;
            assert!(matches!(result, Err(EngineError::Handshake(_))));
        }

        #[tokio::test]
        async fn test_chatty_engine_without_uciok_fails_handshake() {
            let script = format!(
                "i=0; while [ $i -lt {} ]; do echo 'id author nobody'; i=$((i+1)); done; exec sleep 30",
                MAX_UCI_LINES + 5
            );
            match sh(&script).open().await {
                Err(EngineError::Handshake(msg)) => assert!(msg.contains("no uciok"), "{msg}"),
                Err(other) => panic!("expected Handshake error, got {other}"),
                Ok(_) => panic!("engine without uciok was accepted"),
            }
        }

        #[tokio::test]
        async fn test_close_kills_hung_engine() {
            let mut engine = sh(HANGING_ENGINE).open().await.unwrap();
            let limit = SearchLimit::movetime(Duration::from_millis(10));

            let outcome =
                tokio::time::timeout(Duration::from_millis(200), engine.analyze(START_FEN, &limit))
                    .await;
            assert!(outcome.is_err(), "hung engine should not answer");

            engine.close().await;
            assert!(engine.process.try_wait().unwrap().is_some());
        }
    }
}
