//! Worker configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::EvalError;
use crate::session::SearchLimit;

/// Extra time on top of the engine's own budget before an analysis is
/// considered hung
const DEFAULT_TIMEOUT_SLACK_MS: u64 = 5000;

/// Everything needed to start and drive an analysis engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the Stockfish binary
    pub path: PathBuf,

    /// Budget handed to the engine for each position
    pub limit: SearchLimit,

    /// Hard cap on a single engine call, enforced by the worker
    pub hard_timeout: Duration,

    pub threads: u32,

    pub hash_mb: u32,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EvalError> {
        let path = env::var("STOCKFISH_BIN_PATH")
            .or_else(|_| env::var("STOCKFISH_PATH"))
            .map_err(|_| EvalError::Config("STOCKFISH_BIN_PATH not set".into()))?;
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(EvalError::Config(format!(
                "Stockfish binary not found at {}",
                path.display()
            )));
        }

        let movetime_ms = parse_var("ANALYSIS_TIME_MS", 1500)?;
        let depth = match env::var("ANALYSIS_DEPTH") {
            Ok(v) => Some(v.parse().map_err(|_| {
                EvalError::Config(format!("ANALYSIS_DEPTH is not a number: {v}"))
            })?),
            Err(_) => None,
        };
        let timeout_ms = parse_var("ANALYSIS_TIMEOUT_MS", movetime_ms + DEFAULT_TIMEOUT_SLACK_MS)?;

        Ok(Self {
            path,
            limit: SearchLimit {
                movetime: Duration::from_millis(movetime_ms),
                depth,
            },
            hard_timeout: Duration::from_millis(timeout_ms),
            threads: parse_var("ENGINE_THREADS", 1)?,
            hash_mb: parse_var("ENGINE_HASH_MB", 64)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub engine: EngineConfig,

    /// Database holding the `game_moves` table
    pub database_url: String,

    /// SQS queue URL for evaluation requests
    pub sqs_queue_url: String,

    /// Custom SQS endpoint URL (for LocalStack)
    pub sqs_endpoint_url: Option<String>,

    /// Evaluations running at once; each owns one engine process
    pub max_concurrent: usize,

    /// Consecutive empty SQS receives before exiting (0 = never exit)
    pub max_empty_receives: u32,

    /// SQS visibility timeout in seconds
    pub visibility_timeout_secs: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, EvalError> {
        let engine = EngineConfig::from_env()?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| EvalError::Config("DATABASE_URL not set".into()))?;
        let sqs_queue_url = env::var("SQS_QUEUE_URL")
            .map_err(|_| EvalError::Config("SQS_QUEUE_URL not set".into()))?;

        // Custom endpoint for LocalStack
        let sqs_endpoint_url = env::var("SQS_ENDPOINT_URL").ok();
        if let Some(endpoint) = &sqs_endpoint_url {
            info!(endpoint = %endpoint, "Using custom SQS endpoint");
        }

        let max_concurrent = parse_var("MAX_CONCURRENT_EVALUATIONS", num_cpus::get())?.max(1);

        Ok(Self {
            engine,
            database_url,
            sqs_queue_url,
            sqs_endpoint_url,
            max_concurrent,
            max_empty_receives: parse_var("MAX_EMPTY_RECEIVES", 0)?,
            visibility_timeout_secs: parse_var("VISIBILITY_TIMEOUT_SECS", 60)?,
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset.
/// A set but unparsable value is an error rather than silently ignored.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, EvalError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| EvalError::Config(format!("{name} is not a valid number: {v}"))),
        Err(_) => Ok(default),
    }
}
