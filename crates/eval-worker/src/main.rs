//! Move evaluation worker
//!
//! Consumes evaluate-move requests from SQS and stores each evaluation in
//! Postgres. With `--fen-before`/`--fen-after` it evaluates one move and
//! prints the result instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chess_core::PlayerColor;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use eval_worker::config::{EngineConfig, WorkerConfig};
use eval_worker::db::MoveStore;
use eval_worker::handler::{RequestHandler, StdoutSink};
use eval_worker::payload::EvaluateMoveRequest;
use eval_worker::sqs::{reserve_slots, SqsClient, SqsMessage, RECEIVE_BATCH};
use eval_worker::stockfish::StockfishLauncher;

type QueueHandler = RequestHandler<StockfishLauncher, MoveStore>;

/// Back-off after a failed receive
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One-shot evaluation requested on the command line
struct CliRequest {
    fen_before: String,
    fen_after: String,
    player: Option<PlayerColor>,
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Parse `--fen-before X --fen-after Y [--player white|black]`.
/// Returns `None` when neither FEN flag is given.
fn parse_cli_request() -> anyhow::Result<Option<CliRequest>> {
    let args: Vec<String> = std::env::args().collect();
    let fen_before = flag_value(&args, "--fen-before");
    let fen_after = flag_value(&args, "--fen-after");

    let (fen_before, fen_after) = match (fen_before, fen_after) {
        (None, None) => return Ok(None),
        (Some(before), Some(after)) => (before, after),
        _ => bail!("--fen-before and --fen-after must be given together"),
    };
    let player = flag_value(&args, "--player")
        .map(|p| p.parse::<PlayerColor>())
        .transpose()?;

    Ok(Some(CliRequest {
        fen_before,
        fen_after,
        player,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    if let Some(cli) = parse_cli_request()? {
        return evaluate_once(cli).await;
    }

    run_worker().await
}

async fn evaluate_once(cli: CliRequest) -> anyhow::Result<()> {
    let engine = EngineConfig::from_env()?;
    info!(stockfish_path = %engine.path.display(), "Evaluating single move");

    let handler = RequestHandler::new(
        StockfishLauncher::new(&engine),
        StdoutSink,
        engine.limit.clone(),
        engine.hard_timeout,
    );
    let request = EvaluateMoveRequest {
        fen_before: cli.fen_before,
        fen_after: cli.fen_after,
        game_id: "cli".into(),
        move_id: "cli".into(),
        player: cli.player,
        source: None,
    };
    handler.handle(&request).await?;
    Ok(())
}

async fn run_worker() -> anyhow::Result<()> {
    let config = WorkerConfig::load()?;
    info!(
        stockfish_path = %config.engine.path.display(),
        movetime_ms = config.engine.limit.movetime.as_millis() as u64,
        depth = ?config.engine.limit.depth,
        max_concurrent = config.max_concurrent,
        "Worker config loaded"
    );

    let pool_size = u32::try_from(config.max_concurrent + 2).unwrap_or(u32::MAX);
    let pool = PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;
    info!(pool_size, "Database connection pool established");

    let sqs = SqsClient::new(&config).await?;
    info!(queue_url = %sqs.queue_url(), "SQS client ready");

    let handler: Arc<QueueHandler> = Arc::new(RequestHandler::new(
        StockfishLauncher::new(&config.engine),
        MoveStore::new(pool),
        config.engine.limit.clone(),
        config.engine.hard_timeout,
    ));

    let permits = u32::try_from(config.max_concurrent).context("MAX_CONCURRENT_EVALUATIONS too large")?;
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
    let mut empty_receives = 0u32;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Starting main loop");

    loop {
        // Take a slot before taking a message, so no message waits out its
        // visibility timeout behind busy evaluations.
        let slots = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, waiting for in-flight evaluations...");
                break;
            }
            slots = reserve_slots(&semaphore, RECEIVE_BATCH as usize) => slots?,
        };

        let result = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, waiting for in-flight evaluations...");
                break;
            }
            result = sqs.receive_messages(slots.len()) => result,
        };
        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to receive messages");
                drop(slots);
                tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                continue;
            }
        };

        if messages.is_empty() {
            empty_receives += 1;
            if config.max_empty_receives > 0 && empty_receives >= config.max_empty_receives {
                info!(polls = empty_receives, "Queue drained, exiting");
                break;
            }
            continue;
        }
        empty_receives = 0;

        // Slots left over after the zip are released here
        for (msg, permit) in messages.into_iter().zip(slots) {
            let handler = handler.clone();
            let sqs = sqs.clone();

            tokio::spawn(async move {
                let _permit = permit;
                process_message(&handler, &sqs, msg).await;
            });
        }
    }

    // Holding every permit means no evaluation is still running
    let _all = semaphore.acquire_many(permits).await?;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Evaluate one message and decide whether it leaves the queue.
async fn process_message(handler: &QueueHandler, sqs: &SqsClient, msg: SqsMessage) {
    let delete = match handler.handle_message(&msg.body).await {
        Ok(output) => {
            info!(
                game_id = %output.game_id,
                move_id = %output.move_id,
                move_played = %output.move_played,
                evaluation = output.evaluation,
                is_blunder = output.is_blunder,
                "Evaluation complete"
            );
            true
        }
        Err(e) if !e.is_retryable() => {
            warn!(error = %e, body = %msg.body, "Dropping message that cannot succeed");
            true
        }
        Err(e) => {
            // Left on the queue; redelivered after the visibility timeout
            error!(error = %e, "Evaluation failed");
            false
        }
    };

    if delete {
        if let Err(e) = sqs.delete_message(&msg.receipt_handle).await {
            error!(error = %e, "Failed to delete message");
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C will stop the worker");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
}
