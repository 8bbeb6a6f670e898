//! SQS client wrapper for the evaluate-move queue

use std::sync::Arc;

use aws_sdk_sqs::Client;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::EvalError;

/// Messages per receive call; SQS caps this at 10
pub const RECEIVE_BATCH: i32 = 10;

/// Long-poll wait per receive call
const WAIT_TIME_SECS: i32 = 20;

#[derive(Debug, Clone)]
pub struct SqsMessage {
    /// JSON evaluate-move request
    pub body: String,
    pub receipt_handle: String,
}

#[derive(Clone)]
pub struct SqsClient {
    client: Client,
    queue_url: String,
    visibility_timeout: i32,
}

impl SqsClient {
    pub async fn new(config: &WorkerConfig) -> Result<Self, EvalError> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = match &config.sqs_endpoint_url {
            Some(endpoint) => {
                let sqs_config = aws_sdk_sqs::config::Builder::from(&aws_config)
                    .endpoint_url(endpoint)
                    .build();
                Client::from_conf(sqs_config)
            }
            None => Client::new(&aws_config),
        };

        Ok(Self {
            client,
            queue_url: config.sqs_queue_url.clone(),
            visibility_timeout: i32::try_from(config.visibility_timeout_secs).map_err(|_| {
                EvalError::Config(format!(
                    "VISIBILITY_TIMEOUT_SECS out of range: {}",
                    config.visibility_timeout_secs
                ))
            })?,
        })
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Long-poll for up to `max` messages.
    pub async fn receive_messages(&self, max: usize) -> Result<Vec<SqsMessage>, EvalError> {
        let max = i32::try_from(max).unwrap_or(RECEIVE_BATCH).clamp(1, RECEIVE_BATCH);
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max)
            .wait_time_seconds(WAIT_TIME_SECS)
            .visibility_timeout(self.visibility_timeout)
            .send()
            .await
            .map_err(|e| EvalError::Sqs(format!("Failed to receive messages: {e}")))?;

        let messages: Vec<SqsMessage> = response
            .messages()
            .iter()
            .filter_map(|msg| {
                Some(SqsMessage {
                    body: msg.body()?.to_string(),
                    receipt_handle: msg.receipt_handle()?.to_string(),
                })
            })
            .collect();

        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    pub async fn delete_message(&self, receipt_handle: &str) -> Result<(), EvalError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| EvalError::Sqs(format!("Failed to delete message: {e}")))?;

        debug!("Deleted message");
        Ok(())
    }
}

/// Wait for one free evaluation slot, then take any others that are free,
/// up to `max`. Receive at most one message per returned permit.
///
/// Must be the only place permits are taken, so the extra ones cannot be
/// lost to another acquirer between receive and spawn.
pub async fn reserve_slots(
    semaphore: &Arc<Semaphore>,
    max: usize,
) -> Result<Vec<OwnedSemaphorePermit>, AcquireError> {
    let mut slots = vec![semaphore.clone().acquire_owned().await?];
    while slots.len() < max {
        match semaphore.clone().try_acquire_owned() {
            Ok(permit) => slots.push(permit),
            Err(_) => break,
        }
    }
    Ok(slots)
}
