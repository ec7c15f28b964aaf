//! Trigger handler: every request runs the relay once, until the queue is
//! drained or the first error.
//!
//! The caller only gets a binary signal. `200 OK` means the queue was drained
//! without error, anything else is a `500` and the cause is in the logs.

use crate::{
    config::RelayConfig,
    errors::{AppError, RelayResult},
    services::{
        orchestrator::TransferOrchestrator,
        queue_consumer::{QueueConsumer, SqsQueue},
        transfer_service::{CloudStores, StreamTransferer},
    },
};
use axum::extract::State;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Shared, read-only state handed to every trigger.
#[derive(Clone, Debug)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// `GET /` and `POST /`
pub async fn trigger(State(state): State<RelayState>) -> Result<&'static str, AppError> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("relay_run", %run_id);

    match relay_once(state.config.clone()).instrument(span).await {
        Ok(processed) => {
            tracing::info!(%run_id, processed, "relay run finished");
            Ok("OK")
        }
        Err(err) => {
            tracing::error!(%run_id, "relay run failed: {}", err);
            Err(err.into())
        }
    }
}

/// Connect to the queue and consume it with the streaming S3 to GCS handler.
async fn relay_once(config: Arc<RelayConfig>) -> RelayResult<usize> {
    let queue = SqsQueue::connect(&config.queue_url, config.source_credentials.as_ref()).await?;
    let transferer = StreamTransferer::new(CloudStores, config.write_timeout);
    let orchestrator = TransferOrchestrator::new(transferer, config);
    QueueConsumer::new(queue).run(&orchestrator).await
}
