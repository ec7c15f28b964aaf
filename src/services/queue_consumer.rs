//! src/services/queue_consumer.rs
//!
//! Receive-process-acknowledge loop over an SQS queue.
//!
//! Exactly one notification is in flight at a time and it is deleted only
//! after its handler succeeded. Deletion is the only acknowledgment, so it must
//! never be reordered before processing or pipelined with the next receive.

use crate::{
    errors::{RelayError, RelayResult},
    models::{
        address::{QueueAddress, StaticCredentials},
        notification::NotificationBatch,
    },
};
use aws_config::BehaviorVersion;
use aws_sdk_sqs::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    types::MessageSystemAttributeName,
};
use std::future::Future;

/// Lease taken on a received message; long enough to cover slow transfers.
const VISIBILITY_TIMEOUT_SECONDS: i32 = 36_000;
/// An empty queue ends the run, so do not long-poll.
const RECEIVE_WAIT_SECONDS: i32 = 0;

/// One received notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub body: String,
    /// Required to delete this message; invalid once used.
    pub receipt_handle: Option<String>,
    /// Epoch milliseconds at which the queue accepted the message.
    pub sent_timestamp: Option<String>,
}

/// The two queue operations the consumer needs.
pub trait QueueService: Send + Sync {
    /// Receive at most one message, or `None` when the queue is empty.
    fn receive_one(&self) -> impl Future<Output = RelayResult<Option<QueueMessage>>> + Send;

    fn delete(&self, receipt_handle: &str) -> impl Future<Output = RelayResult<()>> + Send;
}

/// Processes one decoded notification.
pub trait BatchHandler: Send + Sync {
    fn handle(&self, batch: &NotificationBatch) -> impl Future<Output = RelayResult<()>> + Send;
}

/// SQS-backed [`QueueService`].
#[derive(Clone, Debug)]
pub struct SqsQueue {
    inner: aws_sdk_sqs::Client,
    address: QueueAddress,
}

impl SqsQueue {
    /// Build a client for `queue_url`, in the region encoded in the URL.
    ///
    /// Static credentials are used when given, otherwise the default AWS
    /// provider chain.
    pub async fn connect(
        queue_url: &str,
        credentials: Option<&StaticCredentials>,
    ) -> RelayResult<Self> {
        let address = QueueAddress::parse(queue_url)?;

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(address.region.clone()));
        match credentials {
            Some(creds) => {
                loader = loader.credentials_provider(Credentials::new(
                    &creds.key_id,
                    &creds.secret,
                    None,
                    None,
                    "relay-static",
                ));
            }
            None => tracing::warn!("AWS key and secret are not set, using ambient identity"),
        }
        let sdk_config = loader.load().await;

        Ok(Self {
            inner: aws_sdk_sqs::Client::new(&sdk_config),
            address,
        })
    }
}

impl QueueService for SqsQueue {
    async fn receive_one(&self) -> RelayResult<Option<QueueMessage>> {
        let output = self
            .inner
            .receive_message()
            .queue_url(&self.address.url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECONDS)
            .visibility_timeout(VISIBILITY_TIMEOUT_SECONDS)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|err| RelayError::queue("receive", DisplayErrorContext(&err)))?;

        let message = output.messages.unwrap_or_default().into_iter().next();
        Ok(message.map(|msg| {
            let sent_timestamp = msg
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
                .cloned();
            QueueMessage {
                message_id: msg.message_id,
                body: msg.body.unwrap_or_default(),
                receipt_handle: msg.receipt_handle,
                sent_timestamp,
            }
        }))
    }

    async fn delete(&self, receipt_handle: &str) -> RelayResult<()> {
        self.inner
            .delete_message()
            .queue_url(&self.address.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| RelayError::queue("delete", DisplayErrorContext(&err)))?;
        Ok(())
    }
}

/// Drives notifications from a queue through a [`BatchHandler`].
#[derive(Clone, Debug)]
pub struct QueueConsumer<Q> {
    queue: Q,
}

impl<Q: QueueService> QueueConsumer<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    /// Consume until the queue is empty or something fails.
    ///
    /// Returns the number of notifications processed and deleted. On error the
    /// current notification is left on the queue, except when the error came
    /// from deleting it.
    #[tracing::instrument(skip_all)]
    pub async fn run<H: BatchHandler>(&self, handler: &H) -> RelayResult<usize> {
        let mut processed = 0;
        loop {
            let Some(message) = self.queue.receive_one().await? else {
                tracing::info!(processed, "queue drained");
                return Ok(processed);
            };
            tracing::info!(
                message_id = ?message.message_id,
                sent_timestamp = ?message.sent_timestamp,
                "recv queue"
            );

            let receipt_handle = message
                .receipt_handle
                .as_deref()
                .ok_or_else(|| RelayError::queue("receive", "message has no receipt handle"))?;

            let batch = NotificationBatch::decode(message.body.as_bytes())?;
            tracing::debug!(
                batch_id = %batch.id,
                bucket = %batch.bucket,
                path_prefix = %batch.path_prefix,
                files = batch.files.len(),
                declared_files = batch.file_count,
                declared_size = batch.total_size,
                "decoded notification"
            );

            handler.handle(&batch).await?;

            if let Err(err) = self.queue.delete(receipt_handle).await {
                tracing::warn!(
                    batch_id = %batch.id,
                    "objects were forwarded but the message could not be deleted, it will be redelivered: {}",
                    err
                );
                return Err(err);
            }
            processed += 1;
        }
    }
}
