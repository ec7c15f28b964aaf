//! Per-notification handler: resolves addresses for every referenced object
//! and copies them one after another, stopping at the first failure.

use crate::{
    config::RelayConfig,
    errors::RelayResult,
    models::{
        address::{DestinationAddress, SourceAddress},
        notification::{NotificationBatch, ObjectReference},
    },
    services::{
        key_mapper,
        queue_consumer::BatchHandler,
        transfer_service::ObjectTransfer,
    },
};
use std::sync::Arc;

pub struct TransferOrchestrator<T> {
    transferer: T,
    config: Arc<RelayConfig>,
}

impl<T: ObjectTransfer> TransferOrchestrator<T> {
    pub fn new(transferer: T, config: Arc<RelayConfig>) -> Self {
        Self { transferer, config }
    }

    fn source_address(&self, batch: &NotificationBatch, object: &ObjectReference) -> SourceAddress {
        SourceAddress {
            region: self.config.source_region.clone(),
            bucket: batch.bucket.clone(),
            key: object.path.clone(),
            credentials: self.config.source_credentials.clone(),
        }
    }

    fn destination_address(
        &self,
        batch: &NotificationBatch,
        object: &ObjectReference,
    ) -> DestinationAddress {
        DestinationAddress {
            region: self.config.dest_region.clone(),
            bucket: self.config.dest_bucket.clone(),
            key: key_mapper::destination_key(batch.timestamp, &object.path, &self.config.dest_prefix),
        }
    }
}

impl<T: ObjectTransfer> BatchHandler for TransferOrchestrator<T> {
    #[tracing::instrument(skip_all, fields(batch_id = %batch.id, bucket = %batch.bucket))]
    async fn handle(&self, batch: &NotificationBatch) -> RelayResult<()> {
        if batch.is_empty() {
            tracing::info!("notification references no files");
            return Ok(());
        }
        for object in &batch.files {
            let src = self.source_address(batch, object);
            let dst = self.destination_address(batch, object);
            tracing::info!(
                src = %src.key,
                dst = %dst.key,
                size = object.size,
                checksum = %object.checksum,
                "forwarding"
            );

            match self.transferer.transfer(&src, &dst).await {
                Ok(copied) => tracing::debug!(bytes = copied, "forwarded"),
                Err(err) => {
                    tracing::warn!("failed to forward: {}", err);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::RelayError,
        models::address::StaticCredentials,
        services::transfer_service::{TransferError, TransferResult},
    };
    use std::{sync::Mutex, time::Duration};

    /// Records every attempted copy and fails on a chosen source key.
    #[derive(Default)]
    struct RecordingTransferer {
        attempts: Mutex<Vec<(SourceAddress, DestinationAddress)>>,
        fail_key: Option<&'static str>,
    }

    impl ObjectTransfer for RecordingTransferer {
        async fn transfer(
            &self,
            src: &SourceAddress,
            dst: &DestinationAddress,
        ) -> TransferResult<u64> {
            self.attempts.lock().unwrap().push((src.clone(), dst.clone()));
            if self.fail_key == Some(src.key.as_str()) {
                return Err(TransferError::Timeout {
                    bucket: dst.bucket.clone(),
                    key: dst.key.clone(),
                    timeout: Duration::from_secs(1),
                });
            }
            Ok(1)
        }
    }

    fn config() -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            queue_url: "https://sqs.us-west-1.amazonaws.com/1/q".into(),
            source_region: "us-west-1".into(),
            source_credentials: StaticCredentials::from_parts("AKIA", "secret"),
            dest_bucket: "archive".into(),
            dest_prefix: "logs/".into(),
            dest_region: "asia-northeast1".into(),
            write_timeout: Duration::from_secs(3600),
        })
    }

    fn batch(paths: &[&str]) -> NotificationBatch {
        NotificationBatch {
            id: "cid-1".into(),
            timestamp: 1_492_726_639_137,
            file_count: paths.len() as u64,
            total_size: 0,
            bucket: "source-bucket".into(),
            path_prefix: String::new(),
            files: paths
                .iter()
                .map(|p| ObjectReference {
                    path: p.to_string(),
                    size: 1,
                    checksum: String::new(),
                })
                .collect(),
        }
    }

    fn attempted_keys(orchestrator: &TransferOrchestrator<RecordingTransferer>) -> Vec<String> {
        orchestrator
            .transferer
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(src, _)| src.key.clone())
            .collect()
    }

    #[tokio::test]
    async fn resolves_addresses_for_every_object_in_order() {
        let orchestrator = TransferOrchestrator::new(RecordingTransferer::default(), config());

        orchestrator.handle(&batch(&["a/b.log", "c.log"])).await.unwrap();

        let attempts = orchestrator.transferer.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        let (src, dst) = &attempts[0];
        assert_eq!(
            src,
            &SourceAddress {
                region: "us-west-1".into(),
                bucket: "source-bucket".into(),
                key: "a/b.log".into(),
                credentials: StaticCredentials::from_parts("AKIA", "secret"),
            }
        );
        assert_eq!(
            dst,
            &DestinationAddress {
                region: "asia-northeast1".into(),
                bucket: "archive".into(),
                key: "logs/2017/04/20/22/a/b.log".into(),
            }
        );
        assert_eq!(attempts[1].1.key, "logs/2017/04/20/22/c.log");
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let transferer = RecordingTransferer {
            fail_key: Some("2"),
            ..Default::default()
        };
        let orchestrator = TransferOrchestrator::new(transferer, config());

        let err = orchestrator
            .handle(&batch(&["1", "2", "3", "4"]))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Transfer(TransferError::Timeout { .. })));
        assert_eq!(attempted_keys(&orchestrator), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_transfer_calls() {
        let orchestrator = TransferOrchestrator::new(RecordingTransferer::default(), config());

        orchestrator.handle(&batch(&[])).await.unwrap();

        assert!(attempted_keys(&orchestrator).is_empty());
    }
}
