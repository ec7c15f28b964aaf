//! src/services/transfer_service.rs
//!
//! Streams a single object from the source store (S3) into the destination
//! store (GCS). Bytes flow through a bounded multipart writer, so memory use
//! does not depend on the object size.

use crate::models::address::{DestinationAddress, SourceAddress};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use object_store::{
    MultipartUpload, ObjectStore, PutPayloadMut, aws::AmazonS3Builder,
    gcp::GoogleCloudStorageBuilder, path::Path as ObjectPath,
};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    task::JoinSet,
    time::{Instant, timeout_at},
};

/// Upper bound for writing one object, matching a generous GCS writer deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3600);
/// Size of each multipart chunk sent to the destination.
pub const PART_SIZE: usize = 8 * 1024 * 1024;
/// Parts allowed in flight for one object before reading more from the source.
const MAX_IN_FLIGHT_PARTS: usize = 2;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to open source s3://{bucket}/{key}: {source}")]
    SourceOpen {
        bucket: String,
        key: String,
        source: object_store::Error,
    },
    #[error("failed reading source s3://{bucket}/{key}: {source}")]
    SourceRead {
        bucket: String,
        key: String,
        source: object_store::Error,
    },
    #[error("failed to open destination gs://{bucket}/{key}: {source}")]
    DestinationOpen {
        bucket: String,
        key: String,
        source: object_store::Error,
    },
    #[error("failed writing destination gs://{bucket}/{key}: {source}")]
    DestinationWrite {
        bucket: String,
        key: String,
        source: object_store::Error,
    },
    #[error("failed to commit destination gs://{bucket}/{key}: {source}")]
    DestinationCommit {
        bucket: String,
        key: String,
        source: object_store::Error,
    },
    #[error("writing gs://{bucket}/{key} did not finish within {timeout:?}")]
    Timeout {
        bucket: String,
        key: String,
        timeout: Duration,
    },
}

impl TransferError {
    fn source_open(src: &SourceAddress, source: object_store::Error) -> Self {
        Self::SourceOpen {
            bucket: src.bucket.clone(),
            key: src.key.clone(),
            source,
        }
    }

    fn source_read(src: &SourceAddress, source: object_store::Error) -> Self {
        Self::SourceRead {
            bucket: src.bucket.clone(),
            key: src.key.clone(),
            source,
        }
    }

    fn destination_open(dst: &DestinationAddress, source: object_store::Error) -> Self {
        Self::DestinationOpen {
            bucket: dst.bucket.clone(),
            key: dst.key.clone(),
            source,
        }
    }

    fn destination_write(dst: &DestinationAddress, source: object_store::Error) -> Self {
        Self::DestinationWrite {
            bucket: dst.bucket.clone(),
            key: dst.key.clone(),
            source,
        }
    }

    fn destination_commit(dst: &DestinationAddress, source: object_store::Error) -> Self {
        Self::DestinationCommit {
            bucket: dst.bucket.clone(),
            key: dst.key.clone(),
            source,
        }
    }

    fn timeout(dst: &DestinationAddress, timeout: Duration) -> Self {
        Self::Timeout {
            bucket: dst.bucket.clone(),
            key: dst.key.clone(),
            timeout,
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Builds store handles for a resolved address.
///
/// Implementations may build a fresh client per call; addresses are never cached.
pub trait StoreProvider: Send + Sync {
    fn source_store(&self, src: &SourceAddress) -> object_store::Result<Arc<dyn ObjectStore>>;

    fn destination_store(
        &self,
        dst: &DestinationAddress,
    ) -> object_store::Result<Arc<dyn ObjectStore>>;
}

/// S3 source, GCS destination.
#[derive(Clone, Debug, Default)]
pub struct CloudStores;

impl StoreProvider for CloudStores {
    fn source_store(&self, src: &SourceAddress) -> object_store::Result<Arc<dyn ObjectStore>> {
        let builder = match &src.credentials {
            Some(creds) => AmazonS3Builder::new()
                .with_access_key_id(&creds.key_id)
                .with_secret_access_key(&creds.secret),
            None => {
                tracing::warn!("AWS key and secret are not set, using ambient identity");
                AmazonS3Builder::from_env()
            }
        };
        let store = builder
            .with_region(&src.region)
            .with_bucket_name(&src.bucket)
            .build()?;
        Ok(Arc::new(store))
    }

    fn destination_store(
        &self,
        dst: &DestinationAddress,
    ) -> object_store::Result<Arc<dyn ObjectStore>> {
        tracing::debug!(region = %dst.region, bucket = %dst.bucket, "opening destination store");
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&dst.bucket)
            .build()?;
        Ok(Arc::new(store))
    }
}

/// Copies one object. Returns the number of bytes moved.
pub trait ObjectTransfer: Send + Sync {
    fn transfer(
        &self,
        src: &SourceAddress,
        dst: &DestinationAddress,
    ) -> impl Future<Output = TransferResult<u64>> + Send;
}

/// Single-attempt streaming transferer.
#[derive(Clone, Debug)]
pub struct StreamTransferer<P> {
    stores: P,
    write_timeout: Duration,
}

impl<P: StoreProvider> StreamTransferer<P> {
    pub fn new(stores: P, write_timeout: Duration) -> Self {
        Self {
            stores,
            write_timeout,
        }
    }
}

impl<P: StoreProvider> ObjectTransfer for StreamTransferer<P> {
    #[tracing::instrument(skip_all, fields(src = %src.key, dst = %dst.key))]
    async fn transfer(&self, src: &SourceAddress, dst: &DestinationAddress) -> TransferResult<u64> {
        let source = self
            .stores
            .source_store(src)
            .map_err(|err| TransferError::source_open(src, err))?;
        let src_path = object_path(&src.key).map_err(|err| TransferError::source_open(src, err))?;
        let reader = source
            .get(&src_path)
            .await
            .map_err(|err| TransferError::source_open(src, err))?;
        tracing::debug!(size = reader.meta.size, "opened source object");

        let deadline = Instant::now() + self.write_timeout;
        let destination = self
            .stores
            .destination_store(dst)
            .map_err(|err| TransferError::destination_open(dst, err))?;
        let dst_path =
            object_path(&dst.key).map_err(|err| TransferError::destination_open(dst, err))?;
        let upload = match timeout_at(deadline, destination.put_multipart(&dst_path)).await {
            Ok(upload) => upload.map_err(|err| TransferError::destination_open(dst, err))?,
            Err(_) => return Err(TransferError::timeout(dst, self.write_timeout)),
        };

        copy_stream(
            reader.into_stream(),
            upload,
            src,
            dst,
            deadline,
            self.write_timeout,
        )
        .await
    }
}

/// Keys are used as-is. A key that object_store would store under a different
/// name (leading or trailing `/`, empty or relative segments) is rejected.
fn object_path(key: &str) -> object_store::Result<ObjectPath> {
    let path = ObjectPath::parse(key)?;
    if path.as_ref() != key {
        return Err(object_store::path::Error::EmptySegment {
            path: key.to_string(),
        }
        .into());
    }
    Ok(path)
}

/// Pump `stream` into `upload` and commit it, all before `deadline`.
///
/// Any failure, including a failed or stalled part and an expired deadline
/// during the commit, aborts the pending upload so nothing is committed at the
/// destination key by this attempt.
async fn copy_stream<S>(
    stream: S,
    upload: Box<dyn MultipartUpload>,
    src: &SourceAddress,
    dst: &DestinationAddress,
    deadline: Instant,
    write_timeout: Duration,
) -> TransferResult<u64>
where
    S: Stream<Item = object_store::Result<Bytes>> + Send,
{
    let mut writer = PartWriter::new(upload);

    let outcome = timeout_at(deadline, writer.copy(stream, src, dst)).await;
    match outcome {
        Ok(Ok(copied)) => Ok(copied),
        Ok(Err(err)) => {
            writer.abort(dst).await;
            Err(err)
        }
        Err(_) => {
            writer.abort(dst).await;
            Err(TransferError::timeout(dst, write_timeout))
        }
    }
}

/// Cuts the source stream into `PART_SIZE` parts and keeps at most
/// `MAX_IN_FLIGHT_PARTS` of them uploading at once.
///
/// Owns the upload until the end so it can still be aborted after the commit
/// was attempted.
struct PartWriter {
    upload: Box<dyn MultipartUpload>,
    buffer: PutPayloadMut,
    in_flight: JoinSet<object_store::Result<()>>,
}

impl PartWriter {
    fn new(upload: Box<dyn MultipartUpload>) -> Self {
        Self {
            upload,
            buffer: PutPayloadMut::new(),
            in_flight: JoinSet::new(),
        }
    }

    async fn copy<S>(
        &mut self,
        stream: S,
        src: &SourceAddress,
        dst: &DestinationAddress,
    ) -> TransferResult<u64>
    where
        S: Stream<Item = object_store::Result<Bytes>>,
    {
        let mut copied: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = chunk_res.map_err(|err| TransferError::source_read(src, err))?;
            self.wait_for_capacity(MAX_IN_FLIGHT_PARTS)
                .await
                .map_err(|err| TransferError::destination_write(dst, err))?;
            copied += chunk.len() as u64;
            self.write(chunk);
        }

        if self.buffer.content_length() > 0 {
            self.put_part();
        }
        self.wait_for_capacity(0)
            .await
            .map_err(|err| TransferError::destination_write(dst, err))?;
        self.upload
            .complete()
            .await
            .map_err(|err| TransferError::destination_commit(dst, err))?;
        Ok(copied)
    }

    fn write(&mut self, mut chunk: Bytes) {
        while !chunk.is_empty() {
            let room = PART_SIZE - self.buffer.content_length();
            self.buffer.push(chunk.split_to(room.min(chunk.len())));
            if self.buffer.content_length() == PART_SIZE {
                self.put_part();
            }
        }
    }

    fn put_part(&mut self) {
        let part = std::mem::replace(&mut self.buffer, PutPayloadMut::new()).freeze();
        self.in_flight.spawn(self.upload.put_part(part));
    }

    /// Wait until no more than `max` parts are still uploading.
    async fn wait_for_capacity(&mut self, max: usize) -> object_store::Result<()> {
        while self.in_flight.len() > max {
            match self.in_flight.join_next().await {
                Some(Ok(part)) => part?,
                Some(Err(err)) => {
                    return Err(object_store::Error::Generic {
                        store: "multipart",
                        source: Box::new(err),
                    });
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn abort(mut self, dst: &DestinationAddress) {
        self.in_flight.shutdown().await;
        if let Err(err) = self.upload.abort().await {
            tracing::debug!(
                "failed to abort upload to gs://{}/{}: {}",
                dst.bucket,
                dst.key,
                err
            );
        }
    }
}
