//! Represents one decoded queue notification and the objects it references.

use serde::Deserialize;
use thiserror::Error;

/// Raised when a notification body cannot be turned into a [`NotificationBatch`].
#[derive(Debug, Error)]
#[error("malformed notification body: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// A batch of objects announced by a single queue message.
///
/// `id` and `timestamp` are carried through untouched; only `bucket` and the
/// file paths drive the transfer.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NotificationBatch {
    /// Opaque batch identifier assigned by the producer.
    #[serde(rename = "cid", default)]
    pub id: String,

    /// Batch creation time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: u64,

    /// Number of files the producer claims to have written.
    #[serde(rename = "fileCount", default)]
    pub file_count: u64,

    /// Sum of the declared file sizes.
    #[serde(rename = "totalSize", default)]
    pub total_size: u64,

    /// Source bucket holding every referenced object.
    pub bucket: String,

    /// Common prefix of the referenced paths.
    #[serde(rename = "pathPrefix", default)]
    pub path_prefix: String,

    /// Objects to move, in the order they must be processed.
    pub files: Vec<ObjectReference>,
}

/// One source object declared in a notification.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectReference {
    /// Key of the object within the source bucket.
    pub path: String,

    /// Declared size in bytes. Not enforced.
    #[serde(default)]
    pub size: u64,

    /// Declared checksum. Not verified.
    #[serde(default)]
    pub checksum: String,
}

impl NotificationBatch {
    /// Decode a raw notification body.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "cid": "abcdefghijklmn0123456789",
        "timestamp": 1492726639137,
        "fileCount": 4,
        "totalSize": 349986220,
        "bucket": "cs-prod-cannon",
        "pathPrefix": "data/abc",
        "files": [
          {
            "path": "data/abc/part-00000.gz",
            "size": 89118480,
            "checksum": "d0f566f37295e46f28c75f71ddce9422"
          },
          {
            "path": "data/abc/part-00001.gz",
            "size": 10,
            "checksum": "00"
          }
        ]
    }"#;

    #[test]
    fn decodes_full_notification() {
        let batch = NotificationBatch::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(batch.id, "abcdefghijklmn0123456789");
        assert_eq!(batch.timestamp, 1_492_726_639_137);
        assert_eq!(batch.file_count, 4);
        assert_eq!(batch.total_size, 349_986_220);
        assert_eq!(batch.bucket, "cs-prod-cannon");
        assert_eq!(batch.path_prefix, "data/abc");
        assert_eq!(batch.files.len(), 2);
        assert_eq!(batch.files[0].path, "data/abc/part-00000.gz");
        assert_eq!(batch.files[0].size, 89_118_480);
        assert_eq!(batch.files[0].checksum, "d0f566f37295e46f28c75f71ddce9422");
        assert_eq!(batch.files[1].path, "data/abc/part-00001.gz");
    }

    #[test]
    fn ignores_unknown_fields_and_defaults_optional_ones() {
        let body = br#"{"bucket":"b","files":[{"path":"k","extra":true}],"newField":1}"#;
        let batch = NotificationBatch::decode(body).unwrap();
        assert_eq!(batch.id, "");
        assert_eq!(batch.timestamp, 0);
        assert_eq!(batch.files[0].size, 0);
        assert_eq!(batch.files[0].checksum, "");
    }

    #[test]
    fn empty_file_list_is_valid() {
        let batch = NotificationBatch::decode(br#"{"bucket":"b","files":[]}"#).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn rejects_missing_bucket() {
        assert!(NotificationBatch::decode(br#"{"files":[]}"#).is_err());
    }

    #[test]
    fn rejects_missing_files() {
        assert!(NotificationBatch::decode(br#"{"bucket":"b"}"#).is_err());
    }

    #[test]
    fn rejects_file_without_path() {
        assert!(NotificationBatch::decode(br#"{"bucket":"b","files":[{"size":1}]}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        let err = NotificationBatch::decode(b"not json").unwrap_err();
        assert!(err.to_string().starts_with("malformed notification body"));
    }
}
