//! Fully resolved coordinates for a single copy, and the queue address they hang off.

use regex::Regex;
use std::{fmt, sync::LazyLock};
use thiserror::Error;

/// Recognized SQS endpoint shapes. The first capture group is the region.
static QUEUE_URL_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        // https://sqs.ap-northeast-1.amazonaws.com/211111111111/queue
        Regex::new(r"^https://sqs\.([a-z0-9\-]+)\.amazonaws\.com(?:/|$)").unwrap(),
        // https://us-west-1.queue.amazonaws.com/222222222222/queue
        Regex::new(r"^https://([a-z0-9\-]+)\.queue\.amazonaws\.com(?:/|$)").unwrap(),
    ]
});

#[derive(Debug, Error)]
#[error("unsupported SQS URL syntax: `{0}`")]
pub struct UnsupportedAddressError(pub String);

/// Key id / secret pair used instead of the ambient AWS identity.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub key_id: String,
    pub secret: String,
}

impl StaticCredentials {
    /// Returns `Some` only when both halves are present; an empty pair means
    /// "use the ambient identity".
    pub fn from_parts(key_id: &str, secret: &str) -> Option<Self> {
        if key_id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            key_id: key_id.to_string(),
            secret: secret.to_string(),
        })
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Where to read an object from (S3 side).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceAddress {
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub credentials: Option<StaticCredentials>,
}

/// Where to write an object to (GCS side).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationAddress {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

/// A queue URL whose region has been resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueAddress {
    pub url: String,
    pub region: String,
}

impl QueueAddress {
    /// Parse a queue URL, extracting the region from its host name.
    pub fn parse(url: &str) -> Result<Self, UnsupportedAddressError> {
        QUEUE_URL_PATTERNS
            .iter()
            .find_map(|pattern| pattern.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|region| Self {
                url: url.to_string(),
                region: region.as_str().to_string(),
            })
            .ok_or_else(|| UnsupportedAddressError(url.to_string()))
    }
}
