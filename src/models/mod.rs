//! Data models for the relay.
//!
//! A notification decodes into a [`notification::NotificationBatch`]; each of
//! its references is resolved into a source/destination address pair right
//! before it is copied.

pub mod address;
pub mod notification;
