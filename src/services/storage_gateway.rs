//! Capability interface over the backing object store.
//!
//! Handlers only ever talk to a `dyn StorageGateway`. Consistency, ordering and
//! durability are whatever the implementation provides; the contract is that
//! each call either fully succeeds or returns an error.

use crate::models::object::ObjectDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

/// Upload body handed to [`StorageGateway::create`].
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object name `{0}`")]
    InvalidObjectName(String),
    #[error("payload for object `{0}` is missing")]
    MissingPayload(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Every object currently in the bucket.
    async fn list(&self) -> StorageResult<Vec<ObjectDescriptor>>;

    /// Zero or one descriptor for `id`. An empty result means "not found".
    async fn read(&self, id: &str) -> StorageResult<Vec<ObjectDescriptor>>;

    /// Store `content` under `name`, replacing any object already there.
    async fn create(
        &self,
        name: &str,
        content_type: Option<&str>,
        content: ByteStream,
    ) -> StorageResult<()>;

    /// Remove `id`. Removing an absent object is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Release backend resources. Called once at shutdown.
    async fn close(&self) -> StorageResult<()>;
}
