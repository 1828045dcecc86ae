//! Represents an object (file) stored in the backing bucket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Metadata row for a stored object, as persisted by the disk-backed bucket.
///
/// The row stores metadata only; payload bytes live on disk.
#[derive(Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Object name (unique within its bucket).
    pub name: String,

    /// Content type (MIME type) recorded at upload time.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Payload file, relative to the bucket directory. Every write gets a
    /// fresh path.
    pub payload_path: String,

    /// Timestamp of the last write.
    pub updated_at: DateTime<Utc>,
}

/// A stored file as returned by a storage gateway: metadata plus payload.
#[derive(Clone, Debug)]
pub struct ObjectDescriptor {
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: String,
    pub updated_at: DateTime<Utc>,
    pub content: Bytes,
}

impl ObjectDescriptor {
    /// Attach payload bytes to a metadata record.
    pub fn from_record(record: ObjectRecord, content: Bytes) -> Self {
        Self {
            name: record.name,
            content_type: record.content_type,
            size_bytes: record.size_bytes,
            etag: record.etag,
            updated_at: record.updated_at,
            content,
        }
    }
}
