//! src/services/disk_bucket.rs
//!
//! DiskBucket: the storage gateway used in production. Object metadata lives
//! in SQLite and payloads live on local disk under
//! `base_path/{bucket}/{shard}/{uuid}`.
//!
//! Every write lands in a fresh payload file and only becomes visible once
//! its metadata row points at it. Writes and deletes of the same name are
//! serialized, so the row and the file it names always agree.

use crate::{
    models::object::{ObjectDescriptor, ObjectRecord},
    services::storage_gateway::{ByteStream, StorageError, StorageGateway, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_NAME_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// How many times a read follows a row to a newer payload before giving up.
const LOAD_ATTEMPTS: usize = 4;

/// A single bucket stored on local disk with SQLite metadata.
///
/// Cloning is cheap; clones share the same pool and name locks.
#[derive(Clone, Debug)]
pub struct DiskBucket {
    bucket: String,
    db: SqlitePool,
    base_path: PathBuf,
    locks: Arc<NameLocks>,
}

impl DiskBucket {
    /// Open (creating if needed) the bucket `bucket` under `storage_dir`, with
    /// metadata in the SQLite database at `database_url`.
    pub async fn open(
        bucket: &str,
        storage_dir: impl Into<PathBuf>,
        database_url: &str,
    ) -> StorageResult<Self> {
        ensure_bucket_name_safe(bucket)?;

        let base_path = storage_dir.into();
        fs::create_dir_all(base_path.join(bucket)).await?;

        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        apply_schema(&db).await?;

        tracing::info!(
            "Opened bucket `{}` at {} (metadata: {})",
            bucket,
            base_path.display(),
            database_url
        );

        Ok(Self {
            bucket: bucket.to_string(),
            db,
            base_path,
            locks: Arc::default(),
        })
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// One shard level from MD5(bucket/name), as lowercase hex (00–ff).
    fn object_shard(&self, name: &str) -> String {
        let digest = md5::compute(format!("{}/{}", self.bucket, name));
        format!("{:02x}", digest[0])
    }

    /// A payload path no other write will ever use, relative to the bucket root.
    fn fresh_payload_path(&self, name: &str) -> String {
        format!("{}/{}", self.object_shard(name), Uuid::new_v4().simple())
    }

    async fn fetch_record(&self, name: &str) -> StorageResult<Option<ObjectRecord>> {
        let record = sqlx::query_as::<_, ObjectRecord>(
            "SELECT name, content_type, size_bytes, etag, payload_path, updated_at
             FROM objects WHERE bucket = ? AND name = ?",
        )
        .bind(&self.bucket)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    /// Load the payload for a metadata record.
    ///
    /// A concurrent overwrite may retire the file between reading the row and
    /// opening the file; the row is then re-read and followed to the newer
    /// payload. `None` means the object was deleted in the meantime.
    async fn load(&self, mut record: ObjectRecord) -> StorageResult<Option<ObjectDescriptor>> {
        for _ in 0..LOAD_ATTEMPTS {
            let err = match fs::read(self.bucket_root().join(&record.payload_path)).await {
                Ok(bytes) => {
                    return Ok(Some(ObjectDescriptor::from_record(record, Bytes::from(bytes))));
                }
                Err(err) => err,
            };
            if err.kind() != ErrorKind::NotFound {
                return Err(StorageError::Io(err));
            }
            let current = self.fetch_record(&record.name).await?;
            match current {
                None => return Ok(None),
                Some(current) if current.payload_path != record.payload_path => {
                    record = current;
                }
                Some(_) => break,
            }
        }
        Err(StorageError::MissingPayload(record.name))
    }

    /// Upsert the row for `name`, returning the payload path it replaced.
    /// Callers hold the name lock.
    async fn swap_row(
        &self,
        name: &str,
        content_type: Option<&str>,
        size_bytes: i64,
        etag: &str,
        payload_path: &str,
    ) -> StorageResult<Option<String>> {
        let previous = sqlx::query_scalar::<_, String>(
            "SELECT payload_path FROM objects WHERE bucket = ? AND name = ?",
        )
        .bind(&self.bucket)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO objects
                (bucket, name, content_type, size_bytes, etag, payload_path, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, name) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                payload_path = excluded.payload_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.bucket)
        .bind(name)
        .bind(content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind(payload_path)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(previous)
    }

    /// Remove a payload file no row refers to any more.
    async fn retire_payload(&self, payload_path: &str) {
        let path = self.bucket_root().join(payload_path);
        match fs::remove_file(&path).await {
            Ok(()) => debug!("removed payload {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("failed to remove payload {}: {}", path.display(), err),
        }
    }
}

#[async_trait]
impl StorageGateway for DiskBucket {
    async fn list(&self) -> StorageResult<Vec<ObjectDescriptor>> {
        let records = sqlx::query_as::<_, ObjectRecord>(
            "SELECT name, content_type, size_bytes, etag, payload_path, updated_at
             FROM objects WHERE bucket = ? ORDER BY name ASC",
        )
        .bind(&self.bucket)
        .fetch_all(&self.db)
        .await?;

        debug!("listing {} objects in `{}`", records.len(), self.bucket);

        let mut descriptors = Vec::with_capacity(records.len());
        for record in records {
            descriptors.extend(self.load(record).await?);
        }
        Ok(descriptors)
    }

    async fn read(&self, id: &str) -> StorageResult<Vec<ObjectDescriptor>> {
        ensure_name_safe(id)?;
        let Some(record) = self.fetch_record(id).await? else {
            debug!("object `{}` not found in `{}`", id, self.bucket);
            return Ok(Vec::new());
        };
        Ok(self.load(record).await?.into_iter().collect())
    }

    /// Stream the payload into a fresh file, then point the metadata row at
    /// it and retire whatever file the row pointed at before.
    async fn create(
        &self,
        name: &str,
        content_type: Option<&str>,
        content: ByteStream,
    ) -> StorageResult<()> {
        ensure_name_safe(name)?;

        let payload_path = self.fresh_payload_path(name);
        let file_path = self.bucket_root().join(&payload_path);
        let (size_bytes, etag) = match write_payload(&file_path, content).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(StorageError::Io(err));
            }
        };

        let replaced = {
            let _guard = self.locks.lock(name).await;
            match self
                .swap_row(name, content_type, size_bytes, &etag, &payload_path)
                .await
            {
                Ok(replaced) => replaced,
                Err(err) => {
                    let _ = fs::remove_file(&file_path).await;
                    return Err(err);
                }
            }
        };
        if let Some(old) = replaced {
            self.retire_payload(&old).await;
        }

        debug!("stored `{}` ({} bytes, etag {}) at {}", name, size_bytes, etag, payload_path);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        ensure_name_safe(id)?;

        let removed = {
            let _guard = self.locks.lock(id).await;
            sqlx::query_scalar::<_, String>(
                "DELETE FROM objects WHERE bucket = ? AND name = ? RETURNING payload_path",
            )
            .bind(&self.bucket)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
        };

        match removed {
            Some(payload_path) => self.retire_payload(&payload_path).await,
            None => debug!("delete of absent object `{}` in `{}`", id, self.bucket),
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.db.close().await;
        tracing::info!("Closed bucket `{}`", self.bucket);
        Ok(())
    }
}

/// Drain `content` into a new file at `path`, returning its size and hex MD5.
/// The file is synced before returning.
async fn write_payload(path: &Path, mut content: ByteStream) -> io::Result<(i64, String)> {
    if let Some(shard) = path.parent() {
        fs::create_dir_all(shard).await?;
    }
    let mut file = File::create_new(path).await?;
    let mut digest = Context::new();
    let mut size_bytes = 0i64;

    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
        size_bytes += chunk.len() as i64;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

/// Per-name async locks. An entry lives only while someone holds or awaits it.
#[derive(Debug, Default)]
struct NameLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
    _held: OwnedMutexGuard<()>,
}

impl NameLocks {
    async fn lock(&self, name: &str) -> NameGuard<'_> {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone();
        NameGuard {
            locks: self,
            name: name.to_string(),
            _held: entry.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        let mut entries = self.locks.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held by this guard.
        if entries
            .get(&self.name)
            .is_some_and(|entry| Arc::strong_count(entry) <= 2)
        {
            entries.remove(&self.name);
        }
    }
}

async fn apply_schema(db: &SqlitePool) -> StorageResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for stmt in statements {
        debug!("Executing schema SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

/// Rejects names that could escape the bucket directory: empty, overlong,
/// absolute, containing `..`, backslashes or control characters.
fn ensure_name_safe(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name.len() > MAX_OBJECT_NAME_LEN
        || name.starts_with('/')
        || name.contains("..")
        || name.bytes().any(|b| b.is_ascii_control() || b == b'\\');
    if invalid {
        return Err(StorageError::InvalidObjectName(name.to_string()));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// S3-like rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return reject("must be between 3 and 63 characters");
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return reject("must start and end with a lowercase letter or digit");
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return reject("cannot contain consecutive dots or dot-hyphen combinations");
    }

    if is_ipv4_like(name) {
        return reject("must not be formatted like an IP address");
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
