//! In-memory storage gateway used by the handler tests.

use crate::{
    models::object::ObjectDescriptor,
    services::storage_gateway::{ByteStream, StorageError, StorageGateway, StorageResult},
};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::Utc;
use futures::StreamExt;
use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::RwLock,
};

/// Gateway operation names, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Read,
    Create,
    Delete,
}

#[derive(Default)]
pub struct MemoryBucket {
    objects: RwLock<BTreeMap<String, ObjectDescriptor>>,
    failing: RwLock<HashSet<Op>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail with a backend error.
    pub fn fail(&self, op: Op) {
        self.failing.write().unwrap().insert(op);
    }

    /// Store a descriptor as-is, bypassing `create`.
    pub fn insert_raw(&self, desc: ObjectDescriptor) {
        self.objects.write().unwrap().insert(desc.name.clone(), desc);
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.read().unwrap().keys().cloned().collect()
    }

    fn check(&self, op: Op) -> StorageResult<()> {
        if self.failing.read().unwrap().contains(&op) {
            return Err(StorageError::Io(io::Error::other(format!(
                "injected {:?} failure",
                op
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for MemoryBucket {
    async fn list(&self) -> StorageResult<Vec<ObjectDescriptor>> {
        self.check(Op::List)?;
        Ok(self.objects.read().unwrap().values().cloned().collect())
    }

    async fn read(&self, id: &str) -> StorageResult<Vec<ObjectDescriptor>> {
        self.check(Op::Read)?;
        Ok(self.objects.read().unwrap().get(id).cloned().into_iter().collect())
    }

    async fn create(
        &self,
        name: &str,
        content_type: Option<&str>,
        mut content: ByteStream,
    ) -> StorageResult<()> {
        self.check(Op::Create)?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let content = buf.freeze();

        let desc = ObjectDescriptor {
            name: name.to_string(),
            content_type: content_type.map(str::to_owned),
            size_bytes: content.len() as i64,
            etag: format!("{:x}", md5::compute(&content)),
            updated_at: Utc::now(),
            content,
        };
        self.objects.write().unwrap().insert(name.to_string(), desc);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.check(Op::Delete)?;
        self.objects.write().unwrap().remove(id);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
