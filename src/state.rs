use crate::services::{mime_map::MimeMap, storage_gateway::StorageGateway};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn StorageGateway>,
    pub mime: Arc<MimeMap>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn StorageGateway>, mime: MimeMap) -> Self {
        Self {
            gateway,
            mime: Arc::new(mime),
        }
    }
}
