pub mod disk_bucket;
#[cfg(test)]
pub mod memory_bucket;
pub mod mime_map;
pub mod storage_gateway;
