//! Data models for the image gateway.
//!
//! `object` holds what the storage layer produces, `image` and `message`
//! hold what the HTTP API serializes for its consumers.

pub mod image;
pub mod message;
pub mod object;
