pub mod image_handlers;
pub mod response;
