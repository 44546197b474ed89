pub mod extract;
pub mod handlers;
pub mod optimize;
pub mod scoring;
