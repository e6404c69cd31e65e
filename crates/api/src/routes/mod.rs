//! HTTP route handlers.

pub mod courier;
pub mod orders;
pub mod system;
pub mod vendor;
pub mod webhooks;
