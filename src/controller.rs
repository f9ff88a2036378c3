pub mod feeds;
pub mod webhooks;
