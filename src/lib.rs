pub mod auth;
pub mod config;
pub mod engine;
pub mod http;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod pricing;
pub mod reaper;
pub mod wal;
