pub mod api;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod storage;
pub mod worker;
