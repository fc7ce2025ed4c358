//! Chainwatch service: periodic health checks of Cosmos RPC and REST endpoints.

pub mod config;
pub mod database;
pub mod monitoring;
pub mod pool;
pub mod registry;
