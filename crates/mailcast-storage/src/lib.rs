//! Mailcast Storage - Campaign and subscriber persistence
//!
//! This crate provides the Postgres-backed persistence layer used by the
//! delivery core: campaign status transitions, content updates and the
//! counters read by the rate estimator.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
