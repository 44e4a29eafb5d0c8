//! Mailcast Common - Shared types and configuration
//!
//! This crate provides the configuration model, the shared error type
//! and identifier aliases used across all Mailcast components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
