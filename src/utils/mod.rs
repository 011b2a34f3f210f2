//! Utilities
//!
//! Common utilities used throughout the host.

pub mod config;
pub mod error;
