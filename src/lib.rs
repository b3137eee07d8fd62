//! DAILYBUY — Scheduled daily DEX purchase agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod chain;
pub mod contract;
pub mod engine;
