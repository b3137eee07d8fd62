//! Core engine — the wait → purchase loop.

pub mod schedule;
pub mod executor;
pub mod runner;
