//! sqlpipe - PostgreSQL execution plans rewritten as pipe syntax.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod loader;
pub mod logging;
pub mod pipe;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod safety;
pub mod shape;
pub mod tui;
