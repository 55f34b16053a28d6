//! TUI widgets for sqlpipe.

pub mod header;
pub mod spinner;
