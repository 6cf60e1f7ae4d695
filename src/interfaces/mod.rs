//! Outer surfaces: the request dispatcher and the file formats the CLI
//! reads and writes.

pub mod api;
pub mod csv;
pub mod jsonl;
