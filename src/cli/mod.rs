//! Command-line surface: argument parsing and the sequence I/O black box.

pub mod io;
pub mod opts;
