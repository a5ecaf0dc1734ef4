//! K-mer-based read filtering and trimming engine.

pub mod cli;
pub mod engine;
pub mod error;
pub mod logging;
