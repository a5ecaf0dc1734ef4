//! Typed errors at the library's public API boundary (index build, harness
//! run). Internal call sites and the CLI `main` keep using
//! `anyhow::Result` + `.context(...)`, matching the teacher's own split
//! between a typed surface and `anyhow`-wrapped plumbing.

use thiserror::Error;

/// Fatal error taxonomy per spec section 7: configuration, reference-empty,
/// I/O, and OOM are all fatal and non-recoverable. Per-read soft failures
/// are never represented here; they flow through `KeepMask` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid or conflicting configuration: {0}")]
    Configuration(String),

    #[error(
        "zero k-mers were installed from the reference set{}; a k-mer mode was requested",
        if *.tried_alternate { " (alternate set also empty)" } else { "" }
    )]
    ReferenceEmpty { tried_alternate: bool },

    #[error("I/O failure during {phase}: {source}")]
    Io {
        phase: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory building the k-mer index ({context})")]
    OutOfMemory { context: String },
}
