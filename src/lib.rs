//! # Wattmark - Source-Level Energy Instrumentation
//!
//! Splices measurement checkpoints into source code without changing
//! program behavior or breaking syntax.
//!
//! Wattmark provides:
//! - A per-language configuration registry (grammar facts + instrumentation policy)
//! - Tree-sitter based structural point finding (function/loop/class boundaries)
//! - Byte-exact insertion resolution with docstring/comment skipping
//! - Template-rendered checkpoint calls wired to an external runtime
//! - A rewriter that applies all edits in one pass, byte-identical outside them

pub mod config;
pub mod point;
pub mod finder;
pub mod resolve;
pub mod render;
pub mod rewrite;
pub mod engine;
pub mod batch;
pub mod ui;

// Re-exports for convenient access
pub use config::{LanguageConfig, Registry};
pub use engine::Engine;
pub use point::{AnalysisResult, InsertionMode, InstrumentationPoint, PointType};
pub use rewrite::Edit;

/// Result type alias for Wattmark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Wattmark operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No configuration for language: {0}")]
    UnsupportedLanguage(String),

    #[error("No template for {point_type} in language {language}")]
    MissingTemplate {
        language: String,
        point_type: PointType,
    },

    #[error("Ambiguous priority: {first} and {second} capture the same node at line {line}")]
    AmbiguousPriority {
        first: PointType,
        second: PointType,
        line: usize,
    },

    #[error("Source is already instrumented (runtime import found)")]
    AlreadyInstrumented,

    #[error("Edit offset {offset} is out of bounds (source is {len} bytes)")]
    InvalidEdit { offset: usize, len: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
