//! Batch processing types for parallel compilation.

use crate::types::{CompilerConfig, TransformResult};
use napi_derive::napi;

/// A single page to compile.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Page id (typically the file path).
    pub id: String,
    /// Page source.
    pub source: String,
}

/// Result for a single page in a batch.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Page id matching the input.
    pub id: String,
    /// Compilation result (present on success).
    pub result: Option<TransformResult>,
    /// Error message (present on failure).
    pub error: Option<String>,
}

/// Statistics for batch processing.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct BatchStats {
    /// Total number of pages processed.
    pub total: u32,
    /// Number of successfully compiled pages.
    pub succeeded: u32,
    /// Number of failed compilations.
    pub failed: u32,
    /// Render containers emitted across all compiled pages.
    pub containers: u32,
    /// Diagnostics reported across all compiled pages.
    pub diagnostics: u32,
    /// Total processing time in milliseconds.
    pub processing_time_ms: f64,
}

/// Options for batch processing.
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Maximum number of threads to use. Defaults to number of CPU cores.
    pub max_threads: Option<u32>,
    /// Whether to continue processing after an error. Defaults to true.
    pub continue_on_error: Option<bool>,
    /// Compiler configuration for every page.
    pub config: Option<CompilerConfig>,
}

/// All results of a batch plus statistics.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct BatchProcessingResult {
    /// Individual results, in input order.
    pub results: Vec<BatchResult>,
    /// Processing statistics.
    pub stats: BatchStats,
}
