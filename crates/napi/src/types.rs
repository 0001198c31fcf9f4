//! NAPI-exposed data structures.

use napi_derive::napi;
use serde_json::Value as JsonValue;

/// Options passed to the compiler constructor.
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// `lang` value of the component script section. Defaults to `react`.
    pub framework_tag: Option<String>,
    /// Spa-sync default for containers without a marker. Defaults to true.
    pub default_spa_sync: Option<bool>,
}

/// A recoverable problem found while compiling.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    /// `authoring`, `import_resolution`, `parse` or `render`.
    pub kind: String,
    /// `error` or `warning`.
    pub severity: String,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub column: u32,
    /// Human-readable message.
    pub message: String,
}

/// Output of the bundler transform hook.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Rewritten document text.
    pub code: String,
    /// v3 source map JSON.
    pub map: Option<String>,
    /// The compilation container as JSON.
    pub container: JsonValue,
    /// Recoverable problems.
    pub diagnostics: Vec<DiagnosticEntry>,
}

/// Parsed frontmatter plus any parser errors.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct FrontmatterResult {
    /// Frontmatter as JSON.
    pub frontmatter: JsonValue,
    /// Page spa-sync override, when the page sets one.
    pub spa_sync: Option<bool>,
    /// Extraction errors.
    pub errors: Vec<String>,
}

/// Server-rendered markup supplied by the host for one container.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct RenderedEntry {
    /// Container id.
    pub render_id: String,
    /// Rendered markup.
    pub html: String,
}
