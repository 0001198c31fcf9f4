#![deny(missing_docs)]
//! Islands core: render directives, the tag compiler, and the compiled
//! per-page container shared by the build pipeline and the client runtime.

/// Component script import parsing.
pub mod imports;
/// Tag compiler entry points.
pub mod compiler;
/// Render containers and the per-page compilation artifact.
pub mod container;
/// Render directives and spa-sync markers.
pub mod directive;
/// Core error and diagnostic types.
pub mod error;
/// YAML frontmatter extraction helpers.
pub mod frontmatter;
/// Client glue generation.
pub mod glue;
/// Markdown tokenization helpers.
pub mod parse;
/// Render id derivation.
pub mod render_id;
/// Raw HTML start-tag scanner.
pub mod scanner;
/// Per-container build records.
pub mod snippet;
/// Source edits and line-level source maps.
pub mod source_map;

pub use compiler::{
    CompileOptions, ModuleResolver, PageCompilation, PassThroughResolver, TransformOutput,
    compile_page, compile_page_with_resolver, transform, transform_with,
};
pub use container::{
    Attribute, CompilationContainer, ImportBinding, ImportedSymbol, Props, RenderContainer,
};
pub use directive::{
    DirectiveTuple, RenderDirective, SpaSyncMarker, SpaSyncResolution, resolve_spa_sync,
};
pub use error::{
    Diagnostic, DiagnosticKind, Diagnostics, ErrorSeverity, IslandsError, SourceLocation,
};
pub use frontmatter::{FrontmatterError, FrontmatterExtraction, PageOptions, extract_frontmatter};
pub use glue::{client_glue, js_string_literal};
pub use parse::{HtmlSpan, LineIndex, ParseOptions, html_spans};
pub use render_id::{RenderId, RenderIdAllocator};
pub use snippet::{SnippetMap, UsedSnippet};
