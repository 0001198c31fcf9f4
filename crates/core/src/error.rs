use serde::Serialize;
use thiserror::Error;

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Optional file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information
    pub fn with_file(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Unrecoverable errors that stop the compilation of one page.
///
/// Everything else (authoring mistakes, unresolvable imports, a malformed
/// script section) is reported through [`Diagnostics`] and the page still
/// compiles.
#[derive(Debug, Error)]
pub enum IslandsError {
    /// Two imports in the same page collide case-insensitively.
    #[error("Duplicate component import at {location}: '{first}' and '{second}' differ only by case")]
    DuplicateImport {
        /// Local name that was declared first.
        first: String,
        /// Local name that collides with `first`.
        second: String,
        /// Location of the second declaration.
        location: SourceLocation,
    },
    /// markdown-rs parser error surfaced through the adapter.
    #[error("Parse error at {location}: {message}")]
    MarkdownAdapter {
        /// Error message
        message: String,
        /// Source location
        location: SourceLocation,
    },
    /// A render identifier that is not 8 lowercase hex characters.
    #[error("Invalid render id '{0}'")]
    InvalidRenderId(String),
    /// An unknown render directive name.
    #[error("Unknown render directive '{0}'")]
    UnknownDirective(String),
    /// Internal logic error (unexpected state).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IslandsError {
    /// Create a parse error with location
    pub fn parse_error(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::MarkdownAdapter {
            message: message.into(),
            location: SourceLocation::new(line, column),
        }
    }
}

/// Category of a recoverable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Wrong tag casing, non-self-closing tag, conflicting markers.
    Authoring,
    /// A component import whose module cannot be resolved.
    ImportResolution,
    /// Malformed embedded script section or markdown.
    Parse,
    /// Server render or client hydration failure.
    Render,
}

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Error that was recovered from
    Error,
    /// Warning that doesn't prevent rendering
    Warning,
}

/// A recoverable problem found while compiling a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Problem category.
    pub kind: DiagnosticKind,
    /// Severity.
    pub severity: ErrorSeverity,
    /// Human-readable message.
    pub message: String,
    /// Where the problem was found.
    pub location: SourceLocation,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        };
        write!(f, "{} at {}: {}", severity, self.location, self.message)
    }
}

/// Collection of recoverable diagnostics for one page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create a new empty diagnostics collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and forward it to the `log` facade.
    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>, location: SourceLocation) {
        let diagnostic = Diagnostic {
            kind,
            severity: ErrorSeverity::Warning,
            message: message.into(),
            location,
        };
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Record a recovered error and forward it to the `log` facade.
    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>, location: SourceLocation) {
        let diagnostic = Diagnostic {
            kind,
            severity: ErrorSeverity::Error,
            message: message.into(),
            location,
        };
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// All recorded diagnostics in discovery order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Diagnostics of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    /// Check if there are any diagnostics
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get total count of all diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Attach a file path to every diagnostic location.
    pub fn set_file(&mut self, file: &str) {
        for entry in &mut self.entries {
            entry.location.file = Some(file.to_string());
        }
    }
}
