use crate::types::{CompilerConfig, DiagnosticEntry, TransformResult};
use islands_build::BuildError;
use islands_core::{CompileOptions, Diagnostic, Diagnostics, IslandsError, TransformOutput};
use napi::{Error, Status};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Converts the JS-facing config into compile options.
pub fn to_compile_options(config: Option<&CompilerConfig>) -> CompileOptions {
    let mut options = CompileOptions::default();
    if let Some(config) = config {
        if let Some(tag) = &config.framework_tag {
            options.framework_tag = tag.clone();
        }
        if let Some(spa) = config.default_spa_sync {
            options.default_spa_sync = spa;
        }
    }
    options
}

fn convert_diagnostic(diagnostic: &Diagnostic) -> DiagnosticEntry {
    let tag = |value: JsonValue| value.as_str().unwrap_or_default().to_string();
    DiagnosticEntry {
        kind: tag(serde_json::to_value(diagnostic.kind).unwrap_or_default()),
        severity: tag(serde_json::to_value(diagnostic.severity).unwrap_or_default()),
        line: diagnostic.location.line as u32,
        column: diagnostic.location.column as u32,
        message: diagnostic.message.clone(),
    }
}

/// Converts diagnostics for JS.
pub fn convert_diagnostics(diagnostics: &Diagnostics) -> Vec<DiagnosticEntry> {
    diagnostics.entries().iter().map(convert_diagnostic).collect()
}

/// Converts a transform output for JS.
pub fn convert_transform(output: TransformOutput) -> napi::Result<TransformResult> {
    Ok(TransformResult {
        container: to_json(&output.container)?,
        diagnostics: convert_diagnostics(&output.diagnostics),
        code: output.code,
        map: output.map,
    })
}

/// Serializes a value for JS.
pub fn to_json<T: Serialize>(value: &T) -> napi::Result<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| Error::from_reason(format!("Failed to serialize result: {}", e)))
}

/// Deserializes a JS value, naming what was expected on failure.
pub fn from_json<T: DeserializeOwned>(value: JsonValue, what: &str) -> napi::Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::new(Status::InvalidArg, format!("Invalid {}: {}", what, e)))
}

/// Maps compiler errors to NAPI errors.
pub fn convert_error(err: IslandsError) -> Error {
    match err {
        IslandsError::DuplicateImport { .. }
        | IslandsError::InvalidRenderId(_)
        | IslandsError::UnknownDirective(_) => Error::new(Status::InvalidArg, err.to_string()),
        IslandsError::MarkdownAdapter { message, location } => Error::from_reason(format!(
            "Markdown parser error at {}: {}",
            location, message
        )),
        IslandsError::InternalError(msg) => Error::from_reason(format!("Internal error: {}", msg)),
    }
}

/// Maps build errors to NAPI errors.
pub fn convert_build_error(err: BuildError) -> Error {
    match err {
        BuildError::Compile(err) => convert_error(err),
        BuildError::UnknownPage(page) => {
            Error::new(Status::InvalidArg, format!("Unknown page: {}", page))
        }
        other => Error::from_reason(other.to_string()),
    }
}
