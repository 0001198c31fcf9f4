//! The reusable compiler and its batch mode.

use crate::batch::{BatchInput, BatchOptions, BatchProcessingResult, BatchResult, BatchStats};
use crate::convert::{convert_error, convert_transform, to_compile_options};
use crate::types::{CompilerConfig, TransformResult};
use islands_core::{CompileOptions, PassThroughResolver, transform_with};
use napi_derive::napi;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

pub(crate) fn transform_page(
    options: &CompileOptions,
    code: &str,
    id: &str,
) -> napi::Result<TransformResult> {
    let output = transform_with(code, id, options, &PassThroughResolver).map_err(convert_error)?;
    convert_transform(output)
}

/// Compiler configured once and reused across bundler transform hooks.
#[napi]
pub struct IslandsCompiler {
    pub(crate) options: CompileOptions,
}

#[napi]
impl IslandsCompiler {
    #[napi(constructor)]
    /// Creates a compiler.
    pub fn new(config: Option<CompilerConfig>) -> Self {
        Self {
            options: to_compile_options(config.as_ref()),
        }
    }

    /// Rewrites component tags in one page into render containers.
    #[napi]
    pub fn transform(&self, code: String, id: String) -> napi::Result<TransformResult> {
        transform_page(&self.options, &code, &id)
    }

    /// Compiles many pages in parallel using Rayon.
    ///
    /// With `continueOnError: false` pages are compiled in order and the
    /// batch stops at the first failure.
    #[napi(js_name = "compileBatch")]
    pub fn compile_batch(
        &self,
        inputs: Vec<BatchInput>,
        options: Option<BatchOptions>,
    ) -> napi::Result<BatchProcessingResult> {
        let opts = options.unwrap_or_default();
        let compile_options = match &opts.config {
            Some(config) => to_compile_options(Some(config)),
            None => self.options.clone(),
        };
        Ok(run_batch(&compile_options, inputs, &opts))
    }
}

pub(crate) fn run_batch(
    compile_options: &CompileOptions,
    inputs: Vec<BatchInput>,
    opts: &BatchOptions,
) -> BatchProcessingResult {
    let start = Instant::now();
    let continue_on_error = opts.continue_on_error.unwrap_or(true);

    let pool = opts.max_threads.and_then(|max_threads| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads as usize)
            .build()
            .ok()
    });

    let total = inputs.len() as u32;
    let succeeded = AtomicU32::new(0);
    let failed = AtomicU32::new(0);
    let containers = AtomicU32::new(0);
    let diagnostics = AtomicU32::new(0);

    let process_input = |input: BatchInput| -> BatchResult {
        match transform_page(compile_options, &input.source, &input.id) {
            Ok(result) => {
                succeeded.fetch_add(1, Ordering::Relaxed);
                containers.fetch_add(container_count(&result), Ordering::Relaxed);
                diagnostics.fetch_add(result.diagnostics.len() as u32, Ordering::Relaxed);
                BatchResult {
                    id: input.id,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                BatchResult {
                    id: input.id,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    };

    let results: Vec<BatchResult> = if continue_on_error {
        match pool {
            Some(pool) => pool.install(|| inputs.into_par_iter().map(process_input).collect()),
            None => inputs.into_par_iter().map(process_input).collect(),
        }
    } else {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = process_input(input);
            let stop = result.error.is_some();
            results.push(result);
            if stop {
                break;
            }
        }
        results
    };

    BatchProcessingResult {
        results,
        stats: BatchStats {
            total,
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            containers: containers.load(Ordering::Relaxed),
            diagnostics: diagnostics.load(Ordering::Relaxed),
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }
}

fn container_count(result: &TransformResult) -> u32 {
    result.container["containers"]
        .as_array()
        .map_or(0, |containers| containers.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\n<Counter client:load />\n";

    fn input(id: &str, source: &str) -> BatchInput {
        BatchInput {
            id: id.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn transform_returns_container_json() {
        let compiler = IslandsCompiler::new(None);
        let result = compiler.transform(PAGE.to_string(), "index.md".to_string()).unwrap();
        assert!(result.code.contains("data-render-directive=\"client:load\""));
        assert_eq!(result.container["pageId"], "index.md");
        assert!(result.map.is_some());
    }

    #[test]
    fn framework_tag_is_configurable() {
        let compiler = IslandsCompiler::new(Some(CompilerConfig {
            framework_tag: Some("preact".to_string()),
            default_spa_sync: None,
        }));
        let source = PAGE.replace("lang=\"react\"", "lang=\"preact\"");
        let result = compiler.transform(source, "index.md".to_string()).unwrap();
        assert!(result.code.contains("data-render-component=\"Counter\""));
    }

    #[test]
    fn batch_reports_failures_per_page() {
        let duplicate = "<script lang=\"react\">\nimport Card from './a'\nimport card from './b'\n</script>\n";
        let result = run_batch(
            &CompileOptions::default(),
            vec![input("a.md", PAGE), input("b.md", duplicate), input("c.md", PAGE)],
            &BatchOptions::default(),
        );
        assert_eq!(result.stats.total, 3);
        assert_eq!(result.stats.succeeded, 2);
        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.stats.containers, 2);
        assert_eq!(result.stats.diagnostics, 0);
        assert_eq!(result.results[1].id, "b.md");
        assert!(result.results[1].error.is_some());
    }

    #[test]
    fn batch_stops_on_first_error_when_asked() {
        let duplicate = "<script lang=\"react\">\nimport Card from './a'\nimport card from './b'\n</script>\n";
        let result = run_batch(
            &CompileOptions::default(),
            vec![input("a.md", duplicate), input("b.md", PAGE)],
            &BatchOptions {
                continue_on_error: Some(false),
                ..BatchOptions::default()
            },
        );
        assert_eq!(result.results.len(), 1);
    }
}
