//! Browser bindings: the page transform, the client runtime and the
//! live-edit reconciler.

use islands_core::{
    CompilationContainer, CompileOptions, ImportBinding, PassThroughResolver, RenderId,
    SnippetMap, transform_with,
};
use islands_runtime::{
    ClientRuntime, ElementRecord, ElementSnapshot, RuntimeEvent, reconcile as reconcile_elements,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::*;

// ============================================================================
// Config and conversions
// ============================================================================

/// Configuration accepted by [`transform`]. Mirrors the NAPI `CompilerConfig`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WasmCompilerConfig {
    #[serde(default, alias = "frameworkTag")]
    pub framework_tag: Option<String>,
    #[serde(default, alias = "defaultSpaSync")]
    pub default_spa_sync: Option<bool>,
}

fn parse_config(config: JsValue) -> Result<WasmCompilerConfig, JsError> {
    if config.is_undefined() || config.is_null() {
        return Ok(WasmCompilerConfig::default());
    }
    from_js(config, "compiler config")
}

fn compile_options(cfg: &WasmCompilerConfig) -> CompileOptions {
    let mut options = CompileOptions::default();
    if let Some(tag) = &cfg.framework_tag {
        options.framework_tag = tag.clone();
    }
    if let Some(spa) = cfg.default_spa_sync {
        options.default_spa_sync = spa;
    }
    options
}

/// Plain objects rather than `Map`s, so results read like JSON.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

fn from_js<T: DeserializeOwned>(value: JsValue, what: &str) -> Result<T, JsError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsError::new(&format!("Invalid {}: {}", what, e)))
}

// ============================================================================
// Transform API
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransformResult {
    code: String,
    map: Option<String>,
    container: CompilationContainer,
    diagnostics: Vec<String>,
}

/// Rewrites component tags in one page into render containers.
///
/// Returns `{ code, map, container, diagnostics }`.
#[wasm_bindgen]
pub fn transform(source: &str, id: &str, config: JsValue) -> Result<JsValue, JsError> {
    let cfg = parse_config(config)?;
    let output = transform_with(source, id, &compile_options(&cfg), &PassThroughResolver)
        .map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&TransformResult {
        code: output.code,
        map: output.map,
        container: output.container,
        diagnostics: output
            .diagnostics
            .entries()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

// ============================================================================
// Reconciler API
// ============================================================================

/// Classifies container elements after an edit.
///
/// `previousImports` is the import map the live page was compiled with,
/// `mounted` the container snapshots found in the re-rendered document and
/// `records` what was last rendered per id.
#[wasm_bindgen]
pub fn reconcile(
    previous_imports: JsValue,
    next: JsValue,
    mounted: JsValue,
    records: JsValue,
) -> Result<JsValue, JsError> {
    let previous_imports: BTreeMap<String, ImportBinding> =
        from_js(previous_imports, "previous imports")?;
    let next: CompilationContainer = from_js(next, "compilation container")?;
    let mounted: Vec<ElementSnapshot> = from_js(mounted, "element snapshots")?;
    let records: BTreeMap<RenderId, ElementRecord> = from_js(records, "element records")?;
    to_js(&reconcile_elements(&previous_imports, &next, &mounted, &records))
}

// ============================================================================
// Client runtime
// ============================================================================

/// The directive state machine for one browser tab.
///
/// Every method returns the effects the host must perform, as an array of
/// `{ effect: "...", ... }` objects.
#[wasm_bindgen]
pub struct IslandsRuntime {
    inner: ClientRuntime,
}

impl Default for IslandsRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl IslandsRuntime {
    /// Creates a runtime with the built-in directive handlers.
    #[wasm_bindgen(constructor)]
    pub fn new() -> IslandsRuntime {
        Self {
            inner: ClientRuntime::new(),
        }
    }

    /// Page currently driven.
    #[wasm_bindgen(getter, js_name = pageId)]
    pub fn page_id(&self) -> String {
        self.inner.page_id().to_string()
    }

    /// Takes over a page on initial load.
    pub fn discover(&mut self, page: JsValue) -> Result<JsValue, JsError> {
        let page: CompilationContainer = from_js(page, "compilation container")?;
        to_js(&self.inner.discover(&page))
    }

    /// Same-app navigation with the target page's build snippets.
    pub fn navigate(&mut self, page: JsValue, snippets: JsValue) -> Result<JsValue, JsError> {
        let page: CompilationContainer = from_js(page, "compilation container")?;
        let snippets: SnippetMap = if snippets.is_undefined() || snippets.is_null() {
            SnippetMap::new()
        } else {
            from_js(snippets, "snippets")?
        };
        to_js(&self.inner.navigate(&page, &snippets))
    }

    /// Feeds one host event (`{ event: "moduleLoaded", key }`, ...).
    pub fn handle(&mut self, event: JsValue) -> Result<JsValue, JsError> {
        let event: RuntimeEvent = from_js(event, "runtime event")?;
        let effects = self
            .inner
            .handle(event)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_js(&effects)
    }

    /// Feeds one dev-channel payload.
    #[wasm_bindgen(js_name = handleServerMessage)]
    pub fn handle_server_message(&mut self, message: &str) -> Result<JsValue, JsError> {
        let effects = self
            .inner
            .handle_server_message(message)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_js(&effects)
    }

    /// Reconciles the live page against its recompilation and applies the
    /// plan. `mounted` are the container snapshots of the re-rendered
    /// document.
    #[wasm_bindgen(js_name = applyEdit)]
    pub fn apply_edit(&mut self, next: JsValue, mounted: JsValue) -> Result<JsValue, JsError> {
        let next: CompilationContainer = from_js(next, "compilation container")?;
        let mounted: Vec<ElementSnapshot> = match from_js(mounted.clone(), "element snapshots") {
            Ok(mounted) => mounted,
            Err(_) if mounted.is_undefined() || mounted.is_null() => next
                .containers
                .iter()
                .map(ElementSnapshot::from_container)
                .collect(),
            Err(err) => return Err(err),
        };
        let plan = reconcile_elements(
            self.inner.imports(),
            &next,
            &mounted,
            self.inner.records(),
        );
        to_js(&self.inner.apply_plan(plan, &next))
    }

    /// Asset paths to prefetch once the page settles.
    #[wasm_bindgen(js_name = setPrefetch)]
    pub fn set_prefetch(&mut self, paths: Vec<String>) {
        self.inner.set_prefetch(paths);
    }

    /// Lifecycle state of a container, if known.
    pub fn state(&self, render_id: &str) -> Result<JsValue, JsError> {
        let id = RenderId::new(render_id).map_err(|e| JsError::new(&e.to_string()))?;
        match self.inner.state(&id) {
            Some(state) => to_js(&state),
            None => Ok(JsValue::UNDEFINED),
        }
    }
}
