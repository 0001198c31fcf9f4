//! JavaScript emitted by the build: the client entry handed to the bundler
//! and the inject-only script for server-rendered containers.

use crate::manifest::{ComponentBundleInfo, SnippetMap};
use islands_core::{CompilationContainer, RenderDirective, RenderId, js_string_literal};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

/// Module the generated entry imports the client runtime from.
pub const RUNTIME_MODULE: &str = "islands/runtime";

/// Client entry source for a page.
///
/// Imports every component whose directive set is not exclusively
/// `ssr:only`, then boots the runtime with the page's directive table.
///
/// # Examples
///
/// ```
/// use islands_build::codegen::client_entry_source;
/// use islands_build::ComponentBundleInfo;
/// use islands_core::{compile_page, CompileOptions};
///
/// let page = "<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\n<Counter client:load />\n";
/// let compiled = compile_page(page, "index.md", &CompileOptions::default()).unwrap();
/// let infos = ComponentBundleInfo::collect(&compiled.container);
/// let entry = client_entry_source(&compiled.container, &infos);
/// assert!(entry.contains("import Counter from \"./Counter.tsx\";"));
/// ```
pub fn client_entry_source(page: &CompilationContainer, infos: &[ComponentBundleInfo]) -> String {
    let mut code = String::new();
    let _ = writeln!(
        code,
        "import {{ boot }} from {};",
        js_string_literal(RUNTIME_MODULE)
    );

    let shipped: Vec<&ComponentBundleInfo> = infos.iter().filter(|i| !i.is_ssr_only()).collect();
    for info in &shipped {
        let _ = writeln!(code, "{}", info.binding.import_statement(&info.component_name));
    }

    code.push_str("const components = {");
    for (i, info) in shipped.iter().enumerate() {
        code.push_str(if i == 0 { "\n" } else { ",\n" });
        let _ = write!(
            code,
            "  {}: {}",
            js_string_literal(&info.component_name),
            info.component_name
        );
    }
    code.push_str(if shipped.is_empty() { "};\n" } else { "\n};\n" });

    let directives: BTreeMap<_, _> = page
        .directives_by_id()
        .into_iter()
        .filter(|(_, tuple)| tuple.directive != RenderDirective::SsrOnly || tuple.use_spa_sync)
        .collect();
    let directives_json = serde_json::to_string(&directives).unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(
        code,
        "boot({{ pageId: {}, components, directives: {} }});",
        js_string_literal(&page.page_id),
        directives_json
    );
    code
}

/// Render ids the inject-only script is responsible for: `ssr:only`
/// containers without spa-sync that have rendered HTML.
pub fn inject_only_ids(snippets: &SnippetMap) -> Vec<&RenderId> {
    snippets
        .iter()
        .filter(|(_, s)| {
            s.directive == RenderDirective::SsrOnly && !s.use_spa_sync && s.html.is_some()
        })
        .map(|(id, _)| id)
        .collect()
}

/// Inject-only script: fills server-rendered containers that were not
/// patched into the page HTML, without loading any component module.
/// Returns `None` when no container needs it.
pub fn inject_only_script(snippets: &SnippetMap) -> Option<String> {
    let ids = inject_only_ids(snippets);
    if ids.is_empty() {
        return None;
    }

    let mut code = String::new();
    code.push_str("const snippets = {");
    for (i, id) in ids.iter().enumerate() {
        let html = snippets
            .get(*id)
            .and_then(|s| s.html.as_deref())
            .unwrap_or_default();
        code.push_str(if i == 0 { "\n" } else { ",\n" });
        let _ = write!(code, "  {}: {}", js_string_literal(id.as_str()), js_string_literal(html));
    }
    code.push_str("\n};\n");
    code.push_str(
        "for (const [id, html] of Object.entries(snippets)) {\n  const el = document.querySelector(`[data-render-id=\"${id}\"]`);\n  if (el && !el.hasChildNodes()) el.innerHTML = html;\n}\n",
    );
    Some(code)
}
