//! Client glue module emitted for each compiled page.

use crate::container::CompilationContainer;
use std::fmt::Write as _;

/// Converts a Rust string to a JavaScript string literal.
pub fn js_string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Generates the client glue for a page.
///
/// Only components with at least one non-`ssr:only` container are imported,
/// so ssr-only components never enter the browser import graph.
pub fn client_glue(container: &CompilationContainer) -> String {
    let mut code = String::new();
    let _ = writeln!(
        code,
        "// Generated island glue for {}.",
        js_string_literal(&container.page_id)
    );

    let client_names = container.client_component_names();
    for name in &client_names {
        if let Some(binding) = container.imports_by_local_name.get(name) {
            let _ = writeln!(code, "{}", binding.import_statement(name));
        }
    }

    let _ = writeln!(
        code,
        "export const pageId = {};",
        js_string_literal(&container.page_id)
    );

    code.push_str("export const components = {");
    let mut first = true;
    for name in &client_names {
        if container.imports_by_local_name.contains_key(name) {
            code.push_str(if first { "\n" } else { ",\n" });
            let _ = write!(code, "  {}: {}", js_string_literal(name), name);
            first = false;
        }
    }
    code.push_str(if first { "};\n" } else { "\n};\n" });

    let directives = serde_json::to_string(&container.directives_by_id())
        .unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(code, "export const directives = {};", directives);
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ImportBinding, Props, RenderContainer};
    use crate::directive::RenderDirective;
    use crate::render_id::RenderId;
    use std::collections::BTreeMap;

    fn page(directives: &[(&str, RenderDirective)]) -> CompilationContainer {
        let mut imports = BTreeMap::new();
        imports.insert("Counter".to_string(), ImportBinding::default_export("./Counter.tsx"));
        imports.insert("Note".to_string(), ImportBinding::named("./note", "Note"));
        let containers = directives
            .iter()
            .enumerate()
            .map(|(i, (name, directive))| RenderContainer {
                render_id: RenderId::derive("index.md", i),
                render_directive: *directive,
                component_name: name.to_string(),
                use_spa_sync: false,
                props: Props::new(),
            })
            .collect();
        CompilationContainer::new("index.md", imports, containers)
    }

    #[test]
    fn ssr_only_components_are_not_imported() {
        let glue = page(&[
            ("Counter", RenderDirective::ClientLoad),
            ("Note", RenderDirective::SsrOnly),
        ])
        .glue_code;
        assert!(glue.contains("import Counter from \"./Counter.tsx\";"));
        assert!(!glue.contains("./note"));
        assert!(glue.contains("export const components = {\n  \"Counter\": Counter\n};"));
    }

    #[test]
    fn empty_registry_when_nothing_needs_client_code() {
        let glue = page(&[("Note", RenderDirective::SsrOnly)]).glue_code;
        assert!(glue.contains("export const components = {};"));
        assert!(!glue.contains("import "));
    }

    #[test]
    fn directives_are_embedded() {
        let glue = page(&[("Counter", RenderDirective::ClientVisible)]).glue_code;
        assert!(glue.contains("\"directive\":\"client:visible\""));
        assert!(glue.contains(RenderId::derive("index.md", 0).as_str()));
    }
}
