#![deny(missing_docs)]
//! Node.js bindings for the islands compiler, build helpers and dev session.

use napi::bindgen_prelude::*;
use napi_derive::napi;
use serde_json::Value as JsonValue;

/// Batch processing types.
pub mod batch;
/// The reusable compiler.
pub mod compiler;
/// Conversions between core types and their JS shapes.
mod convert;
/// Dev-server session hooks.
pub mod session;
/// NAPI-exposed data structures.
pub mod types;

pub use batch::*;
pub use compiler::IslandsCompiler;
pub use session::IslandsDevSession;
pub use types::*;

use convert::{from_json, to_compile_options};
use islands_build::{ComponentBundleInfo, PageManifest, SiteManifest, SnippetMap};
use islands_core::{CompilationContainer, PageOptions, RenderId, extract_frontmatter};

/// Bundler transform hook: rewrites component tags in one page.
#[napi]
pub fn transform(
    code: String,
    id: String,
    config: Option<CompilerConfig>,
) -> napi::Result<TransformResult> {
    compiler::transform_page(&to_compile_options(config.as_ref()), &code, &id)
}

/// Extracts YAML frontmatter and the page's island options.
#[napi]
pub fn parse_frontmatter(content: String) -> FrontmatterResult {
    match extract_frontmatter(&content) {
        Ok(result) => FrontmatterResult {
            spa_sync: PageOptions::from_frontmatter(&result.value).spa_sync,
            frontmatter: result.value,
            errors: Vec::new(),
        },
        Err(err) => FrontmatterResult {
            frontmatter: JsonValue::Object(Default::default()),
            spa_sync: None,
            errors: vec![err.to_string()],
        },
    }
}

/// Render id of the `ordinal`-th container of a page.
#[napi(js_name = "renderId")]
pub fn render_id(page_id: String, ordinal: u32) -> String {
    RenderId::derive(&page_id, ordinal as usize).to_string()
}

/// Client entry module source for a compiled page, or `null` when no
/// component on the page ships code.
#[napi(js_name = "clientEntrySource")]
pub fn client_entry_source(container: JsonValue) -> napi::Result<Option<String>> {
    let page: CompilationContainer = from_json(container, "compilation container")?;
    let infos = ComponentBundleInfo::collect(&page);
    if infos.iter().all(ComponentBundleInfo::is_ssr_only) {
        return Ok(None);
    }
    Ok(Some(islands_build::client_entry_source(&page, &infos)))
}

/// Injects server-rendered containers and asset links into a host page.
#[napi(js_name = "injectPageHtml")]
pub fn inject_page_html(
    html: String,
    manifest: JsonValue,
    snippets: JsonValue,
) -> napi::Result<String> {
    let manifest: PageManifest = from_json(manifest, "page manifest")?;
    let snippets: SnippetMap = from_json(snippets, "snippets")?;
    Ok(islands_build::inject_page_html(&html, &manifest, &snippets))
}

/// Validates and normalizes a site manifest, returning its canonical JSON.
#[napi(js_name = "normalizeSiteManifest")]
pub fn normalize_site_manifest(json: String) -> napi::Result<String> {
    let manifest = SiteManifest::from_json(&json)
        .map_err(|e| Error::new(Status::InvalidArg, format!("Invalid site manifest: {}", e)))?;
    manifest
        .to_json()
        .map_err(|e| Error::from_reason(format!("Failed to serialize manifest: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\n<Counter client:load initial=\"3\" />\n";

    #[test]
    fn parses_island_options_from_frontmatter() {
        let result = parse_frontmatter("---\ntitle: T\nislands:\n  spaSync: false\n---\nBody".into());
        assert!(result.errors.is_empty());
        assert_eq!(result.spa_sync, Some(false));
        assert_eq!(result.frontmatter["title"], "T");
    }

    #[test]
    fn frontmatter_errors_are_reported_not_thrown() {
        let result = parse_frontmatter("---\ntitle: [\n---\n".into());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.frontmatter, JsonValue::Object(Default::default()));
    }

    #[test]
    fn render_id_matches_compiled_containers() {
        let result = transform(PAGE.into(), "docs/counter.md".into(), None).unwrap();
        assert_eq!(
            result.container["containers"][0]["renderId"],
            render_id("docs/counter.md".into(), 0)
        );
        assert_eq!(render_id("docs/counter.md".into(), 0), "5a6cfaa6");
    }

    #[test]
    fn client_entry_round_trips_container_json() {
        let result = transform(PAGE.into(), "index.md".into(), None).unwrap();
        let entry = client_entry_source(result.container).unwrap().unwrap();
        assert!(entry.contains("import Counter from \"./Counter.tsx\";"));

        let ssr_only = transform(PAGE.replace(" client:load", "").into(), "index.md".into(), None)
            .unwrap();
        assert_eq!(client_entry_source(ssr_only.container).unwrap(), None);
    }

    #[test]
    fn inject_rejects_malformed_manifest() {
        let err = inject_page_html(
            "<html></html>".into(),
            serde_json::json!({ "cssBundles": 3 }),
            serde_json::json!({}),
        );
        assert!(err.is_err());
    }
}
