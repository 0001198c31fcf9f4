//! The tag compiler: discovers component references in a markdown page and
//! rewrites them into directive-bearing containers.

use crate::container::{Attribute, CompilationContainer, ImportBinding, Props, RenderContainer};
use crate::directive::{RESERVED_ATTRS, RenderDirective, SpaSyncMarker, resolve_spa_sync};
use crate::error::{DiagnosticKind, Diagnostics, IslandsError};
use crate::frontmatter::{PageOptions, extract_frontmatter};
use crate::imports::{ImportDecl, parse_imports};
use crate::parse::{HtmlSpan, LineIndex, ParseOptions, html_spans};
use crate::render_id::RenderIdAllocator;
use crate::scanner::{ScannedTag, find_end_tag, scan_start_tags};
use crate::source_map::{Edit, apply_edits, line_map, to_source_map};
use std::collections::{BTreeMap, HashMap};

/// Compiler configuration.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// `lang` value of the component script section (`<script lang="react">`).
    pub framework_tag: String,
    /// Spa-sync default for pages whose frontmatter does not set one.
    pub default_spa_sync: bool,
    /// Markdown tokenizer options.
    pub parse: ParseOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            framework_tag: "react".to_string(),
            default_spa_sync: true,
            parse: ParseOptions::docs(),
        }
    }
}

/// Resolves module specifiers written in a page.
pub trait ModuleResolver {
    /// Returns the resolved module id, or `None` when it cannot be resolved.
    fn resolve(&self, specifier: &str, importer: &str) -> Option<String>;
}

/// Accepts every non-empty specifier as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughResolver;

impl ModuleResolver for PassThroughResolver {
    fn resolve(&self, specifier: &str, _importer: &str) -> Option<String> {
        let trimmed = specifier.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl<F> ModuleResolver for F
where
    F: Fn(&str, &str) -> Option<String>,
{
    fn resolve(&self, specifier: &str, importer: &str) -> Option<String> {
        (self)(specifier, importer)
    }
}

/// Result of compiling one page.
#[derive(Debug, Clone)]
pub struct PageCompilation {
    /// Rewritten document text.
    pub code: String,
    /// Compiled per-page artifact.
    pub container: CompilationContainer,
    /// Recoverable problems found while compiling.
    pub diagnostics: Diagnostics,
    /// Original line (0-indexed) of every output line.
    pub line_map: Vec<usize>,
}

impl PageCompilation {
    /// `renderId → directive tuple` for the compiled page.
    pub fn directives(&self) -> BTreeMap<crate::RenderId, crate::DirectiveTuple> {
        self.container.directives_by_id()
    }
}

/// Output of the bundler-facing transform hook.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Rewritten document text.
    pub code: String,
    /// v3 source map JSON.
    pub map: Option<String>,
    /// Compiled per-page artifact.
    pub container: CompilationContainer,
    /// Recoverable problems found while compiling.
    pub diagnostics: Diagnostics,
}

/// Bundler transform contract: document text in, rewritten text and source map out.
pub fn transform(code: &str, id: &str) -> Result<TransformOutput, IslandsError> {
    transform_with(code, id, &CompileOptions::default(), &PassThroughResolver)
}

/// [`transform`] with explicit options and resolver.
pub fn transform_with(
    code: &str,
    id: &str,
    options: &CompileOptions,
    resolver: &dyn ModuleResolver,
) -> Result<TransformOutput, IslandsError> {
    let compiled = compile_page_with_resolver(code, id, options, resolver)?;
    let map = to_source_map(id, code, &compiled.line_map);
    Ok(TransformOutput {
        code: compiled.code,
        map: Some(map),
        container: compiled.container,
        diagnostics: compiled.diagnostics,
    })
}

/// Compiles a page with the pass-through resolver.
pub fn compile_page(
    source: &str,
    page_id: &str,
    options: &CompileOptions,
) -> Result<PageCompilation, IslandsError> {
    compile_page_with_resolver(source, page_id, options, &PassThroughResolver)
}

/// Compiles a page.
///
/// Only a case-insensitive import collision is an error; every other problem
/// is recorded in the returned diagnostics and the affected occurrence or
/// section is left out.
pub fn compile_page_with_resolver(
    source: &str,
    page_id: &str,
    options: &CompileOptions,
    resolver: &dyn ModuleResolver,
) -> Result<PageCompilation, IslandsError> {
    let lines = LineIndex::new(source);
    let mut diagnostics = Diagnostics::new();

    let page_options = match extract_frontmatter(source) {
        Ok(frontmatter) => PageOptions::from_frontmatter(&frontmatter.value),
        Err(err) => {
            diagnostics.warn(DiagnosticKind::Parse, err.to_string(), lines.location(0));
            PageOptions::default()
        }
    };

    let spa_default = page_options.spa_sync.unwrap_or(options.default_spa_sync);

    let spans = match html_spans(source, &options.parse) {
        Ok(spans) => spans,
        Err(err) => {
            diagnostics.error(
                DiagnosticKind::Parse,
                format!("page left uncompiled: {}", err),
                lines.location(0),
            );
            return Ok(uncompiled(source, page_id, diagnostics));
        }
    };

    let mut edits = Vec::new();
    let mut content_spans = Vec::new();
    let mut decls = Vec::new();
    let mut script_valid = true;

    for span in spans {
        let fragment = &source[span.start..span.end];
        match script_section(fragment, &options.framework_tag) {
            Some(section) => {
                let range = (span.start + section.start)..(span.start + section.end);
                edits.push(blank_out(source, range.clone()));
                if !script_valid {
                    continue;
                }
                let body = &source[span.start + section.body_start..span.start + section.body_end];
                match section.closed.then(|| parse_imports(body)) {
                    Some(Ok(found)) => decls.extend(found.into_iter().map(|mut d| {
                        d.offset += span.start + section.body_start;
                        d
                    })),
                    Some(Err(err)) => {
                        script_valid = false;
                        diagnostics.warn(
                            DiagnosticKind::Parse,
                            format!("component script discarded: {}", err.message),
                            lines.location(span.start + section.body_start + err.offset),
                        );
                    }
                    None => {
                        script_valid = false;
                        diagnostics.warn(
                            DiagnosticKind::Parse,
                            "component script discarded: missing </script>",
                            lines.location(range.start),
                        );
                    }
                }
            }
            None => content_spans.push(span),
        }
    }

    let imports = if script_valid {
        resolve_imports(decls, page_id, resolver, &lines, &mut diagnostics)?
    } else {
        BTreeMap::new()
    };

    let mut containers = Vec::new();
    if !imports.is_empty() {
        let mut allocator = RenderIdAllocator::new(page_id);
        let lowercase: HashMap<String, &str> = imports
            .keys()
            .map(|name| (name.to_ascii_lowercase(), name.as_str()))
            .collect();

        for span in content_spans {
            let fragment = &source[span.start..span.end];
            for tag in scan_start_tags(fragment) {
                let Some(local) = lowercase.get(&tag.name.to_ascii_lowercase()) else {
                    continue;
                };
                let at = span.start + tag.start;
                if tag.name != *local {
                    diagnostics.warn(
                        DiagnosticKind::Authoring,
                        format!(
                            "<{}> does not match the imported name '{}' (no aliasing by casing); left uncompiled",
                            tag.name, local
                        ),
                        lines.location(at),
                    );
                    continue;
                }
                if !tag.self_closing {
                    diagnostics.warn(
                        DiagnosticKind::Authoring,
                        format!("<{}> must be self-closing; left uncompiled", tag.name),
                        lines.location(at),
                    );
                    continue;
                }

                let container = build_container(
                    &tag,
                    allocator.next_id(),
                    spa_default,
                    &mut diagnostics,
                    &lines,
                    at,
                );
                edits.push(Edit {
                    start: at,
                    end: span.start + tag.end,
                    replacement: container.to_html(),
                });
                containers.push(container);
            }
        }
    }

    let code = apply_edits(source, &edits);
    let line_map = line_map(source, &edits);
    log::debug!(
        "compiled {}: {} container(s), {} import(s), {} diagnostic(s)",
        page_id,
        containers.len(),
        imports.len(),
        diagnostics.len()
    );

    Ok(PageCompilation {
        code,
        container: CompilationContainer::new(page_id, imports, containers),
        diagnostics,
        line_map,
    })
}

fn uncompiled(source: &str, page_id: &str, diagnostics: Diagnostics) -> PageCompilation {
    PageCompilation {
        code: source.to_string(),
        container: CompilationContainer::new(page_id, BTreeMap::new(), Vec::new()),
        diagnostics,
        line_map: line_map(source, &[]),
    }
}

/// Location of a component script inside one HTML span (span-relative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScriptSection {
    start: usize,
    end: usize,
    body_start: usize,
    body_end: usize,
    closed: bool,
}

fn script_section(fragment: &str, framework_tag: &str) -> Option<ScriptSection> {
    let leading = fragment.len() - fragment.trim_start().len();
    let tags = scan_start_tags(&fragment[leading..]);
    let open = tags.first()?;
    if open.start != 0 || !open.name.eq_ignore_ascii_case("script") {
        return None;
    }
    let lang = open
        .attributes
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case("lang"))?
        .value
        .as_deref()?;
    if lang != framework_tag {
        return None;
    }

    let body_start = leading + open.end;
    match find_end_tag(fragment, "script", body_start) {
        Some(close) => {
            let end = fragment[close..]
                .find('>')
                .map_or(fragment.len(), |gt| close + gt + 1);
            Some(ScriptSection {
                start: leading,
                end,
                body_start,
                body_end: close,
                closed: true,
            })
        }
        None => Some(ScriptSection {
            start: leading,
            end: fragment.len(),
            body_start,
            body_end: fragment.len(),
            closed: false,
        }),
    }
}

/// Replaces a range with as many newlines as it contained.
fn blank_out(source: &str, range: std::ops::Range<usize>) -> Edit {
    let newlines = source[range.clone()].matches('\n').count();
    Edit {
        start: range.start,
        end: range.end,
        replacement: "\n".repeat(newlines),
    }
}

fn resolve_imports(
    decls: Vec<ImportDecl>,
    page_id: &str,
    resolver: &dyn ModuleResolver,
    lines: &LineIndex,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<String, ImportBinding>, IslandsError> {
    let mut imports = BTreeMap::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for decl in decls {
        let lowered = decl.local.to_ascii_lowercase();
        if let Some(first) = seen.get(&lowered) {
            return Err(IslandsError::DuplicateImport {
                first: first.clone(),
                second: decl.local,
                location: lines.location(decl.offset),
            });
        }
        seen.insert(lowered, decl.local.clone());

        match resolver.resolve(&decl.binding.module, page_id) {
            Some(module) => {
                imports.insert(
                    decl.local,
                    ImportBinding {
                        module,
                        imported: decl.binding.imported,
                    },
                );
            }
            None => diagnostics.error(
                DiagnosticKind::ImportResolution,
                format!(
                    "cannot resolve '{}' imported as '{}'; its containers are skipped",
                    decl.binding.module, decl.local
                ),
                lines.location(decl.offset),
            ),
        }
    }

    Ok(imports)
}

fn build_container(
    tag: &ScannedTag,
    render_id: crate::RenderId,
    page_spa_default: bool,
    diagnostics: &mut Diagnostics,
    lines: &LineIndex,
    at: usize,
) -> RenderContainer {
    let mut directive: Option<RenderDirective> = None;
    let mut marker: Option<SpaSyncMarker> = None;
    let mut props = Props::new();

    for attribute in &tag.attributes {
        if !is_valid_attribute_name(&attribute.name) {
            diagnostics.warn(
                DiagnosticKind::Authoring,
                format!(
                    "<{}> has a malformed attribute name '{}'; ignored",
                    tag.name, attribute.name
                ),
                lines.location(at),
            );
        } else if let Some(found) = RenderDirective::from_attr(&attribute.name) {
            match directive {
                None => directive = Some(found),
                Some(kept) if kept != found => diagnostics.warn(
                    DiagnosticKind::Authoring,
                    format!(
                        "<{}> has conflicting directives; keeping {} and ignoring {}",
                        tag.name, kept, found
                    ),
                    lines.location(at),
                ),
                Some(_) => {}
            }
        } else if let Some(found) = SpaSyncMarker::from_attr(&attribute.name) {
            if marker.is_some_and(|m| m != found) {
                diagnostics.warn(
                    DiagnosticKind::Authoring,
                    format!("<{}> has conflicting spa-sync markers; the last one wins", tag.name),
                    lines.location(at),
                );
            }
            marker = Some(found);
        } else if RESERVED_ATTRS.contains(&attribute.name.as_str()) {
            diagnostics.warn(
                DiagnosticKind::Authoring,
                format!("<{}> sets reserved attribute '{}'; ignored", tag.name, attribute.name),
                lines.location(at),
            );
        } else {
            props.push(Attribute {
                name: attribute.name.clone(),
                value: attribute.value.clone(),
            });
        }
    }

    let directive = directive.unwrap_or_default();
    let spa = resolve_spa_sync(directive, marker, page_spa_default);
    if spa.forced_off {
        diagnostics.warn(
            DiagnosticKind::Authoring,
            format!("<{}> is client:only and cannot use spa-sync; disabled", tag.name),
            lines.location(at),
        );
    }

    RenderContainer {
        render_id,
        render_directive: directive,
        component_name: tag.name.clone(),
        use_spa_sync: spa.enabled,
        props,
    }
}

fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '/' | '='))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderId;

    const COUNTER_PAGE: &str = "# Counter\n\n<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\nSome prose.\n\n<Counter client:load initial=\"3\" />\n";

    fn compile(source: &str) -> PageCompilation {
        compile_page(source, "docs/counter.md", &CompileOptions::default())
            .expect("page should compile")
    }

    #[test]
    fn compiles_counter_example() {
        let compiled = compile(COUNTER_PAGE);
        assert_eq!(compiled.container.containers.len(), 1);
        let container = &compiled.container.containers[0];
        assert_eq!(container.render_id, RenderId::derive("docs/counter.md", 0));
        assert_eq!(container.render_directive, RenderDirective::ClientLoad);
        assert_eq!(container.component_name, "Counter");
        assert!(container.use_spa_sync);
        assert_eq!(container.props.get("initial"), Some(Some("3")));
        assert!(compiled.code.contains(&container.to_html()));
        assert!(!compiled.code.contains("<Counter"));
        assert!(!compiled.code.contains("<script"));
        assert!(compiled.diagnostics.is_empty());
    }

    #[test]
    fn script_section_is_blanked_preserving_lines() {
        let compiled = compile(COUNTER_PAGE);
        assert_eq!(compiled.code.lines().count(), COUNTER_PAGE.lines().count());
        assert_eq!(compiled.code.lines().nth(8).map(|l| l.starts_with("<div")), Some(true));
    }

    #[test]
    fn default_directive_is_ssr_only_with_spa_sync() {
        let source = "<script lang=\"react\">\nimport Note from './Note'\n</script>\n\n<Note />\n";
        let container = &compile(source).container.containers[0];
        assert_eq!(container.render_directive, RenderDirective::SsrOnly);
        assert!(container.use_spa_sync);
    }

    #[test]
    fn client_only_never_syncs() {
        let source = "<script lang=\"react\">\nimport Map from './Map'\n</script>\n\n<Map client:only spa:sr />\n";
        let compiled = compile(source);
        let container = &compiled.container.containers[0];
        assert_eq!(container.render_directive, RenderDirective::ClientOnly);
        assert!(!container.use_spa_sync);
        assert_eq!(compiled.diagnostics.of_kind(DiagnosticKind::Authoring).count(), 1);
    }

    #[test]
    fn malformed_attribute_names_are_dropped() {
        let source = "<script lang=\"react\">\nimport Counter from './Counter'\n</script>\n\n<div>\n<Counter client:load =\"x\" initial=\"1\" />\n</div>\n";
        let compiled = compile(source);
        let container = &compiled.container.containers[0];
        assert_eq!(container.props.len(), 1);
        assert_eq!(container.props.get("initial"), Some(Some("1")));
        assert!(!container.to_html().contains(" =\""));
        assert_eq!(compiled.diagnostics.of_kind(DiagnosticKind::Authoring).count(), 1);
    }

    #[test]
    fn disable_marker_turns_spa_sync_off() {
        let source = "<script lang=\"react\">\nimport Note from './Note'\n</script>\n\n<Note spa:sync-render:disable />\n";
        assert!(!compile(source).container.containers[0].use_spa_sync);
    }

    #[test]
    fn wrong_casing_is_left_verbatim() {
        let source = "<script lang=\"react\">\nimport HelloWorld from './HelloWorld'\n</script>\n\n<Helloworld />\n\n<HelloWorld />\n";
        let compiled = compile(source);
        assert!(compiled.code.contains("<Helloworld />"));
        assert_eq!(compiled.container.containers.len(), 1);
        assert_eq!(compiled.container.containers[0].component_name, "HelloWorld");
        assert_eq!(
            compiled.container.containers[0].render_id,
            RenderId::derive("docs/counter.md", 0)
        );
    }

    #[test]
    fn non_self_closing_never_compiles() {
        let source = "<script lang=\"react\">\nimport Comp from './Comp'\n</script>\n\n<Comp></Comp>\n";
        let compiled = compile(source);
        assert!(compiled.container.containers.is_empty());
        assert!(compiled.code.contains("<Comp></Comp>"));
    }

    #[test]
    fn malformed_script_degrades_to_no_components() {
        let source = "<script lang=\"react\">\nimport Counter from './Counter'\nconst x = 1\n</script>\n\n<Counter />\n";
        let compiled = compile(source);
        assert!(compiled.container.containers.is_empty());
        assert!(compiled.container.imports_by_local_name.is_empty());
        assert!(compiled.code.contains("<Counter />"));
        assert!(!compiled.code.contains("const x"));
        assert_eq!(compiled.code.lines().count(), source.lines().count());
        assert_eq!(compiled.diagnostics.of_kind(DiagnosticKind::Parse).count(), 1);
    }

    #[test]
    fn case_insensitive_duplicate_is_fatal() {
        let source = "<script lang=\"react\">\nimport Counter from './a'\nimport counter from './b'\n</script>\n";
        let err = compile_page(source, "p.md", &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, IslandsError::DuplicateImport { .. }));
    }

    #[test]
    fn unresolved_import_skips_its_containers() {
        let resolver = |specifier: &str, _: &str| {
            (!specifier.contains("missing")).then(|| format!("/src/{}", specifier.trim_start_matches("./")))
        };
        let source = "<script lang=\"react\">\nimport A from './A'\nimport B from './missing'\n</script>\n\n<A />\n\n<B />\n";
        let compiled =
            compile_page_with_resolver(source, "p.md", &CompileOptions::default(), &resolver).unwrap();
        assert_eq!(compiled.container.containers.len(), 1);
        assert_eq!(
            compiled.container.imports_by_local_name["A"].module,
            "/src/A"
        );
        assert!(compiled.code.contains("<B />"));
        assert_eq!(
            compiled.diagnostics.of_kind(DiagnosticKind::ImportResolution).count(),
            1
        );
    }

    #[test]
    fn props_are_escaped() {
        let source = "<script lang=\"react\">\nimport Card from './Card'\n</script>\n\n<Card title='Say \"hi\" &amp; <wave>' />\n";
        let compiled = compile(source);
        assert_eq!(
            compiled.container.containers[0].props.get("title"),
            Some(Some("Say \"hi\" & <wave>"))
        );
        assert!(compiled.code.contains("title=\"Say &quot;hi&quot; &amp; "));
        assert!(!compiled.code.contains("<wave>"));
    }

    #[test]
    fn idempotent_compilation() {
        let first = compile(COUNTER_PAGE);
        let second = compile(COUNTER_PAGE);
        assert_eq!(first.code, second.code);
        assert_eq!(first.directives(), second.directives());
    }

    #[test]
    fn ids_stable_across_prose_edits() {
        let edited = COUNTER_PAGE.replace("Some prose.", "Completely different prose,\nnow on two lines.");
        assert_eq!(
            compile(COUNTER_PAGE).directives().keys().collect::<Vec<_>>(),
            compile(&edited).directives().keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn tags_in_code_are_untouched() {
        let source = "<script lang=\"react\">\nimport Counter from './Counter'\n</script>\n\n```md\n<Counter />\n```\n\n`<Counter />`\n";
        let compiled = compile(source);
        assert!(compiled.container.containers.is_empty());
        assert!(compiled.code.contains("```md\n<Counter />\n```"));
    }

    #[test]
    fn inline_and_nested_occurrences_rewrite_back_to_front() {
        let source = "<script lang=\"react\">\nimport Badge from './Badge'\n</script>\n\nText <Badge label=\"a\" /> and <Badge label=\"b\" />.\n\n<div>\n<Badge label=\"c\" client:visible />\n</div>\n";
        let compiled = compile(source);
        let labels: Vec<_> = compiled
            .container
            .containers
            .iter()
            .map(|c| c.props.get("label").flatten().unwrap_or_default().to_string())
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        for container in &compiled.container.containers {
            assert!(compiled.code.contains(&container.to_html()));
        }
        assert_eq!(
            compiled.container.containers[2].render_directive,
            RenderDirective::ClientVisible
        );
    }

    #[test]
    fn frontmatter_can_disable_spa_default() {
        let source = "---\nislands:\n  spaSync: false\n---\n\n<script lang=\"react\">\nimport Note from './Note'\n</script>\n\n<Note />\n\n<Note spa:sr />\n";
        let compiled = compile(source);
        assert!(!compiled.container.containers[0].use_spa_sync);
        assert!(compiled.container.containers[1].use_spa_sync);
    }

    #[test]
    fn compiler_wide_spa_default() {
        let options = CompileOptions {
            default_spa_sync: false,
            ..CompileOptions::default()
        };
        let source = "<script lang=\"react\">\nimport Note from './Note'\n</script>\n\n<Note />\n";
        let compiled = compile_page(source, "p.md", &options).unwrap();
        assert!(!compiled.container.containers[0].use_spa_sync);

        let opted_in = format!("---\nislands:\n  spaSync: true\n---\n\n{}", source);
        let compiled = compile_page(&opted_in, "p.md", &options).unwrap();
        assert!(compiled.container.containers[0].use_spa_sync);
    }

    #[test]
    fn other_script_languages_are_left_alone() {
        let source = "<script lang=\"ts\">\nimport Counter from './Counter'\n</script>\n\n<Counter />\n";
        let compiled = compile(source);
        assert!(compiled.code.contains("<script lang=\"ts\">"));
        assert!(compiled.container.containers.is_empty());
    }

    #[test]
    fn transform_emits_source_map() {
        let output = transform(COUNTER_PAGE, "docs/counter.md").unwrap();
        let map: serde_json::Value = serde_json::from_str(output.map.as_deref().unwrap()).unwrap();
        assert_eq!(map["sources"][0], "docs/counter.md");
        assert_eq!(
            map["mappings"].as_str().unwrap().split(';').count(),
            output.code.split('\n').count()
        );
    }

    #[test]
    fn counter_container_markup() {
        let compiled = compile(COUNTER_PAGE);
        insta::assert_snapshot!(
            compiled.container.containers[0].to_html(),
            @r#"<div data-render-id="5a6cfaa6" data-render-directive="client:load" data-render-component="Counter" data-spa-sync="true" initial="3"></div>"#
        );
    }
}
