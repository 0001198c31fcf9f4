//! Rewrites host-rendered page HTML: server output goes into its container
//! and the page's assets are linked from `<head>` and `<body>`.

use crate::manifest::{PageManifest, SnippetMap};
use islands_core::directive::RENDER_ID_ATTR;
use lol_html::html_content::ContentType;
use lol_html::{ElementContentHandlers, RewriteStrSettings, Selector, element, rewrite_str};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

type Handler = (Cow<'static, Selector>, ElementContentHandlers<'static>);

/// Builder for the handlers of one injection.
#[derive(Default)]
pub struct InjectionHandlers {
    handlers: Vec<Handler>,
}

impl InjectionHandlers {
    /// Creates an empty handler list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills each container from its snippet's server HTML.
    pub fn with_snippets(mut self, snippets: &SnippetMap) -> Self {
        let html: HashMap<String, String> = snippets
            .iter()
            .filter(|(_, s)| s.directive.is_ssr_eligible())
            .filter_map(|(id, s)| Some((id.to_string(), s.html.clone()?)))
            .collect();
        if html.is_empty() {
            return self;
        }
        let selector = format!("div[{}]", RENDER_ID_ATTR);
        self.handlers.push(element!(selector, move |el| {
            if let Some(id) = el.get_attribute(RENDER_ID_ATTR)
                && let Some(markup) = html.get(&id)
            {
                el.set_inner_content(markup, ContentType::Html);
            }
            Ok(())
        }));
        self
    }

    /// Links the manifest's stylesheets and preloads from `<head>` and its
    /// scripts from the end of `<body>`.
    pub fn with_manifest(mut self, manifest: &PageManifest) -> Self {
        let mut head = String::new();
        for href in &manifest.css_bundles {
            let _ = write!(head, "<link rel=\"stylesheet\" href=\"{}\">", attr(href));
        }
        for href in manifest.loader_script.iter().chain(&manifest.module_preloads) {
            let _ = write!(head, "<link rel=\"modulepreload\" href=\"{}\">", attr(href));
        }

        let mut body = String::new();
        for src in manifest.loader_script.iter().chain(&manifest.inject_script) {
            let _ = write!(body, "<script type=\"module\" src=\"{}\"></script>", attr(src));
        }

        if !head.is_empty() {
            self.handlers.push(element!("head", move |el| {
                el.append(&head, ContentType::Html);
                Ok(())
            }));
        }
        if !body.is_empty() {
            self.handlers.push(element!("body", move |el| {
                el.append(&body, ContentType::Html);
                Ok(())
            }));
        }
        self
    }

    /// Converts into the handler vector.
    pub fn into_vec(self) -> Vec<Handler> {
        self.handlers
    }
}

fn attr(value: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}

/// Injects server output and asset links into a rendered page.
///
/// Falls back to the input unchanged if the rewriter rejects it.
pub fn inject_page_html(html: &str, manifest: &PageManifest, snippets: &SnippetMap) -> String {
    let handlers = InjectionHandlers::new()
        .with_snippets(snippets)
        .with_manifest(manifest)
        .into_vec();
    if handlers.is_empty() {
        return html.to_string();
    }
    match rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    ) {
        Ok(output) => output,
        Err(err) => {
            log::warn!("HTML injection failed, page left as rendered: {}", err);
            html.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::UsedSnippet;
    use islands_core::{Props, RenderContainer, RenderDirective, RenderId};

    fn snippet(i: usize, directive: RenderDirective, html: Option<&str>) -> (RenderId, UsedSnippet) {
        let container = RenderContainer {
            render_id: RenderId::derive("index.md", i),
            render_directive: directive,
            component_name: "Counter".into(),
            use_spa_sync: true,
            props: Props::new(),
        };
        let mut snippet = UsedSnippet::from_container(&container);
        snippet.html = html.map(str::to_string);
        (container.render_id.clone(), snippet)
    }

    fn page(snippets: &SnippetMap) -> String {
        let mut body = String::new();
        for id in snippets.keys() {
            body.push_str(&format!("<div data-render-id=\"{}\"></div>", id));
        }
        format!("<html><head><title>x</title></head><body>{}</body></html>", body)
    }

    #[test]
    fn injects_server_html_into_containers() {
        let snippets: SnippetMap = [
            snippet(0, RenderDirective::ClientLoad, Some("<button>3</button>")),
            snippet(1, RenderDirective::ClientOnly, Some("<b>never</b>")),
        ]
        .into_iter()
        .collect();
        let output = inject_page_html(&page(&snippets), &PageManifest::default(), &snippets);
        assert!(output.contains("<button>3</button></div>"));
        assert!(!output.contains("never"));
    }

    #[test]
    fn links_assets() {
        let manifest = PageManifest {
            loader_script: Some("/assets/islands-loader.1234abcd.js".into()),
            module_preloads: vec!["/assets/react.0000ffff.js".into()],
            css_bundles: vec!["/css/Counter.css".into()],
            inject_script: None,
        };
        let output = inject_page_html(&page(&SnippetMap::new()), &manifest, &SnippetMap::new());
        assert!(output.contains("<title>x</title><link rel=\"stylesheet\" href=\"/css/Counter.css\">"));
        assert!(output.contains("<link rel=\"modulepreload\" href=\"/assets/react.0000ffff.js\"></head>"));
        assert!(output.contains(
            "<script type=\"module\" src=\"/assets/islands-loader.1234abcd.js\"></script></body>"
        ));
    }

    #[test]
    fn nothing_to_inject_is_identity() {
        let html = "<p>plain</p>";
        assert_eq!(inject_page_html(html, &PageManifest::default(), &SnippetMap::new()), html);
    }
}
