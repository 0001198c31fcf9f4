//! Page manifests and the per-container build records they are derived from.

use islands_core::{CompilationContainer, ImportBinding, RenderDirective, RenderId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use islands_core::{SnippetMap, UsedSnippet};

/// File name of the site manifest inside the output directory.
pub const SITE_MANIFEST_FILE: &str = "islands-manifest.json";

/// What the orchestrator needs to know about one component on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentBundleInfo {
    /// Page-local component name.
    pub component_name: String,
    /// Module binding the name resolves to.
    pub binding: ImportBinding,
    /// Containers using the component, in document order.
    pub render_ids: Vec<RenderId>,
    /// Every directive the component is used with on this page.
    pub directives: BTreeSet<RenderDirective>,
}

impl ComponentBundleInfo {
    /// Groups a page's containers by component name.
    pub fn collect(page: &CompilationContainer) -> Vec<Self> {
        let mut by_name: BTreeMap<&str, ComponentBundleInfo> = BTreeMap::new();
        for container in &page.containers {
            let Some(binding) = page.imports_by_local_name.get(&container.component_name) else {
                continue;
            };
            let info = by_name
                .entry(container.component_name.as_str())
                .or_insert_with(|| ComponentBundleInfo {
                    component_name: container.component_name.clone(),
                    binding: binding.clone(),
                    render_ids: Vec::new(),
                    directives: BTreeSet::new(),
                });
            info.render_ids.push(container.render_id.clone());
            info.directives.insert(container.render_directive);
        }
        by_name.into_values().collect()
    }

    /// Used only with `client:only`; never server-rendered.
    pub fn is_client_only(&self) -> bool {
        self.directives.iter().all(|d| *d == RenderDirective::ClientOnly)
    }

    /// Used only with `ssr:only`; never shipped to the browser.
    pub fn is_ssr_only(&self) -> bool {
        self.directives.iter().all(|d| *d == RenderDirective::SsrOnly)
    }
}

/// Assets one page needs in the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageManifest {
    /// Loader script path; absent when nothing on the page needs client code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_script: Option<String>,
    /// Module-preload paths.
    #[serde(default)]
    pub module_preloads: Vec<String>,
    /// Stylesheet paths.
    #[serde(default)]
    pub css_bundles: Vec<String>,
    /// Script patching `ssr:only` containers without loading their modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_script: Option<String>,
}

/// Page path → page manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteManifest {
    pages: BTreeMap<String, PageManifest>,
}

impl SiteManifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a page entry.
    pub fn insert(&mut self, page: impl Into<String>, manifest: PageManifest) {
        self.pages.insert(page.into(), manifest);
    }

    /// Looks up a page.
    pub fn get(&self, page: &str) -> Option<&PageManifest> {
        self.pages.get(page)
    }

    /// Pages in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PageManifest)> {
        self.pages.iter()
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no page is recorded.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pretty JSON, stable across runs.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a manifest file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
