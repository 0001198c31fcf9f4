//! Two-phase page builds: a server-rendering pass followed by a browser pass.
//!
//! The phases are separate types so the browser pass can only start once
//! every server render has been recorded: spa-synced hydrating containers
//! reuse the CSS their server render resolved.

use crate::assets::{AssetSet, BuildOptions};
use crate::codegen::{client_entry_source, inject_only_script};
use crate::error::BuildError;
use crate::manifest::{ComponentBundleInfo, PageManifest, SiteManifest, SnippetMap, UsedSnippet};
use islands_core::{CompilationContainer, ImportBinding, Props, RenderDirective, RenderId};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Error type returned by external collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// A component as the collaborators see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRef<'a> {
    /// Page-local name.
    pub name: &'a str,
    /// Module binding.
    pub binding: &'a ImportBinding,
}

/// Output of one server render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedHtml {
    /// Rendered markup.
    pub html: String,
    /// Public stylesheet paths the markup depends on.
    pub css: BTreeSet<String>,
}

/// Renders a component to an HTML string.
pub trait ServerRenderer: Send + Sync {
    /// Renders `component` with `props`.
    fn render_to_string(
        &self,
        component: &ComponentRef<'_>,
        props: &Props,
    ) -> Result<RenderedHtml, CollaboratorError>;
}

/// What the browser bundler is asked to build for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    /// Page the entry belongs to.
    pub page_id: String,
    /// Entry module source.
    pub source: String,
    /// Components the entry imports.
    pub components: Vec<ComponentBundleInfo>,
}

/// Bundler output for one client entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    /// The loader (entry) chunk.
    pub code: String,
    /// Additional chunks by stem; emitted as module preloads.
    pub chunks: BTreeMap<String, String>,
    /// Stylesheets by stem.
    pub css: BTreeMap<String, String>,
}

/// Bundles a client entry.
pub trait ClientBundler: Send + Sync {
    /// Builds `entry`.
    fn bundle(&self, entry: &ClientEntry) -> Result<BundleOutput, CollaboratorError>;
}

/// One server render to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrJob<'a> {
    /// Container id.
    pub render_id: &'a RenderId,
    /// Component to render.
    pub component: ComponentRef<'a>,
    /// Container props.
    pub props: &'a Props,
}

/// Server-rendering phase of a page build.
#[derive(Debug, Clone)]
pub struct PageBuildPlan {
    page: CompilationContainer,
    infos: Vec<ComponentBundleInfo>,
    snippets: SnippetMap,
}

impl PageBuildPlan {
    /// Plans the build of a compiled page.
    pub fn new(page: &CompilationContainer) -> Self {
        let infos = ComponentBundleInfo::collect(page);
        let snippets = page
            .containers
            .iter()
            .filter(|c| page.imports_by_local_name.contains_key(&c.component_name))
            .map(|c| (c.render_id.clone(), UsedSnippet::from_container(c)))
            .collect();
        Self {
            page: page.clone(),
            infos,
            snippets,
        }
    }

    /// Component groups of the page.
    pub fn bundle_infos(&self) -> &[ComponentBundleInfo] {
        &self.infos
    }

    /// Snippets recorded so far.
    pub fn snippets(&self) -> &SnippetMap {
        &self.snippets
    }

    /// Renders still to perform: every non-`client:only` container of a
    /// component that is not exclusively `client:only`.
    pub fn ssr_jobs(&self) -> Vec<SsrJob<'_>> {
        let mut jobs = Vec::new();
        for info in self.infos.iter().filter(|i| !i.is_client_only()) {
            for id in &info.render_ids {
                let Some(snippet) = self.snippets.get(id) else {
                    continue;
                };
                if !snippet.directive.is_ssr_eligible() || snippet.html.is_some() {
                    continue;
                }
                jobs.push(SsrJob {
                    render_id: id,
                    component: ComponentRef {
                        name: &info.component_name,
                        binding: &info.binding,
                    },
                    props: &snippet.props,
                });
            }
        }
        jobs
    }

    /// Records the outcome of one render. Failures are logged and leave the
    /// slot empty.
    pub fn record_ssr(&mut self, render_id: &RenderId, result: Result<RenderedHtml, CollaboratorError>) {
        let Some(snippet) = self.snippets.get_mut(render_id) else {
            log::warn!("ignoring render result for unknown container {}", render_id);
            return;
        };
        match result {
            Ok(rendered) => {
                snippet.html = Some(rendered.html);
                snippet.css = Some(rendered.css);
            }
            Err(err) => {
                let err = BuildError::Render {
                    render_id: render_id.to_string(),
                    component: snippet.component_name.clone(),
                    message: err.to_string(),
                };
                log::warn!("{} (page {})", err, self.page.page_id);
            }
        }
    }

    /// Runs every pending render through `renderer`.
    pub fn run_ssr(&mut self, renderer: &dyn ServerRenderer) {
        let results: Vec<(RenderId, Result<RenderedHtml, CollaboratorError>)> = self
            .ssr_jobs()
            .into_iter()
            .map(|job| {
                (
                    job.render_id.clone(),
                    renderer.render_to_string(&job.component, job.props),
                )
            })
            .collect();
        for (id, result) in results {
            self.record_ssr(&id, result);
        }
    }

    /// Ends the server-rendering phase.
    pub fn into_browser_pass(self) -> BrowserPass {
        BrowserPass {
            page: self.page,
            infos: self.infos,
            snippets: self.snippets,
        }
    }
}

/// Browser phase of a page build.
#[derive(Debug, Clone)]
pub struct BrowserPass {
    page: CompilationContainer,
    infos: Vec<ComponentBundleInfo>,
    snippets: SnippetMap,
}

/// Everything a page build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBuildOutput {
    /// Page id.
    pub page_id: String,
    /// Browser assets of the page.
    pub manifest: PageManifest,
    /// Files the manifest refers to.
    pub assets: AssetSet,
    /// Per-container build records.
    pub snippets: SnippetMap,
}

impl BrowserPass {
    /// Snippets after the server pass.
    pub fn snippets(&self) -> &SnippetMap {
        &self.snippets
    }

    /// Entry for the bundler, or `None` when nothing on the page ships code.
    pub fn client_entry(&self) -> Option<ClientEntry> {
        let components: Vec<ComponentBundleInfo> = self
            .infos
            .iter()
            .filter(|i| !i.is_ssr_only())
            .cloned()
            .collect();
        if components.is_empty() {
            return None;
        }
        Some(ClientEntry {
            page_id: self.page.page_id.clone(),
            source: client_entry_source(&self.page, &self.infos),
            components,
        })
    }

    /// Stylesheets resolved by the server pass that the page must link:
    /// those of server-only containers, and of spa-synced hydrating
    /// containers so route transitions do not flash unstyled.
    pub fn ssr_css(&self) -> BTreeSet<String> {
        self.snippets
            .values()
            .filter(|s| {
                s.directive == RenderDirective::SsrOnly
                    || (s.use_spa_sync && s.directive.needs_hydration())
            })
            .filter_map(|s| s.css.as_ref())
            .flatten()
            .cloned()
            .collect()
    }

    /// Folds the bundle into the page manifest.
    pub fn finish(
        self,
        bundle: Option<BundleOutput>,
        options: &BuildOptions,
    ) -> Result<PageBuildOutput, BuildError> {
        let mut assets = AssetSet::new();
        let mut manifest = PageManifest::default();
        let mut css: BTreeSet<String> = self.ssr_css();

        match (self.client_entry().is_some(), bundle) {
            (true, Some(bundle)) => {
                manifest.loader_script =
                    Some(assets.add(options, "islands-loader", "js", bundle.code));
                for (stem, code) in bundle.chunks {
                    manifest.module_preloads.push(assets.add(options, &stem, "js", code));
                }
                for (stem, sheet) in bundle.css {
                    css.insert(assets.add(options, &stem, "css", sheet));
                }
            }
            (true, None) => {
                return Err(BuildError::Bundle {
                    page: self.page.page_id.clone(),
                    message: "page ships client components but no bundle was provided".into(),
                });
            }
            (false, Some(_)) => {
                log::debug!(
                    "ignoring bundle for {}: no component needs client code",
                    self.page.page_id
                );
            }
            (false, None) => {}
        }

        manifest.css_bundles = css.into_iter().collect();
        if let Some(script) = inject_only_script(&self.snippets) {
            manifest.inject_script = Some(assets.add(options, "islands-inject", "js", script));
        }

        Ok(PageBuildOutput {
            page_id: self.page.page_id,
            manifest,
            assets,
            snippets: self.snippets,
        })
    }
}

/// Site-wide build result.
#[derive(Debug, Default)]
pub struct SiteBuild {
    /// Page path → manifest, for the pages that built.
    pub manifest: SiteManifest,
    /// Union of every page's assets.
    pub assets: AssetSet,
    /// Page path → snippets.
    pub snippets: BTreeMap<String, SnippetMap>,
    /// Page path → error, for the pages that failed.
    pub failures: BTreeMap<String, BuildError>,
}

/// Drives page builds against the host's renderer and bundler.
pub struct Orchestrator<'a> {
    renderer: &'a dyn ServerRenderer,
    bundler: &'a dyn ClientBundler,
    options: BuildOptions,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator.
    pub fn new(
        renderer: &'a dyn ServerRenderer,
        bundler: &'a dyn ClientBundler,
        options: BuildOptions,
    ) -> Self {
        Self {
            renderer,
            bundler,
            options,
        }
    }

    /// Build options in use.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds one page: server pass, then browser pass.
    pub fn build_page(&self, page: &CompilationContainer) -> Result<PageBuildOutput, BuildError> {
        let mut plan = PageBuildPlan::new(page);
        plan.run_ssr(self.renderer);
        let browser = plan.into_browser_pass();

        let bundle = match browser.client_entry() {
            Some(entry) => Some(self.bundler.bundle(&entry).map_err(|err| BuildError::Bundle {
                page: page.page_id.clone(),
                message: err.to_string(),
            })?),
            None => None,
        };
        let output = browser.finish(bundle, &self.options)?;
        log::debug!(
            "built {}: {} snippet(s), {} asset(s)",
            output.page_id,
            output.snippets.len(),
            output.assets.len()
        );
        Ok(output)
    }

    /// Builds pages in parallel. A failing page is reported in
    /// [`SiteBuild::failures`] and leaves every other page untouched.
    pub fn build_site(&self, pages: &[CompilationContainer]) -> SiteBuild {
        let results: Vec<(String, Result<PageBuildOutput, BuildError>)> = pages
            .par_iter()
            .map(|page| (page.page_id.clone(), self.build_page(page)))
            .collect();

        let mut site = SiteBuild::default();
        for (page_id, result) in results {
            match result {
                Ok(output) => {
                    site.manifest.insert(page_id.clone(), output.manifest);
                    site.assets.extend(output.assets);
                    site.snippets.insert(page_id, output.snippets);
                }
                Err(err) => {
                    log::warn!("page {} failed to build: {}", page_id, err);
                    site.failures.insert(page_id, err);
                }
            }
        }
        site
    }
}
