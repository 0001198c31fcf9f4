//! Dev-server side of live editing.
//!
//! [`DevSession`] recompiles edited pages, publishes them to the
//! [`CompilationStore`] and answers the browser runtime's render requests
//! with server-rendered container markup. Each operation has a `prepare_*`
//! half that decides what to render, so hosts that render on their own side
//! can fill in the HTML and call [`PageUpdate::into_event`].

use crate::error::BuildError;
use crate::orchestrator::{ComponentRef, ServerRenderer};
use crate::store::CompilationStore;
use islands_core::{
    CompilationContainer, CompileOptions, ModuleResolver, PassThroughResolver, RenderContainer,
    RenderDirective, RenderId, compile_page_with_resolver,
};
use islands_runtime::{ClientEvent, RenderItem, RenderedMap, ServerEvent, UpdateType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Who handles a changed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HotUpdatePolicy {
    /// The host's usual hot update.
    HostDefault,
    /// Handled through the islands channel; the host must not reload.
    Owned,
}

/// Module resolver usable from the session.
pub type SharedResolver = Arc<dyn ModuleResolver + Send + Sync>;

/// An update waiting for its server-rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    /// Page the update concerns.
    pub page_id: String,
    /// Event kind the update turns into.
    pub update_type: UpdateType,
    /// Containers to render on the server.
    pub render: Vec<RenderItem>,
    /// Containers that changed or appeared.
    pub updates: Vec<RenderId>,
    /// Containers that disappeared.
    pub removals: Vec<RenderId>,
    /// Local names whose import was deleted.
    pub missing_imports: BTreeSet<String>,
}

impl PageUpdate {
    fn new(page_id: &str, update_type: UpdateType) -> Self {
        Self {
            page_id: page_id.to_string(),
            update_type,
            render: Vec::new(),
            updates: Vec::new(),
            removals: Vec::new(),
            missing_imports: BTreeSet::new(),
        }
    }

    /// Completes the update with the rendered markup. Entries for ids that
    /// were not asked for are dropped.
    pub fn into_event(self, mut rendered: RenderedMap) -> ServerEvent {
        rendered.retain(|id, _| self.render.iter().any(|item| &item.render_id == id));
        let page_id = self.page_id;
        match self.update_type {
            UpdateType::Mount => ServerEvent::Mount { page_id, rendered },
            UpdateType::MarkdownUpdate => ServerEvent::MarkdownUpdate {
                page_id,
                rendered,
                updates: self.updates,
                removals: self.removals,
                missing_imports: self.missing_imports,
            },
            UpdateType::SsrOnlyUpdate => ServerEvent::SsrOnlyUpdate { page_id, rendered },
        }
    }
}

/// Live-edit state for one dev server.
#[derive(Clone, Default)]
pub struct DevSession {
    options: CompileOptions,
    store: CompilationStore,
    renderer: Option<Arc<dyn ServerRenderer>>,
    resolver: Option<SharedResolver>,
}

impl DevSession {
    /// Session with default compile options, the pass-through resolver and
    /// no renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders containers with `renderer`.
    pub fn with_renderer(mut self, renderer: Arc<dyn ServerRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replaces the compile options.
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the module resolver.
    pub fn with_resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Shares an existing store.
    pub fn with_store(mut self, store: CompilationStore) -> Self {
        self.store = store;
        self
    }

    /// The compilation store this session publishes to.
    pub fn store(&self) -> &CompilationStore {
        &self.store
    }

    /// Compile options in use.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Recompiles an edited page and publishes it.
    ///
    /// The first compilation of a page prepares a [`UpdateType::Mount`] of
    /// every server-eligible container. Later ones prepare a
    /// [`UpdateType::MarkdownUpdate`] listing what changed or disappeared.
    pub fn prepare_page_update(
        &self,
        page_id: &str,
        source: &str,
    ) -> Result<PageUpdate, BuildError> {
        let resolver: &dyn ModuleResolver = match &self.resolver {
            Some(resolver) => resolver.as_ref(),
            None => &PassThroughResolver,
        };
        let compiled = compile_page_with_resolver(source, page_id, &self.options, resolver)?;
        let next = compiled.container;
        let previous = self.store.publish(next.clone());

        let Some(previous) = previous else {
            let mut update = PageUpdate::new(page_id, UpdateType::Mount);
            update.render = render_items(next.containers.iter());
            return Ok(update);
        };

        let changed = changed_containers(&previous, &next);
        let mut update = PageUpdate::new(page_id, UpdateType::MarkdownUpdate);
        update.render = render_items(changed.iter().copied());
        update.updates = changed.iter().map(|c| c.render_id.clone()).collect();
        update.removals = previous
            .containers
            .iter()
            .filter(|c| next.container(&c.render_id).is_none())
            .map(|c| c.render_id.clone())
            .collect();
        update.missing_imports = next.missing_imports(&previous.imports_by_local_name);

        log::debug!(
            "{} changed: {} update(s), {} removal(s)",
            page_id,
            update.updates.len(),
            update.removals.len()
        );
        Ok(update)
    }

    /// [`prepare_page_update`](Self::prepare_page_update), rendered.
    pub fn on_page_changed(&self, page_id: &str, source: &str) -> Result<ServerEvent, BuildError> {
        let update = self.prepare_page_update(page_id, source)?;
        Ok(self.render_update(update))
    }

    /// A page was deleted or left the module graph.
    pub fn on_page_removed(&self, page_id: &str) -> Option<Arc<CompilationContainer>> {
        self.store.invalidate(page_id, "page removed")
    }

    /// Validates a browser render request against the stored page.
    /// `client:only` containers and unknown ids are dropped.
    pub fn prepare_render_request(&self, request: &ClientEvent) -> Result<PageUpdate, BuildError> {
        let ClientEvent::RenderRequest {
            page_id,
            update_type,
            items,
        } = request;
        let page = self
            .store
            .get(page_id)
            .ok_or_else(|| BuildError::UnknownPage(page_id.clone()))?;

        let mut update = PageUpdate::new(page_id, *update_type);
        for item in items {
            match page.container(&item.render_id) {
                Some(c) if c.render_directive == RenderDirective::ClientOnly => {
                    log::debug!("not rendering client:only container {}", item.render_id);
                }
                Some(_) => update.render.push(item.clone()),
                None => log::debug!("{} has no container {}", page_id, item.render_id),
            }
        }
        if *update_type == UpdateType::MarkdownUpdate {
            update.updates = update.render.iter().map(|i| i.render_id.clone()).collect();
        }
        Ok(update)
    }

    /// Answers a browser render request with the matching inbound kind.
    /// Containers that fail to render are left out of the answer.
    pub fn on_render_request(&self, request: &ClientEvent) -> Result<ServerEvent, BuildError> {
        let update = self.prepare_render_request(request)?;
        Ok(self.render_update(update))
    }

    /// `ssr:only` patches for pages whose only use of `module` is through
    /// `ssr:only` containers.
    pub fn prepare_component_updates(&self, module: &str) -> Vec<PageUpdate> {
        self.store
            .pages_importing(module)
            .into_iter()
            .filter(|page| uses_module_only_server_side(page, module))
            .map(|page| {
                let names = local_names_for(&page, module);
                let mut update = PageUpdate::new(&page.page_id, UpdateType::SsrOnlyUpdate);
                update.render = render_items(
                    page.containers
                        .iter()
                        .filter(|c| names.contains(c.component_name.as_str())),
                );
                update
            })
            .collect()
    }

    /// [`prepare_component_updates`](Self::prepare_component_updates), rendered.
    pub fn on_component_changed(&self, module: &str) -> Vec<ServerEvent> {
        self.prepare_component_updates(module)
            .into_iter()
            .map(|update| self.render_update(update))
            .collect()
    }

    /// Whether the host or the islands channel handles a change to `module`.
    ///
    /// Pages themselves are owned, as are modules every importing page uses
    /// only through `ssr:only` containers. Everything else keeps the host's
    /// default hot update.
    pub fn hot_update_policy(&self, module: &str) -> HotUpdatePolicy {
        if self.store.contains(module) {
            return HotUpdatePolicy::Owned;
        }
        let pages = self.store.pages_importing(module);
        if !pages.is_empty() && pages.iter().all(|p| uses_module_only_server_side(p, module)) {
            HotUpdatePolicy::Owned
        } else {
            HotUpdatePolicy::HostDefault
        }
    }

    /// The stored compilation of `page_id`, or the next one published
    /// within `timeout`.
    pub async fn compiled(
        &self,
        page_id: &str,
        timeout: Duration,
    ) -> Result<Arc<CompilationContainer>, BuildError> {
        Ok(self.store.get_or_wait(page_id, timeout).await?)
    }

    fn render_update(&self, update: PageUpdate) -> ServerEvent {
        let rendered: RenderedMap = match (&self.renderer, self.store.get(&update.page_id)) {
            (Some(renderer), Some(page)) => update
                .render
                .iter()
                .filter_map(|item| {
                    let html = render_item(renderer.as_ref(), &page, item)?;
                    Some((item.render_id.clone(), html))
                })
                .collect(),
            (None, _) => {
                log::debug!("no renderer; {} container(s) left unrendered", update.render.len());
                RenderedMap::new()
            }
            (Some(_), None) => RenderedMap::new(),
        };
        update.into_event(rendered)
    }
}

fn render_items<'c>(containers: impl Iterator<Item = &'c RenderContainer>) -> Vec<RenderItem> {
    containers
        .filter(|c| c.render_directive.is_ssr_eligible())
        .map(|c| RenderItem {
            render_id: c.render_id.clone(),
            component_name: c.component_name.clone(),
            props: c.props.clone(),
        })
        .collect()
}

fn render_item(
    renderer: &dyn ServerRenderer,
    page: &CompilationContainer,
    item: &RenderItem,
) -> Option<String> {
    let Some(binding) = page.imports_by_local_name.get(&item.component_name) else {
        log::warn!(
            "{}: {} ({}) has no import binding",
            page.page_id,
            item.component_name,
            item.render_id
        );
        return None;
    };
    let component = ComponentRef {
        name: &item.component_name,
        binding,
    };
    match renderer.render_to_string(&component, &item.props) {
        Ok(rendered) => Some(rendered.html),
        Err(err) => {
            log::warn!(
                "{}",
                BuildError::Render {
                    render_id: item.render_id.to_string(),
                    component: item.component_name.clone(),
                    message: err.to_string(),
                }
            );
            None
        }
    }
}

/// Containers that are new, changed, or whose component binding changed.
fn changed_containers<'n>(
    previous: &CompilationContainer,
    next: &'n CompilationContainer,
) -> Vec<&'n RenderContainer> {
    let before: BTreeMap<&RenderId, &RenderContainer> = previous
        .containers
        .iter()
        .map(|c| (&c.render_id, c))
        .collect();
    next.containers
        .iter()
        .filter(|c| {
            let same_binding = previous.imports_by_local_name.get(&c.component_name)
                == next.imports_by_local_name.get(&c.component_name);
            before.get(&c.render_id) != Some(c) || !same_binding
        })
        .collect()
}

fn local_names_for<'p>(page: &'p CompilationContainer, module: &str) -> BTreeSet<&'p str> {
    page.imports_by_local_name
        .iter()
        .filter(|(_, binding)| binding.module == module)
        .map(|(name, _)| name.as_str())
        .collect()
}

fn uses_module_only_server_side(page: &CompilationContainer, module: &str) -> bool {
    let names = local_names_for(page, module);
    !names.is_empty()
        && names
            .iter()
            .all(|name| page.ssr_only_component_names.contains(*name))
}
