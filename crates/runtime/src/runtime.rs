//! The client runtime as a state machine: the host feeds it events and
//! executes the effects it returns.

use crate::RuntimeError;
use crate::channel::{ClientEvent, RenderItem, ServerEvent, UpdateType};
use crate::reconciler::{
    ComponentRegistry, ElementRecord, ReconcileAction, ReconcilePlan, client_registry,
    initial_records,
};
use islands_core::{
    CompilationContainer, ImportBinding, RenderContainer, RenderDirective, RenderId, SnippetMap,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lifecycle of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerState {
    /// Nothing scheduled; `ssr:only` containers stay here.
    Unmounted,
    /// Waiting to enter the viewport.
    Observed,
    /// Waiting for the framework, the module, server HTML, or the host.
    Pending,
    /// Rendered or hydrated.
    Settled,
    /// Client rendering failed.
    Failed,
}

/// How a container is brought to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountMode {
    /// Clear the server content and mount a fresh root.
    Render,
    /// Attach to the server-rendered markup.
    Hydrate,
}

/// What a directive handler wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Stay put.
    Stay,
    /// Watch the container for visibility.
    Observe,
    /// Load and mount.
    Activate(MountMode),
}

/// Per-directive behavior.
pub trait DirectiveHandler: Send + Sync {
    /// Directive handled.
    fn directive(&self) -> RenderDirective;

    /// First sight of a container.
    fn on_discover(&self) -> Step;

    /// The container entered the viewport.
    fn on_intersect(&self) -> Step {
        Step::Stay
    }
}

struct SsrOnly;
struct ClientOnly;
struct ClientLoad;
struct ClientVisible;

impl DirectiveHandler for SsrOnly {
    fn directive(&self) -> RenderDirective {
        RenderDirective::SsrOnly
    }

    fn on_discover(&self) -> Step {
        Step::Stay
    }
}

impl DirectiveHandler for ClientOnly {
    fn directive(&self) -> RenderDirective {
        RenderDirective::ClientOnly
    }

    fn on_discover(&self) -> Step {
        Step::Activate(MountMode::Render)
    }
}

impl DirectiveHandler for ClientLoad {
    fn directive(&self) -> RenderDirective {
        RenderDirective::ClientLoad
    }

    fn on_discover(&self) -> Step {
        Step::Activate(MountMode::Hydrate)
    }
}

impl DirectiveHandler for ClientVisible {
    fn directive(&self) -> RenderDirective {
        RenderDirective::ClientVisible
    }

    fn on_discover(&self) -> Step {
        Step::Observe
    }

    fn on_intersect(&self) -> Step {
        Step::Activate(MountMode::Hydrate)
    }
}

/// Handler table indexed by [`RenderDirective::index`].
pub type HandlerTable = [Box<dyn DirectiveHandler>; RenderDirective::ALL.len()];

/// The built-in handlers.
pub fn default_handlers() -> HandlerTable {
    let table: HandlerTable = [
        Box::new(SsrOnly),
        Box::new(ClientOnly),
        Box::new(ClientLoad),
        Box::new(ClientVisible),
    ];
    debug_assert!(
        table
            .iter()
            .enumerate()
            .all(|(i, h)| h.directive().index() == i)
    );
    table
}

/// Work for the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "camelCase")]
pub enum Effect {
    /// Import the UI framework.
    LoadFramework,
    /// Import a component module.
    #[serde(rename_all = "camelCase")]
    LoadModule {
        /// Memoization key (`module#symbol`).
        key: String,
        /// What to import.
        binding: ImportBinding,
    },
    /// Start watching a container for visibility.
    #[serde(rename_all = "camelCase")]
    Observe {
        /// Container id.
        render_id: RenderId,
    },
    /// Stop watching a container.
    #[serde(rename_all = "camelCase")]
    Unobserve {
        /// Container id.
        render_id: RenderId,
    },
    /// Clear the container and mount a fresh root.
    #[serde(rename_all = "camelCase")]
    Render {
        /// Container id.
        render_id: RenderId,
        /// Registry key of the component.
        component_name: String,
        /// Props as JSON.
        props: JsonValue,
    },
    /// Hydrate the server markup in the container.
    #[serde(rename_all = "camelCase")]
    Hydrate {
        /// Container id.
        render_id: RenderId,
        /// Registry key of the component.
        component_name: String,
        /// Props as JSON.
        props: JsonValue,
    },
    /// Re-render the live root with new props.
    #[serde(rename_all = "camelCase")]
    UpdateProps {
        /// Container id.
        render_id: RenderId,
        /// Props as JSON.
        props: JsonValue,
    },
    /// Replace the container's inner HTML.
    #[serde(rename_all = "camelCase")]
    PatchHtml {
        /// Container id.
        render_id: RenderId,
        /// New markup.
        html: String,
    },
    /// Move the previously rendered node over the new placeholder.
    #[serde(rename_all = "camelCase")]
    ReuseNode {
        /// Container id.
        render_id: RenderId,
    },
    /// Unmount and detach the element.
    #[serde(rename_all = "camelCase")]
    Detach {
        /// Container id.
        render_id: RenderId,
    },
    /// Send a message on the dev channel.
    Send {
        /// Message to send.
        event: ClientEvent,
    },
    /// Reject every pending subscription of a page.
    #[serde(rename_all = "camelCase")]
    CancelSubscriptions {
        /// Page whose subscriptions end.
        page_id: String,
        /// Rejection reason.
        reason: String,
    },
    /// Prefetch assets of other pages.
    Prefetch {
        /// Asset paths.
        paths: Vec<String>,
    },
}

/// Input from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RuntimeEvent {
    /// The framework import finished.
    FrameworkLoaded,
    /// A component module import finished.
    ModuleLoaded {
        /// Memoization key.
        key: String,
    },
    /// A component module import failed.
    ModuleFailed {
        /// Memoization key.
        key: String,
        /// Failure message.
        reason: String,
    },
    /// A container entered the viewport.
    #[serde(rename_all = "camelCase")]
    Intersected {
        /// Container id.
        render_id: RenderId,
    },
    /// A mount finished.
    #[serde(rename_all = "camelCase")]
    Mounted {
        /// Container id.
        render_id: RenderId,
    },
    /// Hydration threw.
    #[serde(rename_all = "camelCase")]
    HydrationFailed {
        /// Container id.
        render_id: RenderId,
        /// Failure message.
        reason: String,
    },
    /// A fresh render threw.
    #[serde(rename_all = "camelCase")]
    RenderFailed {
        /// Container id.
        render_id: RenderId,
        /// Failure message.
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
struct Entry {
    container: RenderContainer,
    state: ContainerState,
    mode: Option<MountMode>,
    awaiting_html: bool,
    /// The server answered without markup; hydration has nothing to attach to.
    without_markup: bool,
}

impl Entry {
    fn new(container: RenderContainer) -> Self {
        Self {
            container,
            state: ContainerState::Unmounted,
            mode: None,
            awaiting_html: false,
            without_markup: false,
        }
    }
}

/// Directive state machine for the current page.
pub struct ClientRuntime {
    handlers: HandlerTable,
    page_id: String,
    entries: BTreeMap<RenderId, Entry>,
    registry: Arc<ComponentRegistry>,
    imports: BTreeMap<String, ImportBinding>,
    records: BTreeMap<RenderId, ElementRecord>,
    framework: Option<LoadState>,
    modules: HashMap<String, LoadState>,
    prefetch: Vec<String>,
    prefetched: bool,
}

impl Default for ClientRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRuntime {
    /// Runtime with the built-in handlers.
    pub fn new() -> Self {
        Self::with_handlers(default_handlers())
    }

    /// Runtime with a custom handler table.
    pub fn with_handlers(handlers: HandlerTable) -> Self {
        Self {
            handlers,
            page_id: String::new(),
            entries: BTreeMap::new(),
            registry: Arc::new(ComponentRegistry::new()),
            imports: BTreeMap::new(),
            records: BTreeMap::new(),
            framework: None,
            modules: HashMap::new(),
            prefetch: Vec::new(),
            prefetched: false,
        }
    }

    /// Current page.
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Current registry. Replaced as a whole, never mutated in place.
    pub fn registry(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.registry)
    }

    /// State of a container.
    pub fn state(&self, render_id: &RenderId) -> Option<ContainerState> {
        self.entries.get(render_id).map(|e| e.state)
    }

    /// Records of what is currently rendered, for the next reconciliation.
    pub fn records(&self) -> &BTreeMap<RenderId, ElementRecord> {
        &self.records
    }

    /// Import map the current page was compiled with.
    pub fn imports(&self) -> &BTreeMap<String, ImportBinding> {
        &self.imports
    }

    /// Asset paths to prefetch once the page settles.
    pub fn set_prefetch(&mut self, paths: Vec<String>) {
        self.prefetch = paths;
        self.prefetched = false;
    }

    /// Takes over a page on initial load.
    pub fn discover(&mut self, page: &CompilationContainer) -> Vec<Effect> {
        self.install_page(page);
        let ids: Vec<RenderId> = self.entries.keys().cloned().collect();
        let mut effects = Vec::new();
        for id in ids {
            self.run_discover(&id, &mut effects);
        }
        self.maybe_prefetch(&mut effects);
        effects
    }

    /// Same-app navigation to `page`.
    ///
    /// In-flight work of the previous page is cancelled first. Spa-synced
    /// containers (never `client:only`) are then patched from their build
    /// snippets before the generic discovery runs for everything.
    pub fn navigate(&mut self, page: &CompilationContainer, snippets: &SnippetMap) -> Vec<Effect> {
        let mut effects = self.cancel_in_flight("navigation cancelled");
        self.install_page(page);

        for (id, entry) in &self.entries {
            let Some(snippet) = snippets.get(id) else {
                continue;
            };
            if !entry.container.use_spa_sync
                || entry.container.render_directive == RenderDirective::ClientOnly
            {
                continue;
            }
            if let Some(html) = &snippet.html {
                effects.push(Effect::PatchHtml {
                    render_id: id.clone(),
                    html: html.clone(),
                });
            }
        }

        let ids: Vec<RenderId> = self.entries.keys().cloned().collect();
        for id in ids {
            self.run_discover(&id, &mut effects);
        }
        self.maybe_prefetch(&mut effects);
        effects
    }

    /// Feeds one host event.
    pub fn handle(&mut self, event: RuntimeEvent) -> Result<Vec<Effect>, RuntimeError> {
        let mut effects = Vec::new();
        match event {
            RuntimeEvent::FrameworkLoaded => {
                self.framework = Some(LoadState::Ready);
                self.flush_pending(&mut effects);
            }
            RuntimeEvent::ModuleLoaded { key } => {
                self.modules.insert(key, LoadState::Ready);
                self.flush_pending(&mut effects);
            }
            RuntimeEvent::ModuleFailed { key, reason } => {
                log::warn!("component module {} failed to load: {}", key, reason);
                self.modules.insert(key.clone(), LoadState::Failed);
                for entry in self.entries.values_mut() {
                    if entry.state == ContainerState::Pending
                        && self
                            .registry
                            .get(&entry.container.component_name)
                            .is_some_and(|b| b.load_key() == key)
                    {
                        entry.state = ContainerState::Failed;
                    }
                }
            }
            RuntimeEvent::Intersected { render_id } => {
                let entry = self
                    .entries
                    .get(&render_id)
                    .ok_or_else(|| RuntimeError::UnknownContainer(render_id.clone()))?;
                let step = if entry.state == ContainerState::Observed {
                    self.handler(entry.container.render_directive).on_intersect()
                } else {
                    Step::Stay
                };
                if step != Step::Stay {
                    effects.push(Effect::Unobserve {
                        render_id: render_id.clone(),
                    });
                    self.apply_step(&render_id, step, &mut effects);
                }
            }
            RuntimeEvent::Mounted { render_id } => {
                let entry = self
                    .entries
                    .get_mut(&render_id)
                    .ok_or(RuntimeError::UnknownContainer(render_id))?;
                entry.state = ContainerState::Settled;
                self.maybe_prefetch(&mut effects);
            }
            RuntimeEvent::HydrationFailed { render_id, reason } => {
                log::warn!(
                    "hydration of {} failed, falling back to a client render: {}",
                    render_id,
                    reason
                );
                if let Some(entry) = self.entries.get_mut(&render_id) {
                    entry.mode = Some(MountMode::Render);
                    entry.state = ContainerState::Pending;
                    effects.push(mount_effect(&entry.container, MountMode::Render));
                }
            }
            RuntimeEvent::RenderFailed { render_id, reason } => {
                log::warn!("client render of {} failed: {}", render_id, reason);
                if let Some(entry) = self.entries.get_mut(&render_id) {
                    entry.state = ContainerState::Failed;
                }
                self.maybe_prefetch(&mut effects);
            }
        }
        Ok(effects)
    }

    /// Decodes and feeds one dev-channel payload.
    pub fn handle_server_message(&mut self, json: &str) -> Result<Vec<Effect>, RuntimeError> {
        let event = ServerEvent::from_json(json)?;
        self.handle_server_event(&event)
    }

    /// Feeds one dev-channel message. Events for another page are rejected
    /// with [`RuntimeError::StalePage`] and change nothing.
    pub fn handle_server_event(&mut self, event: &ServerEvent) -> Result<Vec<Effect>, RuntimeError> {
        if event.page_id() != self.page_id {
            return Err(RuntimeError::StalePage {
                event_page: event.page_id().to_string(),
                current_page: self.page_id.clone(),
            });
        }
        let mut effects = Vec::new();

        if let ServerEvent::MarkdownUpdate { removals, .. } = event {
            for render_id in removals {
                if self.entries.remove(render_id).is_some() {
                    self.records.remove(render_id);
                    effects.push(Effect::Detach {
                        render_id: render_id.clone(),
                    });
                }
            }
        }

        for (render_id, html) in event.rendered() {
            let Some(entry) = self.entries.get_mut(render_id) else {
                continue;
            };
            if entry.container.render_directive == RenderDirective::ClientOnly {
                continue;
            }
            effects.push(Effect::PatchHtml {
                render_id: render_id.clone(),
                html: html.clone(),
            });
            entry.without_markup = false;
            if entry.awaiting_html {
                entry.awaiting_html = false;
                self.run_discover(render_id, &mut effects);
            }
        }

        // Updated containers the server could not render mount client-side.
        if let ServerEvent::MarkdownUpdate { updates, .. } = event {
            for render_id in updates {
                let Some(entry) = self.entries.get_mut(render_id) else {
                    continue;
                };
                if !entry.awaiting_html {
                    continue;
                }
                log::warn!("no server markup for {}; rendering on the client", render_id);
                entry.awaiting_html = false;
                entry.without_markup = true;
                self.run_discover(render_id, &mut effects);
            }
        }
        Ok(effects)
    }

    /// Applies a reconciliation for the recompiled `next` page and installs
    /// the plan's registry in one swap.
    pub fn apply_plan(&mut self, plan: ReconcilePlan, next: &CompilationContainer) -> Vec<Effect> {
        let mut effects = Vec::new();
        let previous: BTreeMap<RenderId, Entry> = std::mem::take(&mut self.entries);
        self.page_id = next.page_id.clone();
        self.imports = next.imports_by_local_name.clone();
        self.registry = Arc::new(plan.next_registry);
        self.records = plan.next_records;

        for binding in &plan.loads {
            self.request_module(binding, &mut effects);
        }

        let mut server_items = Vec::new();
        let mut ssr_only_items = Vec::new();

        for action in &plan.actions {
            let render_id = action.render_id();
            let Some(container) = next.container(render_id) else {
                if let ReconcileAction::Remove { .. } = action {
                    effects.push(Effect::Detach {
                        render_id: render_id.clone(),
                    });
                }
                continue;
            };
            let mut entry = Entry::new(container.clone());

            match action {
                ReconcileAction::Remove { .. } => {
                    effects.push(Effect::Detach {
                        render_id: render_id.clone(),
                    });
                    continue;
                }
                ReconcileAction::ReuseElement { .. } => {
                    if let Some(old) = previous.get(render_id) {
                        entry.state = old.state;
                        entry.mode = old.mode;
                    }
                    effects.push(Effect::ReuseNode {
                        render_id: render_id.clone(),
                    });
                }
                ReconcileAction::RerenderWithProps { .. }
                    if previous.get(render_id).is_some_and(|old| {
                        old.state == ContainerState::Settled
                            && old.container.render_directive == container.render_directive
                    }) =>
                {
                    entry.state = ContainerState::Settled;
                    effects.push(Effect::ReuseNode {
                        render_id: render_id.clone(),
                    });
                    effects.push(Effect::UpdateProps {
                        render_id: render_id.clone(),
                        props: container.props.to_json(),
                    });
                }
                ReconcileAction::RepatchSsrOnly { .. } => {
                    if let Some(old) = previous.get(render_id) {
                        release_root(render_id, old, &mut effects);
                    }
                    ssr_only_items.push(render_item(container));
                }
                ReconcileAction::ReplaceBindingChanged { .. }
                | ReconcileAction::ReplaceNewBinding { .. }
                | ReconcileAction::RenderWithCachedBinding { .. }
                | ReconcileAction::RerenderWithProps { .. } => {
                    if let Some(old) = previous.get(render_id) {
                        release_root(render_id, old, &mut effects);
                    }
                    if container.render_directive.is_ssr_eligible() {
                        entry.awaiting_html = true;
                        server_items.push(render_item(container));
                    }
                }
            }
            self.entries.insert(render_id.clone(), entry);
        }

        // Containers the plan did not mention (e.g. not yet mounted by the host).
        for container in &next.containers {
            self.entries
                .entry(container.render_id.clone())
                .or_insert_with(|| Entry::new(container.clone()));
        }

        let fresh: Vec<RenderId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == ContainerState::Unmounted && !e.awaiting_html)
            .map(|(id, _)| id.clone())
            .collect();
        for id in fresh {
            self.run_discover(&id, &mut effects);
        }

        if !server_items.is_empty() {
            effects.push(Effect::Send {
                event: ClientEvent::RenderRequest {
                    page_id: self.page_id.clone(),
                    update_type: UpdateType::MarkdownUpdate,
                    items: server_items,
                },
            });
        }
        if !ssr_only_items.is_empty() {
            effects.push(Effect::Send {
                event: ClientEvent::RenderRequest {
                    page_id: self.page_id.clone(),
                    update_type: UpdateType::SsrOnlyUpdate,
                    items: ssr_only_items,
                },
            });
        }
        effects
    }

    fn install_page(&mut self, page: &CompilationContainer) {
        self.page_id = page.page_id.clone();
        self.entries = page
            .containers
            .iter()
            .filter(|c| page.imports_by_local_name.contains_key(&c.component_name))
            .map(|c| (c.render_id.clone(), Entry::new(c.clone())))
            .collect();
        self.imports = page.imports_by_local_name.clone();
        self.registry = Arc::new(client_registry(page));
        self.records = initial_records(page);
        self.prefetched = false;
    }

    fn cancel_in_flight(&mut self, reason: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (id, entry) in &self.entries {
            if entry.state == ContainerState::Observed {
                effects.push(Effect::Unobserve {
                    render_id: id.clone(),
                });
            }
        }
        if !self.page_id.is_empty() {
            effects.push(Effect::CancelSubscriptions {
                page_id: self.page_id.clone(),
                reason: reason.to_string(),
            });
        }
        self.entries.clear();
        effects
    }

    fn handler(&self, directive: RenderDirective) -> &dyn DirectiveHandler {
        self.handlers[directive.index()].as_ref()
    }

    fn run_discover(&mut self, render_id: &RenderId, effects: &mut Vec<Effect>) {
        let step = match self.entries.get(render_id) {
            Some(entry) if entry.state == ContainerState::Unmounted => {
                self.handler(entry.container.render_directive).on_discover()
            }
            _ => return,
        };
        self.apply_step(render_id, step, effects);
    }

    fn apply_step(&mut self, render_id: &RenderId, step: Step, effects: &mut Vec<Effect>) {
        match step {
            Step::Stay => {}
            Step::Observe => {
                if let Some(entry) = self.entries.get_mut(render_id) {
                    entry.state = ContainerState::Observed;
                    effects.push(Effect::Observe {
                        render_id: render_id.clone(),
                    });
                }
            }
            Step::Activate(mode) => {
                let Some(entry) = self.entries.get_mut(render_id) else {
                    return;
                };
                let mode = if entry.without_markup {
                    MountMode::Render
                } else {
                    mode
                };
                entry.state = ContainerState::Pending;
                entry.mode = Some(mode);
                let binding = self.registry.get(&entry.container.component_name).cloned();
                match binding {
                    Some(binding) => {
                        self.request_framework(effects);
                        self.request_module(&binding, effects);
                        self.flush_pending(effects);
                    }
                    None => {
                        log::warn!(
                            "no registered component for {} ({})",
                            render_id,
                            entry.container.component_name
                        );
                        entry.state = ContainerState::Failed;
                    }
                }
            }
        }
    }

    fn request_framework(&mut self, effects: &mut Vec<Effect>) {
        if self.framework.is_none() {
            self.framework = Some(LoadState::Loading);
            effects.push(Effect::LoadFramework);
        }
    }

    fn request_module(&mut self, binding: &ImportBinding, effects: &mut Vec<Effect>) {
        let key = binding.load_key();
        // A failed import is retried by the next container that needs it.
        if matches!(self.modules.get(&key), None | Some(LoadState::Failed)) {
            self.modules.insert(key.clone(), LoadState::Loading);
            effects.push(Effect::LoadModule {
                key,
                binding: binding.clone(),
            });
        }
    }

    fn flush_pending(&mut self, effects: &mut Vec<Effect>) {
        if self.framework != Some(LoadState::Ready) {
            return;
        }
        for entry in self.entries.values_mut() {
            if entry.state != ContainerState::Pending || entry.awaiting_html {
                continue;
            }
            let Some(mode) = entry.mode else {
                continue;
            };
            let ready = self
                .registry
                .get(&entry.container.component_name)
                .and_then(|b| self.modules.get(&b.load_key()))
                == Some(&LoadState::Ready);
            if ready {
                entry.mode = None;
                effects.push(mount_effect(&entry.container, mode));
            }
        }
    }

    fn maybe_prefetch(&mut self, effects: &mut Vec<Effect>) {
        if self.prefetched || self.prefetch.is_empty() {
            return;
        }
        let busy = self
            .entries
            .values()
            .any(|e| e.state == ContainerState::Pending);
        if !busy {
            self.prefetched = true;
            effects.push(Effect::Prefetch {
                paths: self.prefetch.clone(),
            });
        }
    }
}

/// Releases whatever the host attached to a container's previous element.
fn release_root(render_id: &RenderId, old: &Entry, effects: &mut Vec<Effect>) {
    match old.state {
        ContainerState::Observed => effects.push(Effect::Unobserve {
            render_id: render_id.clone(),
        }),
        ContainerState::Pending | ContainerState::Settled => effects.push(Effect::Detach {
            render_id: render_id.clone(),
        }),
        ContainerState::Unmounted | ContainerState::Failed => {}
    }
}

fn mount_effect(container: &RenderContainer, mode: MountMode) -> Effect {
    let render_id = container.render_id.clone();
    let component_name = container.component_name.clone();
    let props = container.props.to_json();
    match mode {
        MountMode::Render => Effect::Render {
            render_id,
            component_name,
            props,
        },
        MountMode::Hydrate => Effect::Hydrate {
            render_id,
            component_name,
            props,
        },
    }
}

fn render_item(container: &RenderContainer) -> RenderItem {
    RenderItem {
        render_id: container.render_id.clone(),
        component_name: container.component_name.clone(),
        props: container.props.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{ElementSnapshot, reconcile};
    use islands_core::{CompileOptions, UsedSnippet, compile_page};
    use pretty_assertions::assert_eq;

    const PAGE: &str = "<script lang=\"react\">\nimport Counter from './Counter.tsx'\n</script>\n\n# Demo\n\n<Counter client:load initial=\"3\" />\n";

    fn compile(source: &str) -> CompilationContainer {
        compile_page(source, "docs/counter.md", &CompileOptions::default())
            .unwrap()
            .container
    }

    fn only_id(page: &CompilationContainer) -> RenderId {
        page.containers[0].render_id.clone()
    }

    #[test]
    fn client_load_hydrates_after_framework_and_module() {
        let page = compile(PAGE);
        let id = only_id(&page);
        let mut runtime = ClientRuntime::new();

        let effects = runtime.discover(&page);
        assert_eq!(
            effects,
            vec![
                Effect::LoadFramework,
                Effect::LoadModule {
                    key: "./Counter.tsx#default".to_string(),
                    binding: ImportBinding::default_export("./Counter.tsx"),
                },
            ]
        );
        assert_eq!(runtime.state(&id), Some(ContainerState::Pending));

        assert!(runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap().is_empty());
        let effects = runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::Hydrate {
                render_id: id.clone(),
                component_name: "Counter".to_string(),
                props: serde_json::json!({ "initial": "3" }),
            }]
        );

        runtime
            .handle(RuntimeEvent::Mounted {
                render_id: id.clone(),
            })
            .unwrap();
        assert_eq!(runtime.state(&id), Some(ContainerState::Settled));
    }

    #[test]
    fn ssr_only_container_never_loads_code() {
        let page = compile(&PAGE.replace(" client:load", ""));
        let mut runtime = ClientRuntime::new();
        assert!(runtime.discover(&page).is_empty());
        assert_eq!(runtime.state(&only_id(&page)), Some(ContainerState::Unmounted));
    }

    #[test]
    fn client_only_renders_instead_of_hydrating() {
        let page = compile(&PAGE.replace("client:load", "client:only"));
        let mut runtime = ClientRuntime::new();
        runtime.discover(&page);
        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        let effects = runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        assert!(matches!(effects[..], [Effect::Render { .. }]));
    }

    #[test]
    fn client_visible_waits_for_intersection() {
        let page = compile(&PAGE.replace("client:load", "client:visible"));
        let id = only_id(&page);
        let mut runtime = ClientRuntime::new();

        assert_eq!(
            runtime.discover(&page),
            vec![Effect::Observe {
                render_id: id.clone()
            }]
        );
        assert_eq!(runtime.state(&id), Some(ContainerState::Observed));

        let effects = runtime
            .handle(RuntimeEvent::Intersected {
                render_id: id.clone(),
            })
            .unwrap();
        assert_eq!(effects[0], Effect::Unobserve { render_id: id });
        assert!(effects.contains(&Effect::LoadFramework));
    }

    #[test]
    fn module_is_loaded_once_for_many_containers() {
        let source = PAGE.replace(
            "<Counter client:load initial=\"3\" />",
            "<Counter client:load />\n\n<Counter client:load />",
        );
        let page = compile(&source);
        let mut runtime = ClientRuntime::new();
        let effects = runtime.discover(&page);
        let loads = effects
            .iter()
            .filter(|e| matches!(e, Effect::LoadModule { .. }))
            .count();
        assert_eq!(loads, 1);

        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        let effects = runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        assert_eq!(effects.len(), 2);
    }

    #[test]
    fn hydration_failure_falls_back_to_render() {
        let page = compile(PAGE);
        let id = only_id(&page);
        let mut runtime = ClientRuntime::new();
        runtime.discover(&page);
        let effects = runtime
            .handle(RuntimeEvent::HydrationFailed {
                render_id: id.clone(),
                reason: "text mismatch".to_string(),
            })
            .unwrap();
        assert!(matches!(effects[..], [Effect::Render { .. }]));

        runtime
            .handle(RuntimeEvent::RenderFailed {
                render_id: id.clone(),
                reason: "boom".to_string(),
            })
            .unwrap();
        assert_eq!(runtime.state(&id), Some(ContainerState::Failed));
    }

    #[test]
    fn unknown_container_is_an_error() {
        let mut runtime = ClientRuntime::new();
        let err = runtime
            .handle(RuntimeEvent::Mounted {
                render_id: RenderId::derive("nowhere.md", 0),
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownContainer(_)));
    }

    #[test]
    fn navigation_patches_synced_snippets_and_cancels_previous_page() {
        let first = compile(&PAGE.replace("client:load", "client:visible"));
        let mut runtime = ClientRuntime::new();
        runtime.discover(&first);

        let second = compile_page(PAGE, "docs/other.md", &CompileOptions::default())
            .unwrap()
            .container;
        let id = only_id(&second);
        let mut snippet = UsedSnippet::from_container(&second.containers[0]);
        snippet.html = Some("<button>3</button>".to_string());
        let snippets = SnippetMap::from([(id.clone(), snippet)]);

        let effects = runtime.navigate(&second, &snippets);
        assert_eq!(
            effects[..3],
            [
                Effect::Unobserve {
                    render_id: only_id(&first)
                },
                Effect::CancelSubscriptions {
                    page_id: "docs/counter.md".to_string(),
                    reason: "navigation cancelled".to_string(),
                },
                Effect::PatchHtml {
                    render_id: id,
                    html: "<button>3</button>".to_string(),
                },
            ]
        );
        assert_eq!(runtime.page_id(), "docs/other.md");
    }

    #[test]
    fn client_only_is_never_patched_on_navigation() {
        let page = compile(&PAGE.replace("client:load", "client:only"));
        let id = only_id(&page);
        let mut snippet = UsedSnippet::from_container(&page.containers[0]);
        snippet.use_spa_sync = true;
        snippet.html = Some("<p>stale</p>".to_string());
        let snippets = SnippetMap::from([(id, snippet)]);

        let mut runtime = ClientRuntime::new();
        let effects = runtime.navigate(&page, &snippets);
        assert!(!effects.iter().any(|e| matches!(e, Effect::PatchHtml { .. })));
    }

    #[test]
    fn stale_server_events_are_rejected() {
        let page = compile(PAGE);
        let mut runtime = ClientRuntime::new();
        runtime.discover(&page);
        let event = ServerEvent::SsrOnlyUpdate {
            page_id: "docs/elsewhere.md".to_string(),
            rendered: Default::default(),
        };
        assert!(matches!(
            runtime.handle_server_event(&event),
            Err(RuntimeError::StalePage { .. })
        ));
    }

    #[test]
    fn malformed_server_message_is_an_error() {
        let mut runtime = ClientRuntime::new();
        assert!(matches!(
            runtime.handle_server_message("{\"type\":\"nope\"}"),
            Err(RuntimeError::MalformedMessage(_))
        ));
    }

    fn settled_runtime(page: &CompilationContainer) -> ClientRuntime {
        let mut runtime = ClientRuntime::new();
        runtime.discover(page);
        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        runtime
            .handle(RuntimeEvent::Mounted {
                render_id: only_id(page),
            })
            .unwrap();
        runtime
    }

    fn plan(runtime: &ClientRuntime, next: &CompilationContainer) -> ReconcilePlan {
        let mounted: Vec<ElementSnapshot> = next
            .containers
            .iter()
            .map(ElementSnapshot::from_container)
            .collect();
        reconcile(runtime.imports(), next, &mounted, runtime.records())
    }

    #[test]
    fn prose_edit_reuses_the_live_node() {
        let page = compile(PAGE);
        let mut runtime = settled_runtime(&page);
        let next = compile(&PAGE.replace("# Demo", "# Demo page"));

        let plan = plan(&runtime, &next);
        let effects = runtime.apply_plan(plan, &next);
        assert_eq!(
            effects,
            vec![Effect::ReuseNode {
                render_id: only_id(&next)
            }]
        );
        assert_eq!(runtime.state(&only_id(&next)), Some(ContainerState::Settled));
    }

    #[test]
    fn prop_edit_updates_props_in_place() {
        let page = compile(PAGE);
        let mut runtime = settled_runtime(&page);
        let next = compile(&PAGE.replace("\"3\"", "\"7\""));

        let plan = plan(&runtime, &next);
        let effects = runtime.apply_plan(plan, &next);
        assert_eq!(
            effects[1],
            Effect::UpdateProps {
                render_id: only_id(&next),
                props: serde_json::json!({ "initial": "7" }),
            }
        );
    }

    #[test]
    fn changed_module_waits_for_server_html_then_hydrates() {
        let page = compile(PAGE);
        let mut runtime = settled_runtime(&page);
        let next = compile(&PAGE.replace("./Counter.tsx", "./Counter2.tsx"));
        let id = only_id(&next);
        let registry_before = runtime.registry();

        let plan = plan(&runtime, &next);
        let effects = runtime.apply_plan(plan, &next);
        assert!(effects.contains(&Effect::LoadModule {
            key: "./Counter2.tsx#default".to_string(),
            binding: ImportBinding::default_export("./Counter2.tsx"),
        }));
        assert!(effects.contains(&Effect::Detach {
            render_id: id.clone()
        }));
        let Some(Effect::Send {
            event: ClientEvent::RenderRequest {
                update_type, items, ..
            },
        }) = effects.last()
        else {
            panic!("expected a render request, got {effects:?}");
        };
        assert_eq!(*update_type, UpdateType::MarkdownUpdate);
        assert_eq!(items.len(), 1);
        assert_ne!(runtime.registry(), registry_before);

        runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter2.tsx#default".to_string(),
            })
            .unwrap();
        let event = ServerEvent::MarkdownUpdate {
            page_id: "docs/counter.md".to_string(),
            rendered: [(id.clone(), "<button>3</button>".to_string())].into(),
            updates: vec![id.clone()],
            removals: vec![],
            missing_imports: Default::default(),
        };
        let effects = runtime.handle_server_event(&event).unwrap();
        assert_eq!(
            effects[0],
            Effect::PatchHtml {
                render_id: id.clone(),
                html: "<button>3</button>".to_string(),
            }
        );
        assert!(matches!(effects[1], Effect::Hydrate { .. }));
    }

    #[test]
    fn missing_server_markup_falls_back_to_client_render() {
        let page = compile(PAGE);
        let mut runtime = settled_runtime(&page);
        let next = compile(&PAGE.replace("./Counter.tsx", "./Counter2.tsx"));
        let id = only_id(&next);

        let plan = plan(&runtime, &next);
        runtime.apply_plan(plan, &next);
        runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter2.tsx#default".to_string(),
            })
            .unwrap();
        assert_eq!(runtime.state(&id), Some(ContainerState::Unmounted));

        let event = ServerEvent::MarkdownUpdate {
            page_id: "docs/counter.md".to_string(),
            rendered: Default::default(),
            updates: vec![id.clone()],
            removals: vec![],
            missing_imports: Default::default(),
        };
        let effects = runtime.handle_server_event(&event).unwrap();
        assert_eq!(
            effects,
            vec![Effect::Render {
                render_id: id.clone(),
                component_name: "Counter".to_string(),
                props: serde_json::json!({ "initial": "3" }),
            }]
        );
        assert_eq!(runtime.state(&id), Some(ContainerState::Pending));
    }

    #[test]
    fn failed_module_is_requested_again_after_navigation() {
        let page = compile(PAGE);
        let id = only_id(&page);
        let mut runtime = ClientRuntime::new();
        runtime.discover(&page);
        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        runtime
            .handle(RuntimeEvent::ModuleFailed {
                key: "./Counter.tsx#default".to_string(),
                reason: "network".to_string(),
            })
            .unwrap();
        assert_eq!(runtime.state(&id), Some(ContainerState::Failed));

        let effects = runtime.navigate(&page, &SnippetMap::new());
        assert!(effects.contains(&Effect::LoadModule {
            key: "./Counter.tsx#default".to_string(),
            binding: ImportBinding::default_export("./Counter.tsx"),
        }));
        assert_eq!(runtime.state(&id), Some(ContainerState::Pending));

        let effects = runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        assert!(matches!(effects[..], [Effect::Hydrate { .. }]));
    }

    #[test]
    fn downgrade_to_ssr_only_detaches_the_live_root() {
        let page = compile(PAGE);
        let mut runtime = settled_runtime(&page);
        let next = compile(&PAGE.replace(" client:load", ""));
        let id = only_id(&next);

        let plan = plan(&runtime, &next);
        let effects = runtime.apply_plan(plan, &next);
        assert_eq!(
            effects[0],
            Effect::Detach {
                render_id: id.clone()
            }
        );
        assert!(matches!(
            effects.last(),
            Some(Effect::Send {
                event: ClientEvent::RenderRequest {
                    update_type: UpdateType::SsrOnlyUpdate,
                    ..
                },
            })
        ));
        assert_eq!(runtime.state(&id), Some(ContainerState::Unmounted));
    }

    #[test]
    fn swapped_components_replace_live_roots_without_reimport() {
        let head = "<script lang=\"react\">\nimport A from './A.tsx'\nimport B from './B.tsx'\n</script>\n\n";
        let page = compile(&format!("{head}<A client:load />\n\n<B client:load />\n"));
        let mut runtime = ClientRuntime::new();
        runtime.discover(&page);
        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        for key in ["./A.tsx#default", "./B.tsx#default"] {
            runtime
                .handle(RuntimeEvent::ModuleLoaded {
                    key: key.to_string(),
                })
                .unwrap();
        }
        for container in &page.containers {
            runtime
                .handle(RuntimeEvent::Mounted {
                    render_id: container.render_id.clone(),
                })
                .unwrap();
        }

        let next = compile(&format!("{head}<B client:load />\n\n<A client:load />\n"));
        let plan = plan(&runtime, &next);
        let effects = runtime.apply_plan(plan, &next);
        assert!(!effects.iter().any(|e| matches!(e, Effect::LoadModule { .. })));
        let detached = effects
            .iter()
            .filter(|e| matches!(e, Effect::Detach { .. }))
            .count();
        assert_eq!(detached, 2);
    }

    #[test]
    fn prefetch_waits_until_everything_settles() {
        let page = compile(PAGE);
        let id = only_id(&page);
        let mut runtime = ClientRuntime::new();
        runtime.set_prefetch(vec!["/assets/other.js".to_string()]);
        let effects = runtime.discover(&page);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Prefetch { .. })));

        runtime.handle(RuntimeEvent::FrameworkLoaded).unwrap();
        runtime
            .handle(RuntimeEvent::ModuleLoaded {
                key: "./Counter.tsx#default".to_string(),
            })
            .unwrap();
        let effects = runtime
            .handle(RuntimeEvent::Mounted { render_id: id })
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::Prefetch {
                paths: vec!["/assets/other.js".to_string()]
            }]
        );
    }
}
