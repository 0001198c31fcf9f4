//! Live-edit reconciliation: decides, per container element, whether an edit
//! lets the already-rendered node survive.
//!
//! Classification is synchronous against snapshots; nothing here loads a
//! module or touches the DOM. The returned [`ReconcilePlan`] is applied by
//! [`ClientRuntime::apply_plan`](crate::ClientRuntime::apply_plan).

use islands_core::{
    CompilationContainer, ImportBinding, RenderContainer, RenderDirective, RenderId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Local name → binding of every component the browser may render.
pub type ComponentRegistry = BTreeMap<String, ImportBinding>;

/// Attributes of a container element as found in the document.
///
/// Attribute maps are ordered; two snapshots match only when they carry the
/// same names with the same values, so a renamed attribute is a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    /// Container id.
    pub render_id: RenderId,
    /// Component local name.
    pub component_name: String,
    /// Container directive.
    pub directive: RenderDirective,
    /// Spa-sync flag.
    pub use_spa_sync: bool,
    /// Pass-through attributes.
    pub attributes: BTreeMap<String, Option<String>>,
}

impl ElementSnapshot {
    /// Snapshot of a compiled container.
    pub fn from_container(container: &RenderContainer) -> Self {
        Self {
            render_id: container.render_id.clone(),
            component_name: container.component_name.clone(),
            directive: container.render_directive,
            use_spa_sync: container.use_spa_sync,
            attributes: container
                .props
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
        }
    }
}

/// What was last rendered into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    /// Attributes the element was rendered with.
    pub snapshot: ElementSnapshot,
    /// Binding the component came from.
    pub binding: ImportBinding,
}

/// Exactly one of these is chosen per element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ReconcileAction {
    /// Detach the element; its component is gone.
    #[serde(rename_all = "camelCase")]
    Remove {
        /// Container id.
        render_id: RenderId,
    },
    /// A component name not bound before: render with the new binding.
    #[serde(rename_all = "camelCase")]
    ReplaceNewBinding {
        /// Container id.
        render_id: RenderId,
        /// Binding to load.
        binding: ImportBinding,
    },
    /// Same binding, element new at this id: render with the cached component.
    #[serde(rename_all = "camelCase")]
    RenderWithCachedBinding {
        /// Container id.
        render_id: RenderId,
    },
    /// Same binding, attributes changed: re-render the live instance with new props.
    #[serde(rename_all = "camelCase")]
    RerenderWithProps {
        /// Container id.
        render_id: RenderId,
    },
    /// Nothing changed: move the previously rendered node into place.
    #[serde(rename_all = "camelCase")]
    ReuseElement {
        /// Container id.
        render_id: RenderId,
    },
    /// The name now points at another module or symbol: discard and render anew.
    #[serde(rename_all = "camelCase")]
    ReplaceBindingChanged {
        /// Container id.
        render_id: RenderId,
        /// Binding the live instance came from.
        previous: ImportBinding,
        /// Binding to load.
        binding: ImportBinding,
    },
    /// `ssr:only` holds no live instance: ask the server for fresh HTML.
    #[serde(rename_all = "camelCase")]
    RepatchSsrOnly {
        /// Container id.
        render_id: RenderId,
    },
}

impl ReconcileAction {
    /// Container the action applies to.
    pub fn render_id(&self) -> &RenderId {
        match self {
            Self::Remove { render_id }
            | Self::ReplaceNewBinding { render_id, .. }
            | Self::RenderWithCachedBinding { render_id }
            | Self::RerenderWithProps { render_id }
            | Self::ReuseElement { render_id }
            | Self::ReplaceBindingChanged { render_id, .. }
            | Self::RepatchSsrOnly { render_id } => render_id,
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    /// One action per element, mounted elements first, stale records after.
    pub actions: Vec<ReconcileAction>,
    /// Distinct bindings to import, in first-use order.
    pub loads: Vec<ImportBinding>,
    /// Names whose import was deleted by the edit.
    pub missing_imports: BTreeSet<String>,
    /// Registry to install once the plan is applied.
    pub next_registry: ComponentRegistry,
    /// Element records after the plan is applied.
    pub next_records: BTreeMap<RenderId, ElementRecord>,
}

impl ReconcilePlan {
    /// Action chosen for a container.
    pub fn action(&self, render_id: &RenderId) -> Option<&ReconcileAction> {
        self.actions.iter().find(|a| a.render_id() == render_id)
    }
}

/// Registry of components with at least one client-side container.
pub fn client_registry(page: &CompilationContainer) -> ComponentRegistry {
    let names = page.client_component_names();
    page.imports_by_local_name
        .iter()
        .filter(|(name, _)| names.contains(*name))
        .map(|(name, binding)| (name.clone(), binding.clone()))
        .collect()
}

/// Classifies every element after an edit.
///
/// `mounted` holds the container elements found in the re-rendered
/// document; `records` holds what was last rendered per id.
pub fn reconcile(
    previous_imports: &BTreeMap<String, ImportBinding>,
    next: &CompilationContainer,
    mounted: &[ElementSnapshot],
    records: &BTreeMap<RenderId, ElementRecord>,
) -> ReconcilePlan {
    let missing_imports = next.missing_imports(previous_imports);
    let mut actions = Vec::with_capacity(mounted.len());
    let mut loads = Vec::new();
    let mut load_keys = HashSet::new();
    let mut next_records = BTreeMap::new();
    let mut seen = HashSet::new();

    for element in mounted {
        seen.insert(&element.render_id);
        let render_id = element.render_id.clone();

        let binding = match next.imports_by_local_name.get(&element.component_name) {
            Some(binding) if !missing_imports.contains(&element.component_name) => binding,
            _ => {
                actions.push(ReconcileAction::Remove { render_id });
                continue;
            }
        };
        next_records.insert(
            render_id.clone(),
            ElementRecord {
                snapshot: element.clone(),
                binding: binding.clone(),
            },
        );

        if element.directive == RenderDirective::SsrOnly {
            actions.push(ReconcileAction::RepatchSsrOnly { render_id });
            continue;
        }

        let action = match previous_imports.get(&element.component_name) {
            None => ReconcileAction::ReplaceNewBinding {
                render_id,
                binding: binding.clone(),
            },
            Some(previous) if previous != binding => ReconcileAction::ReplaceBindingChanged {
                render_id,
                previous: previous.clone(),
                binding: binding.clone(),
            },
            // The name kept its binding; compare against what this id held.
            Some(_) => match records.get(&element.render_id) {
                Some(record) if record.snapshot.component_name != element.component_name => {
                    ReconcileAction::RenderWithCachedBinding { render_id }
                }
                Some(record) if record.binding != *binding => {
                    ReconcileAction::ReplaceBindingChanged {
                        render_id,
                        previous: record.binding.clone(),
                        binding: binding.clone(),
                    }
                }
                Some(record) if record.snapshot == *element => {
                    ReconcileAction::ReuseElement { render_id }
                }
                Some(_) => ReconcileAction::RerenderWithProps { render_id },
                None => ReconcileAction::RenderWithCachedBinding { render_id },
            },
        };

        if let ReconcileAction::ReplaceNewBinding { binding, .. }
        | ReconcileAction::ReplaceBindingChanged { binding, .. } = &action
            && load_keys.insert(binding.load_key())
        {
            loads.push(binding.clone());
        }
        actions.push(action);
    }

    for render_id in records.keys() {
        if !seen.contains(render_id) {
            actions.push(ReconcileAction::Remove {
                render_id: render_id.clone(),
            });
        }
    }

    log::debug!(
        "reconciled {}: {} action(s), {} load(s), {} missing import(s)",
        next.page_id,
        actions.len(),
        loads.len(),
        missing_imports.len()
    );

    ReconcilePlan {
        actions,
        loads,
        missing_imports,
        next_registry: client_registry(next),
        next_records,
    }
}

/// Records for a freshly rendered page.
pub fn initial_records(page: &CompilationContainer) -> BTreeMap<RenderId, ElementRecord> {
    page.containers
        .iter()
        .filter_map(|c| {
            let binding = page.imports_by_local_name.get(&c.component_name)?;
            Some((
                c.render_id.clone(),
                ElementRecord {
                    snapshot: ElementSnapshot::from_container(c),
                    binding: binding.clone(),
                },
            ))
        })
        .collect()
}
