//! Per-page compiled artifacts: render containers and the compilation container.

use crate::directive::{DirectiveTuple, RenderDirective};
use crate::render_id::RenderId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One pass-through attribute as written by the author (unescaped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value; `None` for a bare boolean attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Attribute {
    /// Attribute with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Bare boolean attribute.
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Renders as ` name="escaped"` (or ` name` when valueless).
    pub fn to_html(&self) -> String {
        match &self.value {
            Some(value) => format!(
                " {}=\"{}\"",
                self.name,
                html_escape::encode_double_quoted_attribute(value)
            ),
            None => format!(" {}", self.name),
        }
    }
}

/// Ordered pass-through attributes of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(Vec<Attribute>);

impl Props {
    /// Empty props.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute; a repeated name replaces the earlier value in place.
    pub fn push(&mut self, attribute: Attribute) {
        if let Some(existing) = self.0.iter_mut().find(|a| a.name == attribute.name) {
            existing.value = attribute.value;
        } else {
            self.0.push(attribute);
        }
    }

    /// Looks up a value by name. Valueless attributes yield `Some(None)`.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref())
    }

    /// Iterates in author order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Props as a JSON object for render calls: bare attributes become `true`.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .0
            .iter()
            .map(|a| {
                let value = match &a.value {
                    Some(v) => JsonValue::String(v.clone()),
                    None => JsonValue::Bool(true),
                };
                (a.name.clone(), value)
            })
            .collect();
        JsonValue::Object(map)
    }

    /// Escaped attribute list for emitting into HTML.
    pub fn to_html(&self) -> String {
        self.0.iter().map(Attribute::to_html).collect()
    }
}

impl FromIterator<Attribute> for Props {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut props = Props::new();
        for attribute in iter {
            props.push(attribute);
        }
        props
    }
}

/// The symbol a page imports from a component module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum ImportedSymbol {
    /// `import X from '...'`
    Default,
    /// `import { Y as X } from '...'`
    Named(String),
    /// `import * as X from '...'`
    Namespace,
}

impl fmt::Display for ImportedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportedSymbol::Default => f.write_str("default"),
            ImportedSymbol::Named(name) => f.write_str(name),
            ImportedSymbol::Namespace => f.write_str("*"),
        }
    }
}

/// Where a page-local component name comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBinding {
    /// Module specifier as written in the page.
    pub module: String,
    /// Imported symbol.
    pub imported: ImportedSymbol,
}

impl ImportBinding {
    /// Default-import binding.
    pub fn default_export(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            imported: ImportedSymbol::Default,
        }
    }

    /// Named-import binding.
    pub fn named(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            imported: ImportedSymbol::Named(symbol.into()),
        }
    }

    /// Deduplication key for module loading: `module#symbol`.
    pub fn load_key(&self) -> String {
        format!("{}#{}", self.module, self.imported)
    }

    /// ES import statement binding `local` to this symbol.
    pub fn import_statement(&self, local: &str) -> String {
        let module = serde_json::to_string(&self.module).unwrap_or_else(|_| "\"\"".to_string());
        match &self.imported {
            ImportedSymbol::Default => format!("import {} from {};", local, module),
            ImportedSymbol::Named(name) if name == local => {
                format!("import {{ {} }} from {};", name, module)
            }
            ImportedSymbol::Named(name) => {
                format!("import {{ {} as {} }} from {};", name, local, module)
            }
            ImportedSymbol::Namespace => format!("import * as {} from {};", local, module),
        }
    }
}

/// One compiled occurrence of a component reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContainer {
    /// Stable identifier.
    pub render_id: RenderId,
    /// Render directive.
    pub render_directive: RenderDirective,
    /// Exact page-local import name.
    pub component_name: String,
    /// Whether route transitions patch this container from build output.
    pub use_spa_sync: bool,
    /// Pass-through attributes.
    pub props: Props,
}

impl RenderContainer {
    /// The directive tuple recorded for this container.
    pub fn directive_tuple(&self) -> DirectiveTuple {
        DirectiveTuple {
            directive: self.render_directive,
            component_name: self.component_name.clone(),
            use_spa_sync: self.use_spa_sync,
        }
    }

    /// Emits the generic container element.
    pub fn to_html(&self) -> String {
        use crate::directive::{
            RENDER_COMPONENT_ATTR, RENDER_DIRECTIVE_ATTR, RENDER_ID_ATTR, SPA_SYNC_ATTR,
        };
        format!(
            "<div {}=\"{}\" {}=\"{}\" {}=\"{}\" {}=\"{}\"{}></div>",
            RENDER_ID_ATTR,
            self.render_id,
            RENDER_DIRECTIVE_ATTR,
            self.render_directive,
            RENDER_COMPONENT_ATTR,
            self.component_name,
            SPA_SYNC_ATTR,
            self.use_spa_sync,
            self.props.to_html()
        )
    }
}

/// The per-page compiled artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationContainer {
    /// Page identity the render ids were derived from.
    pub page_id: String,
    /// Local component name → import binding.
    pub imports_by_local_name: BTreeMap<String, ImportBinding>,
    /// Compiled containers in document order.
    pub containers: Vec<RenderContainer>,
    /// Components whose every container on the page is `ssr:only`.
    pub ssr_only_component_names: BTreeSet<String>,
    /// Client glue module source.
    pub glue_code: String,
}

impl CompilationContainer {
    /// Builds a container and derives the ssr-only set and glue code.
    pub fn new(
        page_id: impl Into<String>,
        imports_by_local_name: BTreeMap<String, ImportBinding>,
        containers: Vec<RenderContainer>,
    ) -> Self {
        let ssr_only_component_names = ssr_only_names(&containers);
        let mut container = Self {
            page_id: page_id.into(),
            imports_by_local_name,
            containers,
            ssr_only_component_names,
            glue_code: String::new(),
        };
        container.glue_code = crate::glue::client_glue(&container);
        container
    }

    /// Ordered `renderId → directive tuple` assignments.
    pub fn directives_by_id(&self) -> BTreeMap<RenderId, DirectiveTuple> {
        self.containers
            .iter()
            .map(|c| (c.render_id.clone(), c.directive_tuple()))
            .collect()
    }

    /// Looks up a container by id.
    pub fn container(&self, id: &RenderId) -> Option<&RenderContainer> {
        self.containers.iter().find(|c| &c.render_id == id)
    }

    /// Names bound in `previous` that are no longer imported here.
    pub fn missing_imports(&self, previous: &BTreeMap<String, ImportBinding>) -> BTreeSet<String> {
        previous
            .keys()
            .filter(|name| !self.imports_by_local_name.contains_key(*name))
            .cloned()
            .collect()
    }

    /// Component names that need client code on this page.
    pub fn client_component_names(&self) -> BTreeSet<String> {
        self.containers
            .iter()
            .filter(|c| c.render_directive.needs_client_code())
            .map(|c| c.component_name.clone())
            .collect()
    }

    /// Whether no component is referenced.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

fn ssr_only_names(containers: &[RenderContainer]) -> BTreeSet<String> {
    let mut by_name: BTreeMap<&str, bool> = BTreeMap::new();
    for container in containers {
        let all_ssr = by_name
            .entry(container.component_name.as_str())
            .or_insert(true);
        *all_ssr &= container.render_directive == RenderDirective::SsrOnly;
    }
    by_name
        .into_iter()
        .filter(|(_, all_ssr)| *all_ssr)
        .map(|(name, _)| name.to_string())
        .collect()
}
