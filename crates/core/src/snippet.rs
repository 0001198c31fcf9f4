//! Build-time records of rendered containers.

use crate::container::{Props, RenderContainer};
use crate::directive::RenderDirective;
use crate::render_id::RenderId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Build-time record of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsedSnippet {
    /// Container directive.
    pub directive: RenderDirective,
    /// Component local name.
    pub component_name: String,
    /// Resolved pass-through props.
    pub props: Props,
    /// Server-rendered HTML, when the SSR pass produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Stylesheets the rendered HTML depends on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<BTreeSet<String>>,
    /// Patched directly on route transitions.
    pub use_spa_sync: bool,
}

impl UsedSnippet {
    /// Initial record for a container, before any rendering.
    pub fn from_container(container: &RenderContainer) -> Self {
        Self {
            directive: container.render_directive,
            component_name: container.component_name.clone(),
            props: container.props.clone(),
            html: None,
            css: None,
            use_spa_sync: container.use_spa_sync,
        }
    }

    /// True when route transitions may patch this container from its HTML.
    pub fn is_pre_syncable(&self) -> bool {
        self.use_spa_sync && self.directive.is_ssr_eligible()
    }
}

/// Render id → snippet, ordered for stable serialization.
pub type SnippetMap = BTreeMap<RenderId, UsedSnippet>;
