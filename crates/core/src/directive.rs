//! Render directives and the reserved container attribute protocol.

use crate::IslandsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute carrying the 8-hex render identifier.
pub const RENDER_ID_ATTR: &str = "data-render-id";
/// Attribute carrying the render directive.
pub const RENDER_DIRECTIVE_ATTR: &str = "data-render-directive";
/// Attribute carrying the exact page-local component name.
pub const RENDER_COMPONENT_ATTR: &str = "data-render-component";
/// Attribute carrying the boolean spa-sync flag.
pub const SPA_SYNC_ATTR: &str = "data-spa-sync";

/// The four reserved attributes every compiled container carries.
pub const RESERVED_ATTRS: [&str; 4] = [
    RENDER_ID_ATTR,
    RENDER_DIRECTIVE_ATTR,
    RENDER_COMPONENT_ATTR,
    SPA_SYNC_ATTR,
];

/// Markers that turn spa-sync on.
pub const SPA_SYNC_ON_MARKERS: [&str; 2] = ["spa:sync-render", "spa:sr"];
/// Markers that turn spa-sync off.
pub const SPA_SYNC_OFF_MARKERS: [&str; 2] = ["spa:sync-render:disable", "spa:sr:disable"];

/// Where and when a component is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum RenderDirective {
    /// Rendered on the server only; no client JavaScript.
    #[default]
    #[serde(rename = "ssr:only")]
    SsrOnly,
    /// Rendered once on the client; never pre-rendered.
    #[serde(rename = "client:only")]
    ClientOnly,
    /// Server-rendered and hydrated as soon as the page loads.
    #[serde(rename = "client:load")]
    ClientLoad,
    /// Server-rendered and hydrated when scrolled into view.
    #[serde(rename = "client:visible")]
    ClientVisible,
}

impl RenderDirective {
    /// All directives, in handler-table order.
    pub const ALL: [RenderDirective; 4] = [
        RenderDirective::SsrOnly,
        RenderDirective::ClientOnly,
        RenderDirective::ClientLoad,
        RenderDirective::ClientVisible,
    ];

    /// Attribute spelling of the directive.
    pub const fn as_str(self) -> &'static str {
        match self {
            RenderDirective::SsrOnly => "ssr:only",
            RenderDirective::ClientOnly => "client:only",
            RenderDirective::ClientLoad => "client:load",
            RenderDirective::ClientVisible => "client:visible",
        }
    }

    /// Position in [`RenderDirective::ALL`]; used to index handler tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether the server pre-renders containers with this directive.
    pub const fn is_ssr_eligible(self) -> bool {
        !matches!(self, RenderDirective::ClientOnly)
    }

    /// Whether the client attaches to existing server markup.
    pub const fn needs_hydration(self) -> bool {
        matches!(
            self,
            RenderDirective::ClientLoad | RenderDirective::ClientVisible
        )
    }

    /// Whether the component module is shipped to the browser.
    pub const fn needs_client_code(self) -> bool {
        !matches!(self, RenderDirective::SsrOnly)
    }

    /// Whether the client waits for visibility before acting.
    pub const fn is_lazy(self) -> bool {
        matches!(self, RenderDirective::ClientVisible)
    }

    /// Parses an attribute name into a directive, if it is one.
    pub fn from_attr(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for RenderDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderDirective {
    type Err = IslandsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_attr(s).ok_or_else(|| IslandsError::UnknownDirective(s.to_string()))
    }
}

/// Spa-sync marker found on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaSyncMarker {
    /// `spa:sync-render` / `spa:sr`.
    Enable,
    /// `spa:sync-render:disable` / `spa:sr:disable`.
    Disable,
}

impl SpaSyncMarker {
    /// Parses an attribute name into a marker, if it is one.
    pub fn from_attr(name: &str) -> Option<Self> {
        if SPA_SYNC_ON_MARKERS.contains(&name) {
            Some(SpaSyncMarker::Enable)
        } else if SPA_SYNC_OFF_MARKERS.contains(&name) {
            Some(SpaSyncMarker::Disable)
        } else {
            None
        }
    }
}

/// Outcome of resolving spa-sync for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaSyncResolution {
    /// Final flag value.
    pub enabled: bool,
    /// An enable marker was ignored because the directive cannot sync.
    pub forced_off: bool,
}

/// Applies the spa-sync defaulting rules.
///
/// `client:only` is never synced. Otherwise an explicit marker wins and the
/// page default applies when no marker is present.
pub fn resolve_spa_sync(
    directive: RenderDirective,
    marker: Option<SpaSyncMarker>,
    page_default: bool,
) -> SpaSyncResolution {
    if directive == RenderDirective::ClientOnly {
        return SpaSyncResolution {
            enabled: false,
            forced_off: marker == Some(SpaSyncMarker::Enable),
        };
    }
    let enabled = match marker {
        Some(SpaSyncMarker::Enable) => true,
        Some(SpaSyncMarker::Disable) => false,
        None => page_default,
    };
    SpaSyncResolution {
        enabled,
        forced_off: false,
    }
}

/// The directive attribute tuple assigned to one render id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveTuple {
    /// Render directive.
    pub directive: RenderDirective,
    /// Exact page-local component name.
    pub component_name: String,
    /// Spa-sync flag.
    pub use_spa_sync: bool,
}
