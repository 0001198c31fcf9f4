//! Dev-time update channel between the dev server and the browser runtime.

use islands_core::{Props, RenderId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Transport event name for server → client messages.
pub const SERVER_EVENT_NAME: &str = "islands:server";
/// Transport event name for client → server messages.
pub const CLIENT_EVENT_NAME: &str = "islands:client";

/// Which inbound kind a render request expects as its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateType {
    /// Initial pre-render of a page's containers.
    Mount,
    /// Containers changed by a document edit.
    MarkdownUpdate,
    /// Containers of components used only with `ssr:only`.
    SsrOnlyUpdate,
}

/// One container the client wants rendered on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderItem {
    /// Container id.
    pub render_id: RenderId,
    /// Component local name.
    pub component_name: String,
    /// Props to render with.
    pub props: Props,
}

/// Server-rendered HTML by container.
pub type RenderedMap = BTreeMap<RenderId, String>;

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Pre-rendered HTML for a page's initial containers.
    #[serde(rename_all = "camelCase")]
    Mount {
        /// Page the containers belong to.
        page_id: String,
        /// Rendered markup.
        rendered: RenderedMap,
    },
    /// A document edit: rendered markup for changed containers plus the
    /// update and removal sets.
    #[serde(rename_all = "camelCase")]
    MarkdownUpdate {
        /// Edited page.
        page_id: String,
        /// Rendered markup of updated containers.
        rendered: RenderedMap,
        /// Containers that changed or appeared.
        updates: Vec<RenderId>,
        /// Containers that disappeared.
        removals: Vec<RenderId>,
        /// Local names whose import was deleted.
        missing_imports: BTreeSet<String>,
    },
    /// HTML-only patch for `ssr:only` containers.
    #[serde(rename_all = "camelCase")]
    SsrOnlyUpdate {
        /// Page the containers belong to.
        page_id: String,
        /// Rendered markup.
        rendered: RenderedMap,
    },
}

impl ServerEvent {
    /// Page the event concerns.
    pub fn page_id(&self) -> &str {
        match self {
            Self::Mount { page_id, .. }
            | Self::MarkdownUpdate { page_id, .. }
            | Self::SsrOnlyUpdate { page_id, .. } => page_id,
        }
    }

    /// Rendered markup carried by the event.
    pub fn rendered(&self) -> &RenderedMap {
        match self {
            Self::Mount { rendered, .. }
            | Self::MarkdownUpdate { rendered, .. }
            | Self::SsrOnlyUpdate { rendered, .. } => rendered,
        }
    }

    /// Decodes a transport payload.
    pub fn from_json(json: &str) -> Result<Self, crate::RuntimeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Asks the server to pre-render containers.
    #[serde(rename_all = "camelCase")]
    RenderRequest {
        /// Page the containers belong to.
        page_id: String,
        /// Kind of answer expected.
        update_type: UpdateType,
        /// Containers to render.
        items: Vec<RenderItem>,
    },
}

impl ClientEvent {
    /// Encodes for the transport.
    pub fn to_json(&self) -> Result<String, crate::RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islands_core::Attribute;

    #[test]
    fn server_events_are_tagged_by_type() {
        let event = ServerEvent::SsrOnlyUpdate {
            page_id: "index.md".into(),
            rendered: [(RenderId::derive("index.md", 0), "<p>hi</p>".to_string())]
                .into_iter()
                .collect(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ssr-only-update");
        assert_eq!(json["pageId"], "index.md");
    }

    #[test]
    fn decodes_markdown_update() {
        let id = RenderId::derive("index.md", 0);
        let json = format!(
            r#"{{"type":"markdown-update","pageId":"index.md","rendered":{{"{id}":"<b>1</b>"}},"updates":["{id}"],"removals":[],"missingImports":["Old"]}}"#
        );
        let event = ServerEvent::from_json(&json).unwrap();
        assert_eq!(event.page_id(), "index.md");
        assert_eq!(event.rendered()[&id], "<b>1</b>");
        let ServerEvent::MarkdownUpdate { missing_imports, .. } = event else {
            panic!("expected a markdown update");
        };
        assert!(missing_imports.contains("Old"));
    }

    #[test]
    fn render_request_round_trips() {
        let request = ClientEvent::RenderRequest {
            page_id: "index.md".into(),
            update_type: UpdateType::MarkdownUpdate,
            items: vec![RenderItem {
                render_id: RenderId::derive("index.md", 1),
                component_name: "Counter".into(),
                props: [Attribute::new("initial", "3")].into_iter().collect(),
            }],
        };
        let json = request.to_json().unwrap();
        assert!(json.contains("\"updateType\":\"markdown-update\""));
        assert_eq!(serde_json::from_str::<ClientEvent>(&json).unwrap(), request);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(
            ServerEvent::from_json("{\"type\":\"nope\"}"),
            Err(crate::RuntimeError::MalformedMessage(_))
        ));
    }
}
