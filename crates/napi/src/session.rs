//! Dev-server hooks: page edits, render requests and hot-update routing.
//!
//! Rendering stays on the JS side. Each hook returns a pending update whose
//! `render` items the host renders before calling `finishUpdate`.

use crate::convert::{convert_build_error, from_json, to_compile_options, to_json};
use crate::types::{CompilerConfig, RenderedEntry};
use islands_build::{DevSession, HotUpdatePolicy, PageUpdate};
use islands_core::RenderId;
use islands_runtime::{ClientEvent, RenderedMap};
use napi::{Error, Status};
use napi_derive::napi;
use serde_json::Value as JsonValue;

/// Live-edit session shared by the dev server's hooks.
#[napi]
pub struct IslandsDevSession {
    inner: DevSession,
}

#[napi]
impl IslandsDevSession {
    #[napi(constructor)]
    /// Creates a session with an empty compilation store.
    pub fn new(config: Option<CompilerConfig>) -> Self {
        Self {
            inner: DevSession::new().with_options(to_compile_options(config.as_ref())),
        }
    }

    /// Recompiles an edited page and returns the pending update.
    #[napi(js_name = "pageChanged")]
    pub fn page_changed(&self, page_id: String, source: String) -> napi::Result<JsonValue> {
        let update = self
            .inner
            .prepare_page_update(&page_id, &source)
            .map_err(convert_build_error)?;
        to_json(&update)
    }

    /// Validates a browser render request (the channel payload) and returns
    /// the pending answer.
    #[napi(js_name = "renderRequest")]
    pub fn render_request(&self, message: String) -> napi::Result<JsonValue> {
        let request: ClientEvent = serde_json::from_str(&message)
            .map_err(|e| Error::new(Status::InvalidArg, format!("Invalid render request: {}", e)))?;
        let update = self
            .inner
            .prepare_render_request(&request)
            .map_err(convert_build_error)?;
        to_json(&update)
    }

    /// Pending `ssr:only` patches after a component module changed.
    #[napi(js_name = "componentChanged")]
    pub fn component_changed(&self, module: String) -> napi::Result<Vec<JsonValue>> {
        self.inner
            .prepare_component_updates(&module)
            .iter()
            .map(to_json)
            .collect()
    }

    /// Completes a pending update with host-rendered markup and returns the
    /// server event to send.
    #[napi(js_name = "finishUpdate")]
    pub fn finish_update(
        &self,
        update: JsonValue,
        rendered: Vec<RenderedEntry>,
    ) -> napi::Result<JsonValue> {
        let update: PageUpdate = from_json(update, "pending update")?;
        let mut map = RenderedMap::new();
        for entry in rendered {
            let id = RenderId::new(entry.render_id)
                .map_err(|e| Error::new(Status::InvalidArg, e.to_string()))?;
            map.insert(id, entry.html);
        }
        to_json(&update.into_event(map))
    }

    /// `owned` when the islands channel handles a change to `module`,
    /// `hostDefault` otherwise.
    #[napi(js_name = "hotUpdatePolicy")]
    pub fn hot_update_policy(&self, module: String) -> String {
        match self.inner.hot_update_policy(&module) {
            HotUpdatePolicy::Owned => "owned".to_string(),
            HotUpdatePolicy::HostDefault => "hostDefault".to_string(),
        }
    }

    /// Forgets a page and rejects anyone waiting for it.
    #[napi(js_name = "pageRemoved")]
    pub fn page_removed(&self, page_id: String) -> bool {
        self.inner.on_page_removed(&page_id).is_some()
    }

    /// Latest compilation container of a page.
    #[napi(js_name = "compiledPage")]
    pub fn compiled_page(&self, page_id: String) -> napi::Result<Option<JsonValue>> {
        self.inner
            .store()
            .get(&page_id)
            .map(|page| to_json(page.as_ref()))
            .transpose()
    }
}
