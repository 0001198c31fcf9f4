//! Keyed stores shared between the compiler, the orchestrator and readers.
//!
//! Each store has a single writer: the compiler publishes compilations, the
//! orchestrator publishes manifests. Everyone else reads clones.

use crate::manifest::{PageManifest, SiteManifest, SnippetMap};
use crate::pending::{PendingError, PendingRegistry};
use islands_core::CompilationContainer;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Page id → latest compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilationStore {
    inner: Arc<RwLock<HashMap<String, Arc<CompilationContainer>>>>,
    pending: PendingRegistry<String, Arc<CompilationContainer>>,
}

impl CompilationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a compilation and wakes everyone waiting for it. Returns the
    /// compilation it replaced.
    pub fn publish(&self, container: CompilationContainer) -> Option<Arc<CompilationContainer>> {
        let page_id = container.page_id.clone();
        let container = Arc::new(container);
        let previous = {
            let mut map = self.inner.write().expect("compilation store poisoned");
            map.insert(page_id.clone(), Arc::clone(&container))
        };
        let woken = self.pending.resolve(&page_id, container);
        if woken > 0 {
            log::debug!("published {} to {} waiter(s)", page_id, woken);
        }
        previous
    }

    /// Latest compilation of a page.
    pub fn get(&self, page_id: &str) -> Option<Arc<CompilationContainer>> {
        let map = self.inner.read().expect("compilation store poisoned");
        map.get(page_id).cloned()
    }

    /// The stored compilation, or the next one published within `timeout`.
    pub async fn get_or_wait(
        &self,
        page_id: &str,
        timeout: Duration,
    ) -> Result<Arc<CompilationContainer>, PendingError> {
        let waiter = {
            // Hold the read lock while registering so a concurrent publish
            // cannot slip between the lookup and the subscription.
            let map = self.inner.read().expect("compilation store poisoned");
            if let Some(found) = map.get(page_id) {
                return Ok(Arc::clone(found));
            }
            self.pending.wait(page_id.to_string(), timeout)
        };
        waiter.await
    }

    /// Drops a page and rejects its waiters.
    pub fn invalidate(&self, page_id: &str, reason: &str) -> Option<Arc<CompilationContainer>> {
        let removed = {
            let mut map = self.inner.write().expect("compilation store poisoned");
            map.remove(page_id)
        };
        self.pending.cancel(&page_id.to_string(), reason);
        removed
    }

    /// Clears the store and rejects every waiter with a reset.
    pub fn reset(&self) {
        self.inner.write().expect("compilation store poisoned").clear();
        self.pending.reset();
    }

    /// Page ids whose compilation imports `module`.
    pub fn pages_importing(&self, module: &str) -> Vec<Arc<CompilationContainer>> {
        let map = self.inner.read().expect("compilation store poisoned");
        let mut pages: Vec<_> = map
            .values()
            .filter(|c| c.imports_by_local_name.values().any(|b| b.module == module))
            .cloned()
            .collect();
        pages.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        pages
    }

    /// Whether a page is stored.
    pub fn contains(&self, page_id: &str) -> bool {
        let map = self.inner.read().expect("compilation store poisoned");
        map.contains_key(page_id)
    }

    /// Number of stored pages.
    pub fn len(&self) -> usize {
        let map = self.inner.read().expect("compilation store poisoned");
        map.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Page path → manifest and build snippets.
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    manifests: Arc<RwLock<HashMap<String, PageManifest>>>,
    snippets: Arc<RwLock<HashMap<String, SnippetMap>>>,
}

impl ManifestStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page's build output.
    pub fn insert(&self, page: &str, manifest: PageManifest, snippets: SnippetMap) {
        self.manifests
            .write()
            .expect("manifest store poisoned")
            .insert(page.to_string(), manifest);
        self.snippets
            .write()
            .expect("snippet store poisoned")
            .insert(page.to_string(), snippets);
    }

    /// Manifest of a page.
    pub fn manifest(&self, page: &str) -> Option<PageManifest> {
        let map = self.manifests.read().expect("manifest store poisoned");
        map.get(page).cloned()
    }

    /// Build snippets of a page.
    pub fn snippets(&self, page: &str) -> Option<SnippetMap> {
        let map = self.snippets.read().expect("snippet store poisoned");
        map.get(page).cloned()
    }

    /// Ordered site manifest of everything stored.
    pub fn site_manifest(&self) -> SiteManifest {
        let map = self.manifests.read().expect("manifest store poisoned");
        let mut site = SiteManifest::new();
        for (page, manifest) in map.iter() {
            site.insert(page.clone(), manifest.clone());
        }
        site
    }

    /// Removes a page.
    pub fn remove(&self, page: &str) {
        self.manifests.write().expect("manifest store poisoned").remove(page);
        self.snippets.write().expect("snippet store poisoned").remove(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn container(page: &str) -> CompilationContainer {
        CompilationContainer::new(page, BTreeMap::new(), Vec::new())
    }

    #[tokio::test]
    async fn waiters_get_the_published_compilation() {
        let store = CompilationStore::new();
        let waiting = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_wait("index.md", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        assert!(store.publish(container("index.md")).is_none());
        let got = waiting.await.unwrap().unwrap();
        assert_eq!(got.page_id, "index.md");
    }

    #[tokio::test]
    async fn stored_pages_return_immediately() {
        let store = CompilationStore::new();
        store.publish(container("index.md"));
        let got = store
            .get_or_wait("index.md", Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(got.page_id, "index.md");
    }

    #[tokio::test]
    async fn invalidation_cancels_waiters() {
        let store = CompilationStore::new();
        let waiting = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_wait("a.md", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        store.invalidate("a.md", "reset");
        assert_eq!(
            waiting.await.unwrap(),
            Err(PendingError::Cancelled("reset".into()))
        );
    }

    #[test]
    fn publish_replaces_wholesale() {
        let store = CompilationStore::new();
        store.publish(container("a.md"));
        let previous = store.publish(container("a.md"));
        assert!(previous.is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn site_manifest_is_ordered() {
        let store = ManifestStore::new();
        store.insert("z.md", PageManifest::default(), SnippetMap::new());
        store.insert("a.md", PageManifest::default(), SnippetMap::new());
        let site = store.site_manifest();
        let pages: Vec<_> = site.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(pages, vec!["a.md", "z.md"]);
    }
}
