#![deny(missing_docs)]
//! Islands build engine: two-phase page builds, manifests, HTML injection
//! and the dev-server session.

/// Content-hashed assets and build options.
pub mod assets;
/// Client entry and inject-only script generation.
pub mod codegen;
/// Dev-server live editing session.
pub mod dev;
/// Build error types.
pub mod error;
/// Injection of server output into rendered pages.
pub mod inject;
/// Page and site manifests.
pub mod manifest;
/// Server and browser build passes.
pub mod orchestrator;
/// Waiters for not-yet-produced values.
pub mod pending;
/// Shared compilation and manifest stores.
pub mod store;

pub use assets::{AssetSet, BuildOptions, content_hash, hashed_file_name, write_assets};
pub use codegen::{RUNTIME_MODULE, client_entry_source, inject_only_script};
pub use dev::{DevSession, HotUpdatePolicy, PageUpdate, SharedResolver};
pub use error::BuildError;
pub use inject::{InjectionHandlers, inject_page_html};
pub use manifest::{
    ComponentBundleInfo, PageManifest, SITE_MANIFEST_FILE, SiteManifest, SnippetMap, UsedSnippet,
};
pub use orchestrator::{
    BrowserPass, BundleOutput, ClientBundler, ClientEntry, CollaboratorError, ComponentRef,
    Orchestrator, PageBuildOutput, PageBuildPlan, RenderedHtml, ServerRenderer, SiteBuild, SsrJob,
};
pub use pending::{DEFAULT_WAIT_TIMEOUT, PendingError, PendingRegistry};
pub use store::{CompilationStore, ManifestStore};
