#![deny(missing_docs)]
//! Browser-side islands runtime: directive activation, the dev update
//! channel and the live-edit reconciler, written as host-driven state
//! machines.

/// Dev-channel message types.
pub mod channel;
/// Runtime error types.
pub mod error;
/// Live-edit reconciliation.
pub mod reconciler;
/// Directive activation state machine.
pub mod runtime;

pub use channel::{
    CLIENT_EVENT_NAME, ClientEvent, RenderItem, RenderedMap, SERVER_EVENT_NAME, ServerEvent,
    UpdateType,
};
pub use error::RuntimeError;
pub use reconciler::{
    ComponentRegistry, ElementRecord, ElementSnapshot, ReconcileAction, ReconcilePlan,
    client_registry, initial_records, reconcile,
};
pub use runtime::{
    ClientRuntime, ContainerState, DirectiveHandler, Effect, HandlerTable, MountMode,
    RuntimeEvent, Step, default_handlers,
};
