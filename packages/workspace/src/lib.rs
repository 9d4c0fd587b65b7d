//! # Quire Workspace
//!
//! Everything around an editing session that is not the document itself:
//! resolving derived data in the background, noticing when the file on
//! disk changes, and opening and saving documents.
//!
//! ```text
//!   FileWatcher ──ResourceChange──→ ExternalChangeReconciler
//!                                    │ reload / conflict     │ invalidate
//!                                    ↓                       ↓
//!   EditorHost ──open/save──→ EditSession      DerivedDataScheduler ←─ DependencyResolver
//!                                    │ ViewBinding            │ ResolveTicket
//!                                    ↓                        ↓
//!                                 ViewPage  ←── poll ──  DependencyView
//! ```

pub mod config;
pub mod dependency;
pub mod dependency_view;
pub mod host;
pub mod reconciler;
pub mod resolver;
pub mod scheduler;
pub mod watcher;

pub use config::{ConfigError, EngineConfig, DEFAULT_CONFIG_NAME};
pub use dependency::{Artifact, DependencyNode, DependencyTree, GraphEdge, ResolutionState, TreeRow};
pub use dependency_view::{DependencyPage, DependencyView};
pub use host::{EditorHost, HostError, HostResult};
pub use reconciler::{
    ConflictChoice, ExternalChangeReconciler, Reconciliation, ReconcileError, ReconcileResult, ResourceChange,
    ResourceStamp,
};
pub use resolver::{CancelFlag, DependencyResolver, ResolutionError, ResolutionResult, ResolveKey};
pub use scheduler::{DerivedDataScheduler, Resolution, ResolveTicket};
pub use watcher::{FileWatcher, WatcherError, WatcherResult};
