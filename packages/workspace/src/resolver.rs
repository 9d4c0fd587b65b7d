use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::dependency::DependencyTree;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Resolution failed: {0}")]
    Failed(String),

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Resolver worker failed: {0}")]
    Worker(String),
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// What a resolution is computed for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    /// Project descriptor the tree is resolved from
    pub descriptor: PathBuf,
    pub scope: String,
}

impl ResolveKey {
    pub fn new(descriptor: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            scope: scope.into(),
        }
    }
}

/// Cooperative cancellation shared with a running resolution
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Bail out between resolution steps
    pub fn check(&self) -> ResolutionResult<()> {
        if self.is_cancelled() {
            Err(ResolutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// External dependency resolver
///
/// Called on a blocking worker thread. Long resolutions should call
/// [`CancelFlag::check`] between steps.
pub trait DependencyResolver: Send + Sync + 'static {
    fn resolve(&self, key: &ResolveKey, cancel: &CancelFlag) -> ResolutionResult<DependencyTree>;
}

impl<F> DependencyResolver for F
where
    F: Fn(&ResolveKey, &CancelFlag) -> ResolutionResult<DependencyTree> + Send + Sync + 'static,
{
    fn resolve(&self, key: &ResolveKey, cancel: &CancelFlag) -> ResolutionResult<DependencyTree> {
        self(key, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{Artifact, DependencyNode};

    #[test]
    fn test_closure_resolver_sees_cancellation() {
        let resolver = |key: &ResolveKey, cancel: &CancelFlag| -> ResolutionResult<DependencyTree> {
            cancel.check()?;
            Ok(DependencyTree::new(DependencyNode::included(
                Artifact::new("org.acme", "app", "1.0"),
                key.scope.clone(),
            )))
        };
        let key = ResolveKey::new("/work/pom.xml", "compile");
        let cancel = CancelFlag::new();

        let tree = resolver.resolve(&key, &cancel).unwrap();
        assert_eq!(tree.root.scope, "compile");

        cancel.clone().cancel();
        assert_eq!(resolver.resolve(&key, &cancel), Err(ResolutionError::Cancelled));
    }
}
