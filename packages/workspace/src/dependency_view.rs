//! View page showing a resolved dependency tree
//!
//! A [`DependencyView`] is a [`ViewPage`]: bind it to a session with a
//! `ViewBinding` and it requests its tree when bound. Results come back
//! from the scheduler's workers and reach the [`DependencyPage`] only on the
//! interactive thread, through [`DependencyView::poll`] or
//! [`DependencyView::settle`].

use quire_editor::{ChangeEvent, ErrorKind, ObjectModel, ViewPage};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::dependency::DependencyTree;
use crate::resolver::{ResolutionError, ResolveKey};
use crate::scheduler::{DerivedDataScheduler, Resolution, ResolveTicket};

/// Renders dependency trees
pub trait DependencyPage {
    /// A resolution was requested; show progress
    fn on_loading(&self) {}

    fn on_resolved(&self, tree: &DependencyTree);

    fn on_error(&self, kind: ErrorKind, message: &str);
}

pub struct DependencyView {
    scheduler: DerivedDataScheduler,
    key: ResolveKey,
    page: Rc<dyn DependencyPage>,
    ticket: RefCell<Option<ResolveTicket>>,
    requests: Cell<u64>,
    tree: RefCell<Option<Arc<DependencyTree>>>,
    disposed: Cell<bool>,
}

impl DependencyView {
    pub fn new(scheduler: DerivedDataScheduler, key: ResolveKey, page: Rc<dyn DependencyPage>) -> Self {
        Self {
            scheduler,
            key,
            page,
            ticket: RefCell::new(None),
            requests: Cell::new(0),
            tree: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    pub fn key(&self) -> &ResolveKey {
        &self.key
    }

    /// Last tree handed to the page
    pub fn tree(&self) -> Option<Arc<DependencyTree>> {
        self.tree.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.ticket.borrow().is_some()
    }

    /// Request the tree, from cache when available
    pub fn load(&self) {
        self.request(false);
    }

    /// Request a fresh resolution
    pub fn refresh(&self) {
        self.request(true);
    }

    /// Deliver a finished resolution, if there is one; never blocks
    pub fn poll(&self) -> bool {
        if self.disposed.get() {
            return false;
        }
        let result = {
            let mut slot = self.ticket.borrow_mut();
            let Some(result) = slot.as_mut().and_then(ResolveTicket::try_take) else {
                return false;
            };
            slot.take();
            result
        };
        self.deliver(result);
        true
    }

    /// Wait for the pending resolution and deliver it
    ///
    /// Returns `false` when nothing was pending, or when the view was
    /// disposed or re-requested while waiting.
    pub async fn settle(&self) -> bool {
        let Some(ticket) = self.ticket.borrow_mut().take() else {
            return false;
        };
        let request = self.requests.get();
        let result = ticket.wait().await;
        if self.disposed.get() || self.requests.get() != request {
            return false;
        }
        self.deliver(result);
        true
    }

    pub fn dispose(&self) {
        self.disposed.set(true);
        self.ticket.borrow_mut().take();
        self.tree.borrow_mut().take();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn request(&self, force: bool) {
        if self.disposed.get() {
            return;
        }
        let ticket = self.scheduler.request(self.key.clone(), force);
        self.requests.set(self.requests.get() + 1);
        // The new claim is registered before the old one is released
        let superseded = self.ticket.replace(Some(ticket));
        drop(superseded);
        self.page.on_loading();
    }

    fn deliver(&self, result: Resolution) {
        match result {
            Ok(tree) => {
                self.page.on_resolved(&tree);
                *self.tree.borrow_mut() = Some(tree);
            }
            Err(ResolutionError::Cancelled) => {}
            Err(err) => self.page.on_error(ErrorKind::Resolution, &err.to_string()),
        }
    }
}

impl ViewPage for DependencyView {
    fn on_bound(&self, _model: &ObjectModel) {
        self.load();
    }

    fn on_event(&self, _event: &ChangeEvent) {}

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.page.on_error(kind, message);
    }

    fn on_disposed(&self) {
        self.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}
