//! # View Page Binding
//!
//! Attaches one page of a multi-page editor to an [`EditSession`].
//!
//! ```text
//!            activate                 deactivate
//! Unbound ──────────→ Loading ──→ Active ⇄ Inactive
//!                        ↑          │         │
//!                        └─ reload ─┴─────────┘
//!                                   │ dispose (from any state)
//!                                   ↓
//!                               Disposed
//! ```
//!
//! Pages are bound lazily, on first activation. While inactive a page keeps
//! receiving events and may defer expensive work; the binding counts the
//! deferred events and re-binds the page on its next activation. A disposed
//! binding never reaches its page again.
//!
//! Errors caused by one page's edit are reported to that page only.
//! Document-wide conditions (parse errors after a reload, external-change
//! conflicts) go to every bound page through the session.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use quire_parser::ast::ObjectModel;

use crate::bus::{ChangeEvent, ChangeListener, Subscription};
use crate::errors::{EditorError, EditorResult, ErrorKind};
use crate::mutations::CompoundCommand;
use crate::session::EditSession;

/// One view of the document
///
/// `on_bound` runs while the document is being read and must not issue
/// commands; edits made from `on_event` are fine.
pub trait ViewPage {
    /// The page is (re)bound to `model` and should render it from scratch
    fn on_bound(&self, model: &ObjectModel);

    fn on_event(&self, event: &ChangeEvent);

    /// The document was replaced; the page is about to be re-bound
    fn on_reload_required(&self) {}

    fn on_error(&self, kind: ErrorKind, message: &str);

    /// The binding was disposed; the page will hear nothing more
    fn on_disposed(&self) {}

    fn is_active(&self) -> bool {
        true
    }

    fn is_disposed(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Loading,
    Active,
    Inactive,
    Disposed,
}

pub(crate) struct BindingInner {
    page: Rc<dyn ViewPage>,
    session: Weak<EditSession>,
    /// Root of the subtree the page shows, `None` for the whole model
    scope: Option<String>,
    state: Cell<BindingState>,
    read_only: Cell<bool>,
    deferred: Cell<usize>,
    subscription: RefCell<Option<Subscription>>,
    this: Weak<BindingInner>,
}

impl BindingInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.state.get() == BindingState::Disposed || self.page.is_disposed()
    }

    fn session(&self) -> EditorResult<Rc<EditSession>> {
        self.session.upgrade().ok_or(EditorError::Disposed)
    }

    pub(crate) fn report(&self, kind: ErrorKind, message: &str) {
        if !self.is_disposed() {
            self.page.on_error(kind, message);
        }
    }

    /// Subscribe and hand the current model to the page, ending in `target`
    fn load(self: &Rc<Self>, target: BindingState) -> EditorResult<()> {
        let session = self.session()?;
        self.state.set(BindingState::Loading);
        self.subscription.borrow_mut().take();

        let listener: Rc<dyn ChangeListener> = self.clone();
        let subscription = session.subscribe(self.scope.as_deref(), listener);
        *self.subscription.borrow_mut() = Some(subscription);

        let parse_error = session.read(|document| match document.model() {
            Some(model) => {
                self.page.on_bound(model);
                None
            }
            None => document.parse_error().map(|e| e.to_string()),
        })?;
        if let Some(message) = parse_error {
            self.report(ErrorKind::Parse, &message);
        }

        self.deferred.set(0);
        self.state.set(target);
        tracing::debug!(state = ?target, scope = ?self.scope, "view bound");
        Ok(())
    }

    fn reload(self: &Rc<Self>) -> EditorResult<()> {
        match self.state.get() {
            BindingState::Disposed => Err(EditorError::Disposed),
            BindingState::Unbound => Ok(()),
            BindingState::Inactive => self.load(BindingState::Inactive),
            BindingState::Active | BindingState::Loading => self.load(BindingState::Active),
        }
    }

    pub(crate) fn reload_required(self: &Rc<Self>) {
        if matches!(self.state.get(), BindingState::Unbound | BindingState::Disposed) {
            return;
        }
        self.page.on_reload_required();
        if let Err(err) = self.reload() {
            tracing::warn!(error = %err, "view could not be re-bound");
        }
    }

    pub(crate) fn dispose(&self) {
        if self.state.replace(BindingState::Disposed) == BindingState::Disposed {
            return;
        }
        self.subscription.borrow_mut().take();
        if let Some(session) = self.session.upgrade() {
            session.unregister(&self.this);
        }
        self.page.on_disposed();
    }
}

impl ChangeListener for BindingInner {
    fn on_event(&self, event: &ChangeEvent) {
        match self.state.get() {
            BindingState::Active | BindingState::Inactive => {}
            _ => return,
        }
        // Reloads reach the page through `on_reload_required`
        if self.page.is_disposed() || matches!(event, ChangeEvent::Reloaded) {
            return;
        }

        if self.state.get() == BindingState::Inactive || !self.page.is_active() {
            self.deferred.set(self.deferred.get() + 1);
        }
        self.page.on_event(event);
    }
}

/// Owning handle of a page's binding; dropping it disposes the binding
pub struct ViewBinding {
    inner: Rc<BindingInner>,
}

impl ViewBinding {
    pub fn new(session: &Rc<EditSession>, page: Rc<dyn ViewPage>) -> Self {
        Self::create(session, page, None)
    }

    /// Bind a page that only shows the subtree below `root_id`
    pub fn scoped(session: &Rc<EditSession>, page: Rc<dyn ViewPage>, root_id: impl Into<String>) -> Self {
        Self::create(session, page, Some(root_id.into()))
    }

    fn create(session: &Rc<EditSession>, page: Rc<dyn ViewPage>, scope: Option<String>) -> Self {
        let inner = Rc::new_cyclic(|this| BindingInner {
            page,
            session: Rc::downgrade(session),
            scope,
            state: Cell::new(BindingState::Unbound),
            read_only: Cell::new(false),
            deferred: Cell::new(0),
            subscription: RefCell::new(None),
            this: this.clone(),
        });
        session.register(Rc::downgrade(&inner));
        Self { inner }
    }

    pub fn state(&self) -> BindingState {
        self.inner.state.get()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.set(read_only);
    }

    /// Whether edits through this page are refused
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.get()
            || self
                .inner
                .session()
                .map(|session| session.is_read_only())
                .unwrap_or(true)
    }

    /// Events received while inactive and not yet rendered
    pub fn deferred_events(&self) -> usize {
        self.inner.deferred.get()
    }

    pub fn activate(&self) -> EditorResult<()> {
        match self.inner.state.get() {
            BindingState::Disposed => Err(EditorError::Disposed),
            BindingState::Unbound => self.inner.load(BindingState::Active),
            BindingState::Inactive if self.inner.deferred.get() > 0 => self.inner.load(BindingState::Active),
            BindingState::Inactive => {
                self.inner.state.set(BindingState::Active);
                Ok(())
            }
            BindingState::Active | BindingState::Loading => Ok(()),
        }
    }

    pub fn deactivate(&self) {
        if self.inner.state.get() == BindingState::Active {
            self.inner.state.set(BindingState::Inactive);
        }
    }

    /// Drop the current binding and bind again to the current model
    pub fn reload(&self) -> EditorResult<()> {
        self.inner.reload()
    }

    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Execute an edit on behalf of this page
    pub fn execute(&self, command: impl Into<CompoundCommand>) -> EditorResult<()> {
        let session = self.writable_session()?;
        session.execute(command).map_err(|err| self.failed(err))
    }

    pub fn undo(&self) -> EditorResult<bool> {
        let session = self.writable_session()?;
        session.undo().map_err(|err| self.failed(err))
    }

    pub fn redo(&self) -> EditorResult<bool> {
        let session = self.writable_session()?;
        session.redo().map_err(|err| self.failed(err))
    }

    fn writable_session(&self) -> EditorResult<Rc<EditSession>> {
        if self.inner.state.get() == BindingState::Disposed {
            return Err(EditorError::Disposed);
        }
        let session = self.inner.session()?;
        if self.is_read_only() {
            return Err(self.failed(EditorError::ReadOnlyViolation));
        }
        Ok(session)
    }

    fn failed(&self, err: EditorError) -> EditorError {
        tracing::debug!(error = %err, "edit refused");
        self.inner.report(err.kind(), &err.to_string());
        err
    }
}

impl Drop for ViewBinding {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;
    use crate::mutations::EditCommand;

    #[derive(Default)]
    struct Page {
        bound: Cell<usize>,
        events: RefCell<Vec<ChangeEvent>>,
        errors: RefCell<Vec<ErrorKind>>,
        reloads: Cell<usize>,
        disposed: Cell<usize>,
    }

    impl ViewPage for Page {
        fn on_bound(&self, _model: &ObjectModel) {
            self.bound.set(self.bound.get() + 1);
        }

        fn on_event(&self, event: &ChangeEvent) {
            self.events.borrow_mut().push(event.clone());
        }

        fn on_reload_required(&self) {
            self.reloads.set(self.reloads.get() + 1);
        }

        fn on_error(&self, kind: ErrorKind, _message: &str) {
            self.errors.borrow_mut().push(kind);
        }

        fn on_disposed(&self) {
            self.disposed.set(self.disposed.get() + 1);
        }
    }

    fn session() -> Rc<EditSession> {
        EditSession::open(
            "/work/pom.xml",
            "<project>\n  <name>a</name>\n</project>\n",
            DocumentOptions::default(),
        )
    }

    fn name_id(session: &EditSession) -> String {
        session
            .with_model(|m| m.find_path(&["name"]).map(|n| n.id.clone()))
            .unwrap()
            .flatten()
            .unwrap()
    }

    #[test]
    fn test_lazy_binding() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());

        assert_eq!(binding.state(), BindingState::Unbound);
        assert_eq!(page.bound.get(), 0);

        binding.activate().unwrap();
        assert_eq!(binding.state(), BindingState::Active);
        assert_eq!(page.bound.get(), 1);
    }

    #[test]
    fn test_inactive_page_defers_and_rebinds() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();
        binding.deactivate();

        session.execute(EditCommand::set_text(name_id(&session), Some("b"))).unwrap();
        assert_eq!(page.events.borrow().len(), 1);
        assert_eq!(binding.deferred_events(), 1);

        binding.activate().unwrap();
        assert_eq!(page.bound.get(), 2);
        assert_eq!(binding.deferred_events(), 0);
    }

    #[test]
    fn test_disposed_page_receives_nothing() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();
        binding.dispose();
        binding.dispose();
        assert_eq!(page.disposed.get(), 1);

        session.execute(EditCommand::set_text(name_id(&session), Some("b"))).unwrap();
        session.reload("<project/>".to_string()).unwrap();

        assert!(page.events.borrow().is_empty());
        assert_eq!(page.reloads.get(), 0);
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(binding.activate(), Err(EditorError::Disposed));
        assert_eq!(session.binding_count(), 0);
    }

    #[test]
    fn test_read_only_page_cannot_edit() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();
        binding.set_read_only(true);

        let before = session.text().unwrap();
        let err = binding.execute(EditCommand::set_text(name_id(&session), Some("b")));

        assert_eq!(err, Err(EditorError::ReadOnlyViolation));
        assert_eq!(session.text().unwrap(), before);
        assert!(!session.can_undo());
        assert_eq!(*page.errors.borrow(), vec![ErrorKind::ReadOnlyViolation]);
    }

    #[test]
    fn test_failed_edit_reported_to_originator_only() {
        let session = session();
        let editor = Rc::new(Page::default());
        let other = Rc::new(Page::default());
        let editor_binding = ViewBinding::new(&session, editor.clone());
        let other_binding = ViewBinding::new(&session, other.clone());
        editor_binding.activate().unwrap();
        other_binding.activate().unwrap();

        let err = editor_binding.execute(EditCommand::set_text("missing", Some("x")));
        assert!(err.is_err());
        assert_eq!(*editor.errors.borrow(), vec![ErrorKind::EditFailed]);
        assert!(other.errors.borrow().is_empty());
    }

    #[test]
    fn test_reload_rebinds_every_page() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();

        session.reload("<project><name>z</name></project>".to_string()).unwrap();

        assert_eq!(page.reloads.get(), 1);
        assert_eq!(page.bound.get(), 2);
        assert_eq!(binding.state(), BindingState::Active);
        // The reload itself is not delivered as a model event
        assert!(page.events.borrow().is_empty());
    }

    #[test]
    fn test_degraded_document_reports_parse_error_once() {
        let session = EditSession::open("/broken.xml", "<project>", DocumentOptions::default());
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();

        assert_eq!(*page.errors.borrow(), vec![ErrorKind::Parse]);
        assert_eq!(page.bound.get(), 0);
        assert!(binding.is_read_only());
    }

    #[test]
    fn test_drop_disposes() {
        let session = session();
        let page = Rc::new(Page::default());
        {
            let binding = ViewBinding::new(&session, page.clone());
            binding.activate().unwrap();
            assert_eq!(session.bus().listener_count(), 1);
        }
        assert_eq!(session.bus().listener_count(), 0);
        assert_eq!(session.binding_count(), 0);
        assert_eq!(page.disposed.get(), 1);
    }

    #[test]
    fn test_session_close_disposes_pages() {
        let session = session();
        let page = Rc::new(Page::default());
        let binding = ViewBinding::new(&session, page.clone());
        binding.activate().unwrap();

        session.close();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(page.disposed.get(), 1);

        drop(binding);
        assert_eq!(page.disposed.get(), 1);
    }
}
