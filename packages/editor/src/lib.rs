//! # Quire Editor
//!
//! Editing engine keeping a markup document's text and its object model in
//! step while several views edit it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: text → ObjectModel (+ text ranges)  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document + CommandStack             │
//! │  - Commands validated and applied to model  │
//! │  - Minimal TextPatch per command (bridge)   │
//! │  - Re-parse verification, exact undo/redo   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ ChangeBus → ViewBinding → ViewPage          │
//! │  - Ordered delivery, no echo to originator  │
//! │  - Lazy binding, reload, disposal           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **One truth, two shapes**: after every transaction the text parses to
//!    exactly the model
//! 2. **Minimal text changes**: formatting, comments and quoting outside the
//!    edited spot survive byte-for-byte
//! 3. **Transactions**: a compound command applies fully or not at all and
//!    is undone in one step
//! 4. **Interactive thread**: sessions and bindings are `!Send`; background
//!    work hands results back by message
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quire_editor::{EditCommand, EditSession, ViewBinding, DocumentOptions};
//!
//! let session = EditSession::open("pom.xml", source, DocumentOptions::default());
//! let overview = ViewBinding::new(&session, overview_page);
//! overview.activate()?;
//!
//! overview.execute(EditCommand::set_attribute(dep_id, "scope", "test"))?;
//! session.undo()?;
//! let text = session.mark_saved()?;
//! ```

mod binding;
mod bridge;
mod builder;
mod bus;
mod document;
mod errors;
mod mutations;
mod session;
mod undo_stack;

pub use binding::{BindingState, ViewBinding, ViewPage};
pub use bridge::{BridgeError, BridgeResult, DocumentBridge, DEFAULT_INDENT_UNIT};
pub use builder::CommandBuilder;
pub use bus::{ChangeBus, ChangeEvent, ChangeKind, ChangeListener, ListenerId, Notification, Subscription};
pub use document::{Document, DocumentOptions, DocumentStorage};
pub use errors::{EditorError, EditorResult, ErrorKind};
pub use mutations::{normalize_text, CompoundCommand, EditCommand, MutationError};
pub use session::EditSession;
pub use undo_stack::{AppliedStep, CommandStack, Transaction, DEFAULT_UNDO_LEVELS};

// Re-export common types for convenience
pub use quire_parser::ast::{ModelNode, ObjectModel, TextRange};
