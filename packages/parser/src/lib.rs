//! # Quire Parser
//!
//! Markup text → [`ObjectModel`] and back.
//!
//! The object model mirrors the element structure of the text. Every node
//! remembers the byte ranges it was parsed from, which lets the
//! [`LosslessSerializer`] copy untouched text verbatim and lets callers turn
//! a model edit into a minimal [`TextPatch`].

pub mod ast;
pub mod error;
pub mod escape;
pub mod id_generator;
pub mod parser;
pub mod patch;
pub mod serializer;
pub mod tokenizer;

#[cfg(test)]
mod tests_serializer;

pub use ast::{AttrSpan, Attribute, ModelNode, NodeSpan, ObjectModel, TextRange};
pub use error::{ParseError, ParseResult};
pub use id_generator::{document_id, IDGenerator};
pub use parser::{parse, parse_with_ids, parse_with_path, Parser};
pub use patch::{content_hash, PatchError, PatchOutcome, TextEdit, TextPatch};
pub use serializer::{serialize, LosslessSerializer, Serializer};
