//! # Document Bridge
//!
//! Keeps the document text and the object model in step.
//!
//! Every command is turned into a [`TextPatch`] against the current text
//! before the model changes. Patches touch only the bytes the command is
//! about: an attribute edit rewrites the value between its quotes, an
//! insertion copies the indentation of its neighbours, a removal takes the
//! line it sat on with it. Everything else (comments, whitespace, quoting,
//! declarations) stays byte-for-byte.
//!
//! After a patch lands, [`DocumentBridge::sync`] re-parses the text and
//! checks that it describes the model. The fresh text ranges are copied onto
//! the model nodes, which keep their ids.

use std::ops::Range;

use quire_parser::ast::{AttrSpan, ModelNode, NodeSpan, ObjectModel, TextRange};
use quire_parser::escape::{escape_attr, escape_text};
use quire_parser::tokenizer::{tokenize, Content};
use quire_parser::{
    content_hash, parse_with_ids, IDGenerator, ParseError, PatchError, PatchOutcome, Serializer, TextEdit, TextPatch,
};
use thiserror::Error;

use crate::mutations::{normalize_text, EditCommand, MutationError};

pub const DEFAULT_INDENT_UNIT: &str = "  ";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("No source location for {0}")]
    Unlocated(String),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Patched text no longer parses: {0}")]
    Reparse(#[from] ParseError),

    #[error("Patched text does not match the object model")]
    Diverged,

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Markup about to be placed into a parent
enum Insertion<'a> {
    /// A model node without source text, serialized in the local indentation
    Fresh(&'a ModelNode),
    /// Text lifted from elsewhere in the document
    Verbatim(&'a str),
}

impl Insertion<'_> {
    fn render(&self, indent: Option<&str>, unit: &str) -> String {
        match (self, indent) {
            (Insertion::Fresh(node), Some(base)) => Serializer::with_indent(base, unit).serialize_node(node),
            (Insertion::Fresh(node), None) => Serializer::new().serialize_node(node),
            (Insertion::Verbatim(text), _) => text.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentBridge {
    source: String,
    indent_unit: String,
    /// Most recent command run through [`DocumentBridge::serialize`]
    last: Option<(EditCommand, TextPatch)>,
}

impl DocumentBridge {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            indent_unit: DEFAULT_INDENT_UNIT.to_string(),
            last: None,
        }
    }

    /// Indentation used for nested elements of freshly inserted subtrees
    pub fn with_indent_unit(mut self, unit: impl Into<String>) -> Self {
        self.indent_unit = unit.into();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn indent_unit(&self) -> &str {
        &self.indent_unit
    }

    pub fn parse(&self, ids: &mut IDGenerator) -> Result<ObjectModel, ParseError> {
        parse_with_ids(&self.source, ids)
    }

    /// Replace the whole text, e.g. after an external change
    pub fn replace_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.last = None;
    }

    /// Compute the patch for `command` against the current text
    ///
    /// `model` must be in the state the command will be applied to, with
    /// text ranges matching the current text.
    pub fn plan(&self, command: &EditCommand, model: &ObjectModel) -> BridgeResult<TextPatch> {
        command.validate(model)?;

        let edits = match command {
            EditCommand::SetAttribute { node_id, name, value } => {
                vec![self.plan_set_attribute(node(model, node_id)?, name, value)?]
            }
            EditCommand::RemoveAttribute { node_id, name } => {
                vec![self.plan_remove_attribute(node(model, node_id)?, name)?]
            }
            EditCommand::SetText { node_id, text } => {
                self.plan_set_text(node(model, node_id)?, text.as_deref())?
            }
            EditCommand::InsertChild { parent_id, index, node: child } => {
                vec![self.plan_insertion(node(model, parent_id)?, *index, Insertion::Fresh(child))?]
            }
            EditCommand::RemoveChild { parent_id, index } => {
                vec![self.plan_removal(node(model, parent_id)?, *index)?]
            }
            EditCommand::MoveChild { node_id, new_parent_id, index } => {
                self.plan_move(model, node_id, new_parent_id, *index)?
            }
        };

        Ok(TextPatch::build(&self.source, edits)?)
    }

    /// Plan and apply in one go
    ///
    /// Serializing the same command twice against the same model leaves the
    /// text as after the first time.
    pub fn serialize(&mut self, command: &EditCommand, model: &ObjectModel) -> BridgeResult<TextPatch> {
        if let Some((previous, patch)) = &self.last {
            if previous == command && content_hash(&self.source) == patch.result_hash {
                tracing::debug!(command = command.name(), "command already serialized");
                return Ok(patch.clone());
            }
        }

        let patch = self.plan(command, model)?;
        self.apply(&patch)?;
        self.last = Some((command.clone(), patch.clone()));
        Ok(patch)
    }

    pub fn apply(&mut self, patch: &TextPatch) -> BridgeResult<PatchOutcome> {
        let outcome = patch.apply(&mut self.source)?;
        if outcome == PatchOutcome::AlreadyApplied {
            tracing::debug!("patch already applied, text unchanged");
        }
        Ok(outcome)
    }

    /// Undo a previously applied patch
    pub fn revert(&mut self, patch: &TextPatch) -> BridgeResult<PatchOutcome> {
        self.apply(&patch.inverted())
    }

    /// Re-parse the text, check it against `model` and refresh its text ranges
    pub fn sync(&self, model: &mut ObjectModel) -> BridgeResult<()> {
        let mut ids = IDGenerator::from_seed("sync".to_string());
        let parsed = self.parse(&mut ids)?;
        if parsed.root != model.root {
            tracing::warn!("re-parsed text diverges from the object model");
            return Err(BridgeError::Diverged);
        }

        adopt(&mut model.root, &parsed.root);
        Ok(())
    }

    /// Range of the element `node_id` in the text
    pub fn locate(&self, model: &ObjectModel, node_id: &str) -> Option<TextRange> {
        let span = model.find(node_id)?.span?;
        Some(TextRange::new(span.start, span.end - span.start))
    }

    /// Range of attribute `name` (name to closing quote) of `node_id`
    pub fn locate_attribute(&self, model: &ObjectModel, node_id: &str, name: &str) -> Option<TextRange> {
        let span = model.find(node_id)?.attribute_entry(name)?.span?;
        Some(TextRange::new(span.start, span.end - span.start))
    }

    fn plan_set_attribute(&self, node: &ModelNode, name: &str, value: &str) -> BridgeResult<TextEdit> {
        match node.attribute_entry(name) {
            Some(attr) => {
                let span: AttrSpan = attr.span.ok_or_else(|| unlocated(&node.id))?;
                Ok(TextEdit::replace(
                    &self.source,
                    span.value_start..span.value_end,
                    escape_attr(value, span.quote),
                ))
            }
            None => {
                let span = located(node)?;
                Ok(TextEdit::insert(
                    span.attrs_end,
                    format!(" {}=\"{}\"", name, escape_attr(value, '"')),
                ))
            }
        }
    }

    fn plan_remove_attribute(&self, node: &ModelNode, name: &str) -> BridgeResult<TextEdit> {
        let span = node
            .attribute_entry(name)
            .and_then(|a| a.span)
            .ok_or_else(|| unlocated(&node.id))?;
        let start = whitespace_start(&self.source, span.start);
        Ok(TextEdit::delete(&self.source, start..span.end))
    }

    fn plan_set_text(&self, node: &ModelNode, text: Option<&str>) -> BridgeResult<Vec<TextEdit>> {
        let span = located(node)?;
        let text = normalize_text(text);

        let edit = match (span.inner(), text) {
            (Some(inner), text) => {
                let tokens: Vec<_> = tokenize(&self.source[inner.clone()])
                    .into_iter()
                    .map(|(token, range)| (token, inner.start + range.start..inner.start + range.end))
                    .collect();
                if tokens
                    .iter()
                    .any(|(token, _)| matches!(token, Content::Comment | Content::ProcessingInstruction))
                {
                    return Ok(text_among_markup(&self.source, &tokens, text.as_deref())
                        .into_iter()
                        .collect());
                }
                let escaped = text.as_deref().map(escape_text).unwrap_or_default();
                TextEdit::replace(&self.source, inner, escaped)
            }
            (None, Some(text)) => TextEdit::replace(
                &self.source,
                span.attrs_end..span.end,
                format!(">{}</{}>", escape_text(&text), node.name),
            ),
            (None, None) => return Ok(Vec::new()),
        };
        Ok(vec![edit])
    }

    fn plan_insertion(&self, parent: &ModelNode, index: usize, insertion: Insertion<'_>) -> BridgeResult<TextEdit> {
        let span = located(parent)?;
        let unit = self.indent_unit.as_str();

        if parent.children.is_empty() {
            let Some(inner) = span.inner() else {
                let markup = insertion.render(None, unit);
                return Ok(TextEdit::replace(
                    &self.source,
                    span.attrs_end..span.end,
                    format!(">{}</{}>", markup, parent.name),
                ));
            };

            let content = &self.source[inner.clone()];
            if content.contains('\n') && content.trim().is_empty() {
                let indent = format!("{}{}", line_indent(&self.source, span.start).unwrap_or(""), unit);
                let markup = insertion.render(Some(&indent), unit);
                return Ok(TextEdit::insert(inner.start, format!("\n{}{}", indent, markup)));
            }
            return Ok(TextEdit::insert(inner.end, insertion.render(None, unit)));
        }

        if let Some(sibling) = parent.children.get(index) {
            let sibling = located(sibling)?;
            let edit = match line_indent(&self.source, sibling.start) {
                Some(indent) => {
                    let markup = insertion.render(Some(indent), unit);
                    TextEdit::insert(sibling.start, format!("{}\n{}", markup, indent))
                }
                None => TextEdit::insert(sibling.start, insertion.render(None, unit)),
            };
            return Ok(edit);
        }

        let last = parent
            .children
            .last()
            .ok_or_else(|| unlocated(&parent.id))
            .and_then(located)?;
        let edit = match line_indent(&self.source, last.start) {
            Some(indent) => {
                let markup = insertion.render(Some(indent), unit);
                TextEdit::insert(last.end, format!("\n{}{}", indent, markup))
            }
            None => TextEdit::insert(last.end, insertion.render(None, unit)),
        };
        Ok(edit)
    }

    fn plan_removal(&self, parent: &ModelNode, index: usize) -> BridgeResult<TextEdit> {
        let child = parent
            .children
            .get(index)
            .ok_or_else(|| unlocated(&parent.id))?;
        let span = located(child)?;

        let start = match line_indent(&self.source, span.start) {
            Some(indent) => line_break_start(&self.source, span.start - indent.len()),
            None => span.start,
        };
        Ok(TextEdit::delete(&self.source, start..span.end))
    }

    /// Removal plus verbatim re-insertion, the latter planned against the
    /// text as it reads after the removal
    fn plan_move(&self, model: &ObjectModel, node_id: &str, new_parent_id: &str, index: usize) -> BridgeResult<Vec<TextEdit>> {
        let moved = node(model, node_id)?;
        let span = located(moved)?;
        let markup = self.source[span.start..span.end].to_string();

        let old_parent = model
            .parent_of(node_id)
            .ok_or_else(|| MutationError::NodeNotFound(node_id.to_string()))?;
        let old_index = old_parent
            .child_index(node_id)
            .ok_or_else(|| MutationError::NodeNotFound(node_id.to_string()))?;
        let removal = self.plan_removal(old_parent, old_index)?;

        let mut intermediate = DocumentBridge::new(self.source.clone()).with_indent_unit(self.indent_unit.clone());
        let mut intermediate_model = model.clone();
        let remove = EditCommand::RemoveChild {
            parent_id: old_parent.id.clone(),
            index: old_index,
        };
        intermediate.apply(&TextPatch::build(&self.source, vec![removal.clone()])?)?;
        remove.apply(&mut intermediate_model)?;
        intermediate.sync(&mut intermediate_model)?;

        let insertion = intermediate.plan_insertion(
            node(&intermediate_model, new_parent_id)?,
            index,
            Insertion::Verbatim(&markup),
        )?;
        Ok(vec![removal, insertion])
    }
}

/// Copy text ranges of `parsed` onto the structurally equal `node`
fn adopt(node: &mut ModelNode, parsed: &ModelNode) {
    node.span = parsed.span;

    let mut reordered = Vec::with_capacity(parsed.attributes.len());
    for attr in &parsed.attributes {
        if let Some(pos) = node.attributes.iter().position(|a| a.name == attr.name) {
            let mut own = node.attributes.remove(pos);
            own.span = attr.span;
            reordered.push(own);
        }
    }
    node.attributes = reordered;

    for (child, parsed_child) in node.children.iter_mut().zip(&parsed.children) {
        adopt(child, parsed_child);
    }
}

fn node<'m>(model: &'m ObjectModel, id: &str) -> BridgeResult<&'m ModelNode> {
    model
        .find(id)
        .ok_or_else(|| BridgeError::Mutation(MutationError::NodeNotFound(id.to_string())))
}

fn located(node: &ModelNode) -> BridgeResult<NodeSpan> {
    node.span.ok_or_else(|| unlocated(&node.id))
}

fn unlocated(id: &str) -> BridgeError {
    BridgeError::Unlocated(id.to_string())
}

/// Indentation before `offset` when it is the first thing on its line
fn line_indent(source: &str, offset: usize) -> Option<&str> {
    let line_start = source[..offset].rfind('\n')? + 1;
    let indent = &source[line_start..offset];
    indent
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then_some(indent)
}

/// Offset of the line break ending just before `offset` (`\r\n` aware)
fn line_break_start(source: &str, offset: usize) -> usize {
    let before = &source[..offset];
    if before.ends_with("\r\n") {
        offset - 2
    } else if before.ends_with('\n') {
        offset - 1
    } else {
        offset
    }
}

/// Text edit for content mixing text with comments or processing
/// instructions; the markup is kept, the text goes after it
fn text_among_markup(source: &str, tokens: &[(Content, Range<usize>)], text: Option<&str>) -> Option<TextEdit> {
    let is_value = |(token, range): &(Content, Range<usize>)| match token {
        Content::CData => true,
        Content::Text => !source[range.clone()].trim().is_empty(),
        _ => false,
    };
    let escaped = text.map(escape_text).unwrap_or_default();

    let (Some(first), Some(last)) = (tokens.iter().position(is_value), tokens.iter().rposition(is_value)) else {
        text?;
        let end = tokens.last().map(|(_, range)| range.end)?;
        return Some(TextEdit::insert(end, escaped));
    };

    let (first_token, first_range) = &tokens[first];
    let start = match first_token {
        Content::Text => first_range.end - source[first_range.clone()].trim_start().len(),
        _ => first_range.start,
    };
    let (last_token, last_range) = &tokens[last];
    let end = match last_token {
        Content::Text => last_range.start + source[last_range.clone()].trim_end().len(),
        _ => last_range.end,
    };

    let mut replacement: String = tokens[first..=last]
        .iter()
        .filter(|(token, _)| matches!(token, Content::Comment | Content::ProcessingInstruction))
        .map(|(_, range)| &source[range.clone()])
        .collect();
    replacement.push_str(&escaped);
    Some(TextEdit::replace(source, start..end, replacement))
}

fn whitespace_start(source: &str, offset: usize) -> usize {
    let trimmed = source[..offset].trim_end_matches(|c: char| c.is_ascii_whitespace());
    trimmed.len()
}
