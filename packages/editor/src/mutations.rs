//! # Edit Commands
//!
//! Semantic operations on the object model.
//!
//! ## Design Principles
//!
//! 1. **Intent-preserving**: each command is one semantic change
//! 2. **Validated**: structural constraints are checked before anything moves
//! 3. **Invertible**: applying a command yields the command that undoes it
//!
//! ## Command Semantics
//!
//! ### Attributes and text
//! - `SetAttribute` adds or replaces, `RemoveAttribute` requires presence
//! - `SetText` trims its value; an empty value clears the text
//! - text is only allowed on elements without child elements
//!
//! ### Structure
//! - children are addressed by (parent, index)
//! - `MoveChild` index is the position inside the new parent after the node
//!   was taken out of its old one
//! - moving a node below itself is a cycle and fails

use std::collections::HashSet;

use crate::bus::ChangeEvent;
use quire_parser::ast::{ModelNode, ObjectModel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EditCommand {
    /// Add or replace an attribute
    SetAttribute {
        node_id: String,
        name: String,
        value: String,
    },

    RemoveAttribute {
        node_id: String,
        name: String,
    },

    /// Replace the text value of a leaf element
    SetText {
        node_id: String,
        text: Option<String>,
    },

    /// Insert a new subtree below `parent_id`
    InsertChild {
        parent_id: String,
        index: usize,
        node: ModelNode,
    },

    RemoveChild {
        parent_id: String,
        index: usize,
    },

    /// Relocate an element, keeping its subtree
    MoveChild {
        node_id: String,
        new_parent_id: String,
        index: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Parent not found: {0}")]
    ParentNotFound(String),

    #[error("Attribute '{name}' not found on {node_id}")]
    AttributeNotFound { node_id: String, name: String },

    #[error("Index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Node id already in use: {0}")]
    DuplicateId(String),

    #[error("Would create cycle")]
    CycleDetected,

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

impl EditCommand {
    pub fn set_attribute(node_id: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetAttribute {
            node_id: node_id.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn set_text(node_id: impl Into<String>, text: Option<&str>) -> Self {
        Self::SetText {
            node_id: node_id.into(),
            text: text.map(str::to_string),
        }
    }

    pub fn insert_child(parent_id: impl Into<String>, index: usize, node: ModelNode) -> Self {
        Self::InsertChild {
            parent_id: parent_id.into(),
            index,
            node,
        }
    }

    /// Append `node` after the last child of `parent_id`
    pub fn append_child(model: &ObjectModel, parent_id: &str, node: ModelNode) -> Result<Self, MutationError> {
        let parent = model
            .find(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.to_string()))?;
        Ok(Self::insert_child(parent_id, parent.children.len(), node))
    }

    /// Remove the element `node_id` from wherever it sits
    pub fn remove_node(model: &ObjectModel, node_id: &str) -> Result<Self, MutationError> {
        let parent = model.parent_of(node_id).ok_or_else(|| {
            if model.contains(node_id) {
                MutationError::InvalidStructure("The root element cannot be removed".to_string())
            } else {
                MutationError::NodeNotFound(node_id.to_string())
            }
        })?;
        let index = parent
            .child_index(node_id)
            .ok_or_else(|| MutationError::NodeNotFound(node_id.to_string()))?;
        Ok(Self::RemoveChild {
            parent_id: parent.id.clone(),
            index,
        })
    }

    /// Short name for logs and undo labels
    pub fn name(&self) -> &'static str {
        match self {
            EditCommand::SetAttribute { .. } => "set-attribute",
            EditCommand::RemoveAttribute { .. } => "remove-attribute",
            EditCommand::SetText { .. } => "set-text",
            EditCommand::InsertChild { .. } => "insert-child",
            EditCommand::RemoveChild { .. } => "remove-child",
            EditCommand::MoveChild { .. } => "move-child",
        }
    }

    /// Validate without applying
    pub fn validate(&self, model: &ObjectModel) -> Result<(), MutationError> {
        match self {
            EditCommand::SetAttribute { node_id, name, .. } => {
                find(model, node_id)?;
                check_name(name)
            }

            EditCommand::RemoveAttribute { node_id, name } => {
                let node = find(model, node_id)?;
                if node.attribute_entry(name).is_none() {
                    return Err(MutationError::AttributeNotFound {
                        node_id: node_id.clone(),
                        name: name.clone(),
                    });
                }
                Ok(())
            }

            EditCommand::SetText { node_id, .. } => {
                let node = find(model, node_id)?;
                if !node.children.is_empty() {
                    return Err(MutationError::InvalidStructure(
                        "Element with child elements cannot hold text".to_string(),
                    ));
                }
                Ok(())
            }

            EditCommand::InsertChild { parent_id, index, node } => {
                let parent = find_parent(model, parent_id)?;
                if parent.text.is_some() {
                    return Err(MutationError::InvalidStructure(
                        "Element holding text cannot take child elements".to_string(),
                    ));
                }
                if *index > parent.children.len() {
                    return Err(MutationError::IndexOutOfBounds {
                        index: *index,
                        len: parent.children.len(),
                    });
                }
                check_subtree(model, node, &mut HashSet::new())
            }

            EditCommand::RemoveChild { parent_id, index } => {
                let parent = find_parent(model, parent_id)?;
                if *index >= parent.children.len() {
                    return Err(MutationError::IndexOutOfBounds {
                        index: *index,
                        len: parent.children.len(),
                    });
                }
                Ok(())
            }

            EditCommand::MoveChild { node_id, new_parent_id, index } => {
                find(model, node_id)?;
                let old_parent = model.parent_id(node_id).ok_or_else(|| {
                    MutationError::InvalidStructure("The root element cannot be moved".to_string())
                })?;
                let parent = find_parent(model, new_parent_id)?;

                if model.is_ancestor_or_self(node_id, new_parent_id) {
                    return Err(MutationError::CycleDetected);
                }
                if parent.text.is_some() {
                    return Err(MutationError::InvalidStructure(
                        "Element holding text cannot take child elements".to_string(),
                    ));
                }

                let len = if old_parent == new_parent_id {
                    parent.children.len() - 1
                } else {
                    parent.children.len()
                };
                if *index > len {
                    return Err(MutationError::IndexOutOfBounds { index: *index, len });
                }
                Ok(())
            }
        }
    }

    /// Apply to the model, returning the inverse command and the change it made
    pub fn apply(&self, model: &mut ObjectModel) -> Result<(EditCommand, ChangeEvent), MutationError> {
        self.validate(model)?;

        let applied = match self {
            EditCommand::SetAttribute { node_id, name, value } => {
                let node = find_mut(model, node_id)?;
                let old = node.set_attribute(name.clone(), value.clone());
                let inverse = match &old {
                    Some(old) => EditCommand::set_attribute(node_id.clone(), name.clone(), old.clone()),
                    None => EditCommand::RemoveAttribute {
                        node_id: node_id.clone(),
                        name: name.clone(),
                    },
                };
                node.span = None;
                let event = ChangeEvent::AttributeChanged {
                    node: node_id.clone(),
                    name: name.clone(),
                    old,
                    new: Some(value.clone()),
                };
                (inverse, event)
            }

            EditCommand::RemoveAttribute { node_id, name } => {
                let node = find_mut(model, node_id)?;
                let old = node.remove_attribute(name).ok_or_else(|| MutationError::AttributeNotFound {
                    node_id: node_id.clone(),
                    name: name.clone(),
                })?;
                node.span = None;
                let inverse = EditCommand::set_attribute(node_id.clone(), name.clone(), old.clone());
                let event = ChangeEvent::AttributeChanged {
                    node: node_id.clone(),
                    name: name.clone(),
                    old: Some(old),
                    new: None,
                };
                (inverse, event)
            }

            EditCommand::SetText { node_id, text } => {
                let node = find_mut(model, node_id)?;
                let new = normalize_text(text.as_deref());
                let old = std::mem::replace(&mut node.text, new.clone());
                node.span = None;
                let inverse = EditCommand::SetText {
                    node_id: node_id.clone(),
                    text: old.clone(),
                };
                let event = ChangeEvent::TextChanged {
                    node: node_id.clone(),
                    old,
                    new,
                };
                (inverse, event)
            }

            EditCommand::InsertChild { parent_id, index, node } => {
                let inserted = node.detached();
                let inserted_id = inserted.id.clone();
                let parent = find_mut(model, parent_id)?;
                parent.children.insert(*index, inserted);
                parent.span = None;
                model.reindex();

                let inverse = EditCommand::RemoveChild {
                    parent_id: parent_id.clone(),
                    index: *index,
                };
                let event = ChangeEvent::Added {
                    parent: parent_id.clone(),
                    index: *index,
                    node: inserted_id,
                };
                (inverse, event)
            }

            EditCommand::RemoveChild { parent_id, index } => {
                let parent = find_mut(model, parent_id)?;
                let removed = parent.children.remove(*index);
                parent.span = None;
                model.reindex();

                let event = ChangeEvent::Removed {
                    parent: parent_id.clone(),
                    index: *index,
                    node: removed.id.clone(),
                };
                let inverse = EditCommand::InsertChild {
                    parent_id: parent_id.clone(),
                    index: *index,
                    node: removed.detached(),
                };
                (inverse, event)
            }

            EditCommand::MoveChild { node_id, new_parent_id, index } => {
                let old_parent = model
                    .parent_id(node_id)
                    .map(str::to_string)
                    .ok_or_else(|| MutationError::NodeNotFound(node_id.clone()))?;
                let old_index = find(model, &old_parent)?
                    .child_index(node_id)
                    .ok_or_else(|| MutationError::NodeNotFound(node_id.clone()))?;

                let parent = find_mut(model, &old_parent)?;
                let moved = parent.children.remove(old_index);
                parent.span = None;

                let target = find_mut(model, new_parent_id)?;
                target.children.insert(*index, moved);
                target.span = None;
                model.reindex();

                let inverse = EditCommand::MoveChild {
                    node_id: node_id.clone(),
                    new_parent_id: old_parent.clone(),
                    index: old_index,
                };
                let event = ChangeEvent::Moved {
                    node: node_id.clone(),
                    old_parent,
                    old_index,
                    new_parent: new_parent_id.clone(),
                    new_index: *index,
                };
                (inverse, event)
            }
        };

        Ok(applied)
    }
}

/// Ordered group of commands executed and undone as one transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompoundCommand {
    pub label: Option<String>,
    pub commands: Vec<EditCommand>,
}

impl CompoundCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: EditCommand) {
        self.commands.push(command);
    }

    pub fn with(mut self, command: EditCommand) -> Self {
        self.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Label for undo/redo menus
    pub fn describe(&self) -> String {
        match (&self.label, self.commands.as_slice()) {
            (Some(label), _) => label.clone(),
            (None, [single]) => single.name().to_string(),
            (None, commands) => format!("{} edits", commands.len()),
        }
    }
}

impl From<EditCommand> for CompoundCommand {
    fn from(command: EditCommand) -> Self {
        Self {
            label: None,
            commands: vec![command],
        }
    }
}

/// Trimmed text, `None` when nothing is left
pub fn normalize_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn find<'m>(model: &'m ObjectModel, id: &str) -> Result<&'m ModelNode, MutationError> {
    model
        .find(id)
        .ok_or_else(|| MutationError::NodeNotFound(id.to_string()))
}

fn find_parent<'m>(model: &'m ObjectModel, id: &str) -> Result<&'m ModelNode, MutationError> {
    model
        .find(id)
        .ok_or_else(|| MutationError::ParentNotFound(id.to_string()))
}

fn find_mut<'m>(model: &'m mut ObjectModel, id: &str) -> Result<&'m mut ModelNode, MutationError> {
    model
        .find_mut(id)
        .ok_or_else(|| MutationError::NodeNotFound(id.to_string()))
}

fn check_name(name: &str) -> Result<(), MutationError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'));

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(MutationError::InvalidName(name.to_string()))
    }
}

fn check_subtree<'n>(
    model: &ObjectModel,
    node: &'n ModelNode,
    seen: &mut HashSet<&'n str>,
) -> Result<(), MutationError> {
    check_name(&node.name)?;
    for attr in &node.attributes {
        check_name(&attr.name)?;
    }
    if model.contains(&node.id) || !seen.insert(node.id.as_str()) {
        return Err(MutationError::DuplicateId(node.id.clone()));
    }
    if !node.children.is_empty() && node.text.is_some() {
        return Err(MutationError::InvalidStructure(
            "Element with child elements cannot hold text".to_string(),
        ));
    }
    if node.text.is_some() && normalize_text(node.text.as_deref()) != node.text {
        return Err(MutationError::InvalidStructure(
            "Text of inserted elements must be trimmed and non-empty".to_string(),
        ));
    }
    node.children
        .iter()
        .try_for_each(|child| check_subtree(model, child, seen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_parser::parse;

    fn model() -> ObjectModel {
        parse(r#"<a><b x="1"/><c>text</c><d><e/></d></a>"#).unwrap()
    }

    fn id_of(model: &ObjectModel, path: &[&str]) -> String {
        model.find_path(path).unwrap().id.clone()
    }

    #[test]
    fn test_command_serialization() {
        let command = EditCommand::set_attribute("n-1", "x", "2");
        let json = serde_json::to_string(&command).unwrap();
        let back: EditCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(command, back);
    }

    #[test]
    fn test_set_attribute_inverse_restores() {
        let mut m = model();
        let before = m.clone();
        let b = id_of(&m, &["b"]);

        let (inverse, event) = EditCommand::set_attribute(&b, "x", "2").apply(&mut m).unwrap();
        assert_eq!(m.find(&b).unwrap().attribute("x"), Some("2"));
        assert!(matches!(event, ChangeEvent::AttributeChanged { ref old, .. } if old.as_deref() == Some("1")));

        inverse.apply(&mut m).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_new_attribute_inverse_is_removal() {
        let mut m = model();
        let before = m.clone();
        let b = id_of(&m, &["b"]);

        let (inverse, _) = EditCommand::set_attribute(&b, "y", "new").apply(&mut m).unwrap();
        assert!(matches!(inverse, EditCommand::RemoveAttribute { .. }));
        inverse.apply(&mut m).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_remove_then_reinsert_keeps_ids() {
        let mut m = model();
        let before = m.clone();
        let d = id_of(&m, &["d"]);
        let e = id_of(&m, &["d", "e"]);

        let remove = EditCommand::remove_node(&m, &d).unwrap();
        let (inverse, event) = remove.apply(&mut m).unwrap();
        assert!(matches!(event, ChangeEvent::Removed { ref node, index: 2, .. } if *node == d));
        assert!(m.find(&e).is_none());

        inverse.apply(&mut m).unwrap();
        assert_eq!(m, before);
        assert_eq!(m.parent_id(&e), Some(d.as_str()));
    }

    #[test]
    fn test_move_and_inverse() {
        let mut m = model();
        let before = m.clone();
        let b = id_of(&m, &["b"]);
        let d = id_of(&m, &["d"]);

        let command = EditCommand::MoveChild {
            node_id: b.clone(),
            new_parent_id: d.clone(),
            index: 1,
        };
        let (inverse, _) = command.apply(&mut m).unwrap();
        assert_eq!(m.parent_id(&b), Some(d.as_str()));
        assert_eq!(m.find(&d).unwrap().children[1].id, b);

        inverse.apply(&mut m).unwrap();
        assert_eq!(m, before);
        assert_eq!(m.root.children[0].id, b);
    }

    #[test]
    fn test_move_into_own_subtree_is_a_cycle() {
        let m = model();
        let d = id_of(&m, &["d"]);
        let e = id_of(&m, &["d", "e"]);

        let command = EditCommand::MoveChild {
            node_id: d,
            new_parent_id: e,
            index: 0,
        };
        assert_eq!(command.validate(&m), Err(MutationError::CycleDetected));
    }

    #[test]
    fn test_text_rules() {
        let mut m = model();
        let c = id_of(&m, &["c"]);
        let d = id_of(&m, &["d"]);

        assert!(EditCommand::set_text(&d, Some("x")).validate(&m).is_err());
        let insert = EditCommand::insert_child(&c, 0, ModelNode::new("fresh-1", "z"));
        assert!(matches!(insert.validate(&m), Err(MutationError::InvalidStructure(_))));

        EditCommand::set_text(&c, Some("  padded  ")).apply(&mut m).unwrap();
        assert_eq!(m.find(&c).unwrap().text.as_deref(), Some("padded"));
        EditCommand::set_text(&c, Some("   ")).apply(&mut m).unwrap();
        assert_eq!(m.find(&c).unwrap().text, None);
    }

    #[test]
    fn test_insert_validation() {
        let m = model();
        let root = m.root.id.clone();
        let b = id_of(&m, &["b"]);

        let out_of_bounds = EditCommand::insert_child(&root, 9, ModelNode::new("fresh-1", "z"));
        assert!(matches!(out_of_bounds.validate(&m), Err(MutationError::IndexOutOfBounds { .. })));

        let duplicate = EditCommand::insert_child(&root, 0, ModelNode::new(b, "z"));
        assert!(matches!(duplicate.validate(&m), Err(MutationError::DuplicateId(_))));

        let repeated = ModelNode::new("fresh-3", "z")
            .with_child(ModelNode::new("fresh-4", "y"))
            .with_child(ModelNode::new("fresh-4", "y"));
        let repeated = EditCommand::insert_child(&root, 0, repeated);
        assert!(matches!(repeated.validate(&m), Err(MutationError::DuplicateId(ref id)) if id == "fresh-4"));

        let bad_name = EditCommand::insert_child(&root, 0, ModelNode::new("fresh-2", "1bad"));
        assert!(matches!(bad_name.validate(&m), Err(MutationError::InvalidName(_))));
    }

    #[test]
    fn test_compound_describe() {
        let single: CompoundCommand = EditCommand::set_text("n", None).into();
        assert_eq!(single.describe(), "set-text");
        let many = CompoundCommand::new()
            .with(EditCommand::set_text("n", None))
            .with(EditCommand::set_text("m", None));
        assert_eq!(many.describe(), "2 edits");
        assert_eq!(CompoundCommand::labeled("Change scope").describe(), "Change scope");
    }
}
