//! Convenience construction of commands against a model.
//!
//! Path setters create whatever part of an element path is missing as a
//! single nested insertion, so filling in `build/plugins/plugin/version` on a
//! descriptor without a `build` section is one undoable step. Clearing a
//! value prunes the containers that become empty.

use quire_common::visitor::{walk_node_mut, SpanStripper, VisitorMut};
use quire_parser::ast::{ModelNode, ObjectModel};
use quire_parser::IDGenerator;

use crate::mutations::{normalize_text, CompoundCommand, EditCommand, MutationError};

/// Gives every node of a subtree a fresh id
struct IdAssigner<'a> {
    ids: &'a mut IDGenerator,
}

impl VisitorMut for IdAssigner<'_> {
    fn visit_node_mut(&mut self, node: &mut ModelNode) {
        node.id = self.ids.next_id();
        walk_node_mut(self, node);
    }
}

pub struct CommandBuilder<'a> {
    model: &'a ObjectModel,
    ids: &'a mut IDGenerator,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(model: &'a ObjectModel, ids: &'a mut IDGenerator) -> Self {
        Self { model, ids }
    }

    pub fn model(&self) -> &ObjectModel {
        self.model
    }

    /// Empty element with a fresh id
    pub fn element(&mut self, name: impl Into<String>) -> ModelNode {
        ModelNode::new(self.ids.next_id(), name)
    }

    /// Copy of `template` ready for insertion: fresh ids, no text ranges
    pub fn instantiate(&mut self, template: &ModelNode) -> ModelNode {
        let mut node = template.clone();
        SpanStripper.visit_node_mut(&mut node);
        IdAssigner { ids: &mut *self.ids }.visit_node_mut(&mut node);
        node
    }

    pub fn insert_child(&mut self, parent_id: &str, index: usize, template: &ModelNode) -> EditCommand {
        EditCommand::insert_child(parent_id, index, self.instantiate(template))
    }

    pub fn append_child(&mut self, parent_id: &str, template: &ModelNode) -> Result<EditCommand, MutationError> {
        let node = self.instantiate(template);
        EditCommand::append_child(self.model, parent_id, node)
    }

    /// Set the text of the element at `path` below `base_id`, creating it if needed
    pub fn set_text_at(&mut self, base_id: &str, path: &[&str], value: &str) -> Result<CompoundCommand, MutationError> {
        let (target, missing) = self.resolve(base_id, path)?;
        let mut compound = CompoundCommand::labeled(format!("Set {}", path.join("/")));
        let text = normalize_text(Some(value));
        // Nothing to clear on an absent element
        if text.is_none() && !missing.is_empty() {
            return Ok(compound);
        }

        match self.chain(missing, |leaf| leaf.text = text) {
            Some(chain) => compound.push(EditCommand::insert_child(&target.id, target.children.len(), chain)),
            None => compound.push(EditCommand::set_text(&target.id, Some(value))),
        }
        Ok(compound)
    }

    /// Set an attribute of the element at `path` below `base_id`, creating it if needed
    pub fn set_attribute_at(
        &mut self,
        base_id: &str,
        path: &[&str],
        name: &str,
        value: &str,
    ) -> Result<CompoundCommand, MutationError> {
        let (target, missing) = self.resolve(base_id, path)?;
        let mut compound = CompoundCommand::labeled(format!("Set {}@{}", path.join("/"), name));

        let chain = self.chain(missing, |leaf| {
            leaf.set_attribute(name, value);
        });
        match chain {
            Some(chain) => compound.push(EditCommand::insert_child(&target.id, target.children.len(), chain)),
            None => compound.push(EditCommand::set_attribute(&target.id, name, value)),
        }
        Ok(compound)
    }

    /// Clear the text at `path`, removing elements left empty up to (not including) `base_id`
    pub fn clear_text_at(&self, base_id: &str, path: &[&str]) -> Result<CompoundCommand, MutationError> {
        let (target, missing) = self.resolve(base_id, path)?;
        let mut compound = CompoundCommand::labeled(format!("Clear {}", path.join("/")));
        if !missing.is_empty() {
            return Ok(compound);
        }

        if target.id == base_id || !target.attributes.is_empty() || !target.children.is_empty() {
            if target.text.is_some() {
                compound.push(EditCommand::set_text(&target.id, None));
            }
            return Ok(compound);
        }

        let mut removable = target;
        while let Some(parent) = self.model.parent_of(&removable.id) {
            let only_child = parent.children.len() == 1 && parent.attributes.is_empty();
            if parent.id == base_id || !only_child {
                break;
            }
            removable = parent;
        }

        compound.push(EditCommand::remove_node(self.model, &removable.id)?);
        Ok(compound)
    }

    /// Deepest existing element along `path` and the segments below it
    fn resolve<'p, 's>(&self, base_id: &str, path: &'p [&'s str]) -> Result<(&'a ModelNode, &'p [&'s str]), MutationError> {
        let mut node = self
            .model
            .find(base_id)
            .ok_or_else(|| MutationError::NodeNotFound(base_id.to_string()))?;

        for (depth, segment) in path.iter().enumerate() {
            match node.child_named(segment) {
                Some(child) => node = child,
                None => return Ok((node, &path[depth..])),
            }
        }
        Ok((node, &[]))
    }

    /// Nested fresh elements for `segments`, the innermost shaped by `leaf`
    fn chain(&mut self, segments: &[&str], leaf: impl FnOnce(&mut ModelNode)) -> Option<ModelNode> {
        let (innermost, outer) = segments.split_last()?;
        let mut current = self.element(*innermost);
        leaf(&mut current);

        for segment in outer.iter().rev() {
            let mut parent = self.element(*segment);
            parent.children.push(current);
            current = parent;
        }
        Some(current)
    }
}
