use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Byte offsets of an element inside the text it was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpan {
    /// Offset of the opening `<`
    pub start: usize,
    /// Offset just past the closing `>`
    pub end: usize,
    /// Offset just past the tag name
    pub name_end: usize,
    /// Offset just past the last attribute (or the name when there are none)
    pub attrs_end: usize,
    /// Offset just past the `>` (or `/>`) of the start tag
    pub open_end: usize,
    /// Offset of the `</` of the end tag, `None` for self-closing elements
    pub close_start: Option<usize>,
}

impl NodeSpan {
    pub fn is_self_closing(&self) -> bool {
        self.close_start.is_none()
    }

    /// Range between the start tag and the end tag
    pub fn inner(&self) -> Option<std::ops::Range<usize>> {
        self.close_start.map(|close| self.open_end..close)
    }
}

/// Byte offsets of an attribute inside the text it was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSpan {
    pub start: usize,
    pub end: usize,
    /// Offset of the first byte after the opening quote
    pub value_start: usize,
    /// Offset of the closing quote
    pub value_end: usize,
    pub quote: char,
}

/// Text range handed out for reveal-in-source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub offset: usize,
    pub length: usize,
}

impl TextRange {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Named attribute value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    #[serde(skip)]
    pub span: Option<AttrSpan>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            span: None,
        }
    }
}

/// Element of the object model
///
/// Equality is structural: ids and text ranges are ignored, attributes are
/// compared as a map, children in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: String,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<ModelNode>,
    /// Trimmed text of an element without element children
    pub text: Option<String>,
    #[serde(skip)]
    pub span: Option<NodeSpan>,
}

impl ModelNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
            span: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: ModelNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn attribute_entry(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Set or replace an attribute, returning the previous value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => {
                attr.span = None;
                Some(std::mem::replace(&mut attr.value, value))
            }
            None => {
                self.attributes.push(Attribute::new(name, value));
                None
            }
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(pos).value)
    }

    /// First child element with the given name
    pub fn child_named(&self, name: &str) -> Option<&ModelNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_index(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|c| c.id == id)
    }

    /// An element without attributes, children or text
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty() && self.text.is_none()
    }

    pub fn find(&self, id: &str) -> Option<&ModelNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ModelNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Copy of this subtree with every text range dropped
    pub fn detached(&self) -> ModelNode {
        ModelNode {
            id: self.id.clone(),
            name: self.name.clone(),
            attributes: self
                .attributes
                .iter()
                .map(|a| Attribute::new(a.name.clone(), a.value.clone()))
                .collect(),
            children: self.children.iter().map(|c| c.detached()).collect(),
            text: self.text.clone(),
            span: None,
        }
    }

    /// Number of elements in this subtree
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(|c| c.len()).sum::<usize>()
    }

    fn attribute_map(&self) -> HashMap<&str, &str> {
        self.attributes
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect()
    }
}

impl PartialEq for ModelNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.text == other.text
            && self.attributes.len() == other.attributes.len()
            && self.attribute_map() == other.attribute_map()
            && self.children == other.children
    }
}

/// Root of the object model for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectModel {
    pub root: ModelNode,
    /// child id -> container id
    #[serde(skip)]
    parents: HashMap<String, String>,
}

impl ObjectModel {
    pub fn new(root: ModelNode) -> Self {
        let mut model = Self {
            root,
            parents: HashMap::new(),
        };
        model.reindex();
        model
    }

    /// Rebuild the container lookup after a structural change
    pub fn reindex(&mut self) {
        fn walk(node: &ModelNode, parents: &mut HashMap<String, String>) {
            for child in &node.children {
                parents.insert(child.id.clone(), node.id.clone());
                walk(child, parents);
            }
        }

        self.parents.clear();
        walk(&self.root, &mut self.parents);
    }

    pub fn find(&self, id: &str) -> Option<&ModelNode> {
        self.root.find(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut ModelNode> {
        self.root.find_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.root.id == id || self.parents.contains_key(id)
    }

    /// Id of the element containing `id`
    pub fn parent_id(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(|s| s.as_str())
    }

    pub fn parent_of(&self, id: &str) -> Option<&ModelNode> {
        self.parent_id(id).and_then(|pid| self.find(pid))
    }

    /// Ids from the root down to and including `id`
    pub fn ancestry(&self, id: &str) -> Vec<String> {
        let mut chain = vec![id.to_string()];
        let mut current = id;
        while let Some(parent) = self.parents.get(current) {
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Whether `ancestor` is `id` or one of its containers
    pub fn is_ancestor_or_self(&self, ancestor: &str, id: &str) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent_id(node);
        }
        false
    }

    /// Resolve an element path such as `["build", "plugins"]` from the root
    pub fn find_path(&self, path: &[&str]) -> Option<&ModelNode> {
        let mut node = &self.root;
        for segment in path {
            node = node.child_named(segment)?;
        }
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }
}

impl PartialEq for ObjectModel {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}
