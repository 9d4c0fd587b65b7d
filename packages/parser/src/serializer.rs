use crate::ast::*;
use crate::escape::{escape_attr, escape_text};

/// Writes model nodes that have no source text yet
///
/// Without indentation the output is compact. With indentation every child
/// element starts on its own line, `base` deep plus one `unit` per level.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    indent: Option<(String, String)>,
}

impl Serializer {
    pub fn new() -> Self {
        Self { indent: None }
    }

    pub fn with_indent(base: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            indent: Some((base.into(), unit.into())),
        }
    }

    pub fn serialize_node(&self, node: &ModelNode) -> String {
        let mut output = String::new();
        self.write_node(node, 0, &mut output);
        output
    }

    fn write_node(&self, node: &ModelNode, depth: usize, output: &mut String) {
        output.push('<');
        output.push_str(&node.name);
        for attr in &node.attributes {
            output.push(' ');
            output.push_str(&attr.name);
            output.push_str("=\"");
            output.push_str(&escape_attr(&attr.value, '"'));
            output.push('"');
        }

        if node.children.is_empty() {
            match &node.text {
                Some(text) => {
                    output.push('>');
                    output.push_str(&escape_text(text));
                    self.write_end_tag(&node.name, output);
                }
                None => output.push_str("/>"),
            }
            return;
        }

        output.push('>');
        for child in &node.children {
            self.write_break(depth + 1, output);
            self.write_node(child, depth + 1, output);
        }
        self.write_break(depth, output);
        self.write_end_tag(&node.name, output);
    }

    fn write_break(&self, depth: usize, output: &mut String) {
        if let Some((base, unit)) = &self.indent {
            output.push('\n');
            output.push_str(base);
            for _ in 0..depth {
                output.push_str(unit);
            }
        }
    }

    fn write_end_tag(&self, name: &str, output: &mut String) {
        output.push_str("</");
        output.push_str(name);
        output.push('>');
    }
}

/// Serialize a node (and its subtree) without any source text
pub fn serialize(node: &ModelNode) -> String {
    Serializer::new().serialize_node(node)
}

/// Lossless serializer that preserves original formatting using spans
///
/// Strategy:
/// - A node is clean when it and its whole subtree still carry text ranges
/// - Clean nodes are copied from the source verbatim
/// - Dirty nodes are re-serialized, their clean children still copied
/// - Text before and after the root element is kept as is
pub struct LosslessSerializer<'a> {
    source: &'a str,
}

impl<'a> LosslessSerializer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn serialize(&self, model: &ObjectModel) -> String {
        let mut output = String::with_capacity(self.source.len());

        match model.root.span {
            Some(span) if span.end <= self.source.len() => {
                output.push_str(&self.source[..span.start]);
                self.write_node(&model.root, &mut output);
                output.push_str(&self.source[span.end..]);
            }
            _ => self.write_node(&model.root, &mut output),
        }

        output
    }

    pub fn serialize_node(&self, node: &ModelNode) -> String {
        let mut output = String::new();
        self.write_node(node, &mut output);
        output
    }

    fn is_clean(&self, node: &ModelNode) -> bool {
        match node.span {
            Some(span) if span.end <= self.source.len() => {
                node.attributes.iter().all(|a| a.span.is_some())
                    && node.children.iter().all(|c| self.is_clean(c))
            }
            _ => false,
        }
    }

    fn write_node(&self, node: &ModelNode, output: &mut String) {
        if let (true, Some(span)) = (self.is_clean(node), node.span) {
            output.push_str(&self.source[span.start..span.end]);
            return;
        }

        output.push('<');
        output.push_str(&node.name);
        for attr in &node.attributes {
            output.push(' ');
            output.push_str(&attr.name);
            output.push_str("=\"");
            output.push_str(&escape_attr(&attr.value, '"'));
            output.push('"');
        }

        if node.children.is_empty() && node.text.is_none() {
            output.push_str("/>");
            return;
        }

        output.push('>');
        if node.children.is_empty() {
            if let Some(text) = &node.text {
                output.push_str(&escape_text(text));
            }
        }
        for child in &node.children {
            self.write_node(child, output);
        }
        output.push_str("</");
        output.push_str(&node.name);
        output.push('>');
    }
}
