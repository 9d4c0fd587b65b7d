use quire_parser::ast::*;

/// Visitor pattern for traversing the object model immutably
///
/// This trait provides default implementations that walk the entire tree.
/// Override specific visit_* methods to perform custom actions on nodes.
/// `depth` is 0 for the root element.
pub trait Visitor: Sized {
    fn visit_model(&mut self, model: &ObjectModel) {
        walk_model(self, model);
    }

    fn visit_node(&mut self, node: &ModelNode, depth: usize) {
        walk_node(self, node, depth);
    }

    fn visit_attribute(&mut self, _node: &ModelNode, _attr: &Attribute, _depth: usize) {
        // Leaf, nothing to walk
    }
}

/// Mutable visitor pattern for transforming model nodes
pub trait VisitorMut: Sized {
    fn visit_model_mut(&mut self, model: &mut ObjectModel) {
        walk_model_mut(self, model);
    }

    fn visit_node_mut(&mut self, node: &mut ModelNode) {
        walk_node_mut(self, node);
    }
}

pub fn walk_model<V: Visitor>(visitor: &mut V, model: &ObjectModel) {
    visitor.visit_node(&model.root, 0);
}

pub fn walk_node<V: Visitor>(visitor: &mut V, node: &ModelNode, depth: usize) {
    for attr in &node.attributes {
        visitor.visit_attribute(node, attr, depth);
    }
    for child in &node.children {
        visitor.visit_node(child, depth + 1);
    }
}

pub fn walk_model_mut<V: VisitorMut>(visitor: &mut V, model: &mut ObjectModel) {
    visitor.visit_node_mut(&mut model.root);
    model.reindex();
}

pub fn walk_node_mut<V: VisitorMut>(visitor: &mut V, node: &mut ModelNode) {
    for child in &mut node.children {
        visitor.visit_node_mut(child);
    }
}

/// Drops every text range in a subtree
pub struct SpanStripper;

impl VisitorMut for SpanStripper {
    fn visit_node_mut(&mut self, node: &mut ModelNode) {
        node.span = None;
        for attr in &mut node.attributes {
            attr.span = None;
        }
        walk_node_mut(self, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_parser::parse;

    struct DepthRecorder(Vec<(String, usize)>);

    impl Visitor for DepthRecorder {
        fn visit_node(&mut self, node: &ModelNode, depth: usize) {
            self.0.push((node.name.clone(), depth));
            walk_node(self, node, depth);
        }
    }

    #[test]
    fn test_walk_order_and_depth() {
        let model = parse("<a><b><c/></b><d/></a>").unwrap();
        let mut recorder = DepthRecorder(Vec::new());
        recorder.visit_model(&model);

        assert_eq!(
            recorder.0,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("d".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_span_stripper() {
        let mut model = parse(r#"<a k="v"><b/></a>"#).unwrap();
        SpanStripper.visit_model_mut(&mut model);
        assert!(model.root.span.is_none());
        assert!(model.root.attributes[0].span.is_none());
        assert!(model.root.children[0].span.is_none());
    }
}
