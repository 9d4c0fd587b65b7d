//! Resolved dependency trees
//!
//! A [`DependencyTree`] is produced by an external resolver and is never
//! edited by the engine. Views read it through two projections of the same
//! tree: [`DependencyTree::tree_rows`] for a hierarchy and
//! [`DependencyTree::graph_edges`] for a flattened graph.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identity of one resolved artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl Artifact {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// `group:name`, shared by every version of the artifact
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionState {
    Included,
    OmittedForConflict,
    OmittedForCycle,
    OmittedForDuplicate,
}

impl ResolutionState {
    pub fn is_omitted(self) -> bool {
        self != ResolutionState::Included
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionState::Included => "included",
            ResolutionState::OmittedForConflict => "omitted for conflict",
            ResolutionState::OmittedForCycle => "omitted for cycle",
            ResolutionState::OmittedForDuplicate => "omitted for duplicate",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub artifact: Artifact,
    pub scope: String,
    pub state: ResolutionState,
    /// Artifact that won over this one, for omitted nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Artifact>,
    #[serde(default)]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn included(artifact: Artifact, scope: impl Into<String>) -> Self {
        Self {
            artifact,
            scope: scope.into(),
            state: ResolutionState::Included,
            superseded_by: None,
            children: Vec::new(),
        }
    }

    pub fn omitted(artifact: Artifact, scope: impl Into<String>, state: ResolutionState, winner: Artifact) -> Self {
        Self {
            artifact,
            scope: scope.into(),
            state,
            superseded_by: Some(winner),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: DependencyNode) -> Self {
        self.children.push(child);
        self
    }

    /// Where graph edges pointing at this node end up
    fn edge_target(&self) -> &Artifact {
        match (&self.state, &self.superseded_by) {
            (ResolutionState::Included, _) | (_, None) => &self.artifact,
            (_, Some(winner)) => winner,
        }
    }
}

/// One line of the hierarchical projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub artifact: Artifact,
    pub scope: String,
    pub state: ResolutionState,
    pub superseded_by: Option<Artifact>,
}

impl fmt::Display for TreeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} [{}]", "  ".repeat(self.depth), self.artifact, self.scope)?;
        match &self.superseded_by {
            Some(winner) if self.state.is_omitted() => write!(f, " ({} with {})", self.state, winner),
            _ if self.state.is_omitted() => write!(f, " ({})", self.state),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: Artifact,
    pub to: Artifact,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTree {
    pub root: DependencyNode,
}

impl DependencyTree {
    pub fn new(root: DependencyNode) -> Self {
        Self { root }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        fn count(node: &DependencyNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    /// Artifacts that made it into the resolution, in depth-first order
    pub fn included(&self) -> Vec<&Artifact> {
        let mut found = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.state == ResolutionState::Included {
                found.push(&node.artifact);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// Depth-first rows; omitted nodes name the artifact that replaced them
    pub fn tree_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::with_capacity(self.len());
        collect_rows(&self.root, 0, &mut rows);
        rows
    }

    /// Deduplicated parent → child edges
    ///
    /// An edge to an omitted node is redirected to the artifact that
    /// superseded it, so every edge ends at an included artifact.
    pub fn graph_edges(&self) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        collect_edges(&self.root, &mut edges, &mut seen);
        edges
    }
}

fn collect_rows(node: &DependencyNode, depth: usize, rows: &mut Vec<TreeRow>) {
    rows.push(TreeRow {
        depth,
        artifact: node.artifact.clone(),
        scope: node.scope.clone(),
        state: node.state,
        superseded_by: node.superseded_by.clone(),
    });
    for child in &node.children {
        collect_rows(child, depth + 1, rows);
    }
}

fn collect_edges(node: &DependencyNode, edges: &mut Vec<GraphEdge>, seen: &mut HashSet<(Artifact, Artifact)>) {
    for child in &node.children {
        let target = child.edge_target();
        // A cycle redirected onto its own parent is not an edge
        if *target != node.artifact && seen.insert((node.artifact.clone(), target.clone())) {
            edges.push(GraphEdge {
                from: node.artifact.clone(),
                to: target.clone(),
                scope: child.scope.clone(),
            });
        }
        if child.state == ResolutionState::Included {
            collect_edges(child, edges, seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn art(name: &str, version: &str) -> Artifact {
        Artifact::new("org.acme", name, version)
    }

    /// app → lib-a → util 2.0
    ///     → lib-b → util 1.0 (conflict, loses to 2.0)
    ///             → lib-a (duplicate)
    fn sample() -> DependencyTree {
        let lib_a = DependencyNode::included(art("lib-a", "1.0"), "compile")
            .with_child(DependencyNode::included(art("util", "2.0"), "compile"));
        let lib_b = DependencyNode::included(art("lib-b", "1.0"), "test")
            .with_child(DependencyNode::omitted(
                art("util", "1.0"),
                "test",
                ResolutionState::OmittedForConflict,
                art("util", "2.0"),
            ))
            .with_child(DependencyNode::omitted(
                art("lib-a", "1.0"),
                "test",
                ResolutionState::OmittedForDuplicate,
                art("lib-a", "1.0"),
            ));
        DependencyTree::new(
            DependencyNode::included(art("app", "1.0"), "compile")
                .with_child(lib_a)
                .with_child(lib_b),
        )
    }

    #[test]
    fn test_tree_rows_keep_omitted_nodes() {
        let rows = sample().tree_rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].depth, 0);
        assert_eq!(rows[4].state, ResolutionState::OmittedForConflict);
        assert_eq!(
            rows[4].to_string(),
            "    org.acme:util:1.0 [test] (omitted for conflict with org.acme:util:2.0)"
        );
        assert_eq!(rows[1].to_string(), "  org.acme:lib-a:1.0 [compile]");
    }

    #[test]
    fn test_graph_edges_redirect_to_winner() {
        let edges = sample().graph_edges();
        let pairs: Vec<(String, String)> = edges
            .iter()
            .map(|e| (e.from.name.clone(), format!("{}@{}", e.to.name, e.to.version)))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("app".to_string(), "lib-a@1.0".to_string()),
                ("lib-a".to_string(), "util@2.0".to_string()),
                ("app".to_string(), "lib-b@1.0".to_string()),
                ("lib-b".to_string(), "util@2.0".to_string()),
                ("lib-b".to_string(), "lib-a@1.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_cycle_back_to_parent_is_dropped() {
        let tree = DependencyTree::new(
            DependencyNode::included(art("a", "1"), "compile").with_child(
                DependencyNode::included(art("b", "1"), "compile").with_child(DependencyNode::omitted(
                    art("b", "1"),
                    "compile",
                    ResolutionState::OmittedForCycle,
                    art("b", "1"),
                )),
            ),
        );
        assert_eq!(tree.graph_edges().len(), 1);
        assert_eq!(tree.tree_rows().len(), 3);
    }

    #[test]
    fn test_included_and_json() {
        let tree = sample();
        let names: Vec<&str> = tree.included().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["app", "lib-a", "util", "lib-b"]);

        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"omittedForConflict\""));
        assert_eq!(DependencyTree::from_json(&json).unwrap(), tree);
    }
}
