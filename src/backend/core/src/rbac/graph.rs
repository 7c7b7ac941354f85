//! Role inheritance graph.
//!
//! Nodes are roles, an edge `a -> b` means role `a` inherits every permission
//! of role `b`. The graph is always acyclic: `RoleGraph::build` refuses input
//! containing a cycle and `RoleGraph::check_edge` lets callers reject an edge
//! before it is persisted.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{BTreeSet, HashMap};

use super::models::{RoleInheritance, RoleName};
use crate::error::{AuthzError, Result};

/// Directed acyclic graph of role inheritance edges.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    graph: DiGraph<RoleName, ()>,

    /// Map from role to graph node index for O(1) lookup
    nodes: HashMap<RoleName, NodeIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl RoleGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from inheritance edges.
    ///
    /// Fails with `CycleDetected` carrying the offending path if the edges
    /// close a cycle, including a role inheriting from itself.
    pub fn build(edges: &[RoleInheritance]) -> Result<Self> {
        let mut graph = Self::new();
        for edge in edges {
            let from = graph.ensure_node(&edge.role);
            let to = graph.ensure_node(&edge.inherits_from);
            graph.graph.update_edge(from, to, ());
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(AuthzError::cycle_detected(cycle));
        }

        Ok(graph)
    }

    fn ensure_node(&mut self, role: &RoleName) -> NodeIndex {
        if let Some(idx) = self.nodes.get(role) {
            return *idx;
        }
        let idx = self.graph.add_node(role.clone());
        self.nodes.insert(role.clone(), idx);
        idx
    }

    /// Depth-first search with a recursion stack. Roots are visited in name
    /// order so the reported path is the same for the same edge set.
    fn find_cycle(&self) -> Option<Vec<RoleName>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut stack = Vec::new();

        let mut roots: Vec<_> = self.nodes.iter().collect();
        roots.sort_by(|a, b| a.0.cmp(b.0));

        for (_, &root) in roots {
            if marks[root.index()] == Mark::Unvisited {
                if let Some(cycle) = self.visit(root, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: NodeIndex,
        marks: &mut [Mark],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<RoleName>> {
        marks[node.index()] = Mark::OnStack;
        stack.push(node);

        for next in self.graph.neighbors(node) {
            match marks[next.index()] {
                Mark::OnStack => {
                    let start = stack.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle: Vec<RoleName> =
                        stack[start..].iter().map(|n| self.graph[*n].clone()).collect();
                    cycle.push(self.graph[next].clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(next, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node.index()] = Mark::Done;
        None
    }

    /// Reject `edge` if adding it would close a cycle.
    ///
    /// The error path runs from `edge.role` through the new edge and back
    /// along the existing inheritance chain, e.g. `user -> admin -> moderator -> user`.
    pub fn check_edge(&self, edge: &RoleInheritance) -> Result<()> {
        if edge.role == edge.inherits_from {
            return Err(AuthzError::cycle_detected([&edge.role, &edge.role]));
        }

        if let Some(path) = self.path_between(&edge.inherits_from, &edge.role) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(edge.role.clone());
            cycle.extend(path);
            return Err(AuthzError::cycle_detected(cycle));
        }

        Ok(())
    }

    /// Inheritance path from `from` to `to`, both ends included.
    fn path_between(&self, from: &RoleName, to: &RoleName) -> Option<Vec<RoleName>> {
        let start = *self.nodes.get(from)?;
        let goal = *self.nodes.get(to)?;

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut pending = vec![start];
        let mut seen = vec![false; self.graph.node_count()];
        seen[start.index()] = true;

        while let Some(node) = pending.pop() {
            if node == goal {
                let mut path = vec![self.graph[goal].clone()];
                let mut cursor = goal;
                while let Some(prev) = parent.get(&cursor) {
                    path.push(self.graph[*prev].clone());
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.graph.neighbors(node) {
                if !seen[next.index()] {
                    seen[next.index()] = true;
                    parent.insert(next, node);
                    pending.push(next);
                }
            }
        }
        None
    }

    /// `start` plus every role reachable from it through inheritance edges.
    ///
    /// A role the graph has never seen still yields itself. `Dfs` keeps its
    /// own visited set, so this terminates even on a cyclic graph.
    pub fn effective_roles(&self, start: &RoleName) -> BTreeSet<RoleName> {
        let mut roles = BTreeSet::new();
        roles.insert(start.clone());

        if let Some(&idx) = self.nodes.get(start) {
            let mut dfs = Dfs::new(&self.graph, idx);
            while let Some(node) = dfs.next(&self.graph) {
                roles.insert(self.graph[node].clone());
            }
        }

        roles
    }

    /// Whether any edge mentions `role`.
    pub fn contains_role(&self, role: &str) -> bool {
        self.nodes.contains_key(role)
    }

    /// All roles mentioned by an edge.
    pub fn roles(&self) -> impl Iterator<Item = &RoleName> {
        self.nodes.keys()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(role: &str, inherits_from: &str) -> RoleInheritance {
        RoleInheritance::new(role, inherits_from)
    }

    fn names(roles: &BTreeSet<RoleName>) -> Vec<&str> {
        roles.iter().map(|r| r.as_str()).collect()
    }

    fn cycle_path(err: AuthzError) -> Vec<String> {
        match err {
            AuthzError::CycleDetected { path } => path,
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_transitive_effective_roles() {
        let graph = RoleGraph::build(&[edge("admin", "moderator"), edge("moderator", "user")])
            .unwrap();

        assert_eq!(
            names(&graph.effective_roles(&"admin".into())),
            vec!["admin", "moderator", "user"]
        );
        assert_eq!(
            names(&graph.effective_roles(&"moderator".into())),
            vec!["moderator", "user"]
        );
        assert_eq!(names(&graph.effective_roles(&"user".into())), vec!["user"]);
    }

    #[test]
    fn test_unknown_role_yields_itself() {
        let graph = RoleGraph::build(&[edge("editor", "viewer")]).unwrap();
        assert_eq!(names(&graph.effective_roles(&"guest".into())), vec!["guest"]);
    }

    #[test]
    fn test_diamond_inheritance() {
        let graph = RoleGraph::build(&[
            edge("lead", "frontend"),
            edge("lead", "backend"),
            edge("frontend", "dev"),
            edge("backend", "dev"),
        ])
        .unwrap();

        assert_eq!(
            names(&graph.effective_roles(&"lead".into())),
            vec!["backend", "dev", "frontend", "lead"]
        );
    }

    #[test]
    fn test_build_rejects_cycle_with_path() {
        let err = RoleGraph::build(&[
            edge("admin", "moderator"),
            edge("moderator", "user"),
            edge("user", "admin"),
        ])
        .unwrap_err();

        let path = cycle_path(err);
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
        for role in ["admin", "moderator", "user"] {
            assert!(path.iter().any(|r| r == role));
        }
    }

    #[test]
    fn test_build_rejects_self_loop() {
        let path = cycle_path(RoleGraph::build(&[edge("admin", "admin")]).unwrap_err());
        assert_eq!(path, vec!["admin", "admin"]);
    }

    #[test]
    fn test_check_edge_transitive_cycle() {
        let graph = RoleGraph::build(&[edge("admin", "moderator"), edge("moderator", "user")])
            .unwrap();

        let path = cycle_path(graph.check_edge(&edge("user", "admin")).unwrap_err());
        assert_eq!(path, vec!["user", "admin", "moderator", "user"]);

        assert!(graph.check_edge(&edge("guest", "user")).is_ok());
        assert!(graph.check_edge(&edge("admin", "user")).is_ok());
    }

    #[test]
    fn test_check_edge_self_loop() {
        let graph = RoleGraph::new();
        let path = cycle_path(graph.check_edge(&edge("user", "user")).unwrap_err());
        assert_eq!(path, vec!["user", "user"]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = RoleGraph::build(&[edge("a", "b"), edge("a", "b")]).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains_role("a"));
        assert!(graph.contains_role("b"));
        assert!(!graph.contains_role("c"));
    }

    #[test]
    fn test_effective_roles_stable() {
        let edges = [edge("a", "b"), edge("b", "c"), edge("a", "d")];
        let first = RoleGraph::build(&edges).unwrap().effective_roles(&"a".into());
        let mut reversed = edges.to_vec();
        reversed.reverse();
        let second = RoleGraph::build(&reversed).unwrap().effective_roles(&"a".into());
        assert_eq!(first, second);
    }
}
