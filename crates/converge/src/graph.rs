//! Dependency graph builder.
//!
//! Edges point from a resource to what it requires: its scope, its
//! explicit `depends_on` entries, references inside its properties, and
//! (for endpoints) the private zones it joins. Requirements on resources
//! that are not declared become [`ExternalRef`]s checked by the validator,
//! except for `depends_on`, which must name a declared resource.
//!
//! Cycle detection and ordering share one depth-first walk with
//! white/gray/black marking. Roots and requirements are visited in
//! declaration order, so the resulting order is reproducible.

use crate::error::{Error, Result};
use crate::model::{EdgeKind, Resource};
use cloudkit::ResourceKey;
use std::collections::{BTreeMap, BTreeSet};

/// A declared resource with its edges.
#[derive(Debug, Clone)]
pub struct Node {
    pub resource: Resource,
    pub key: ResourceKey,
    /// Indices of nodes this one requires, ascending
    pub deps: Vec<usize>,
    /// Indices of nodes requiring this one, ascending
    pub dependents: Vec<usize>,
}

/// Requirement on a resource outside the declared set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    pub from: usize,
    pub target: ResourceKey,
    pub via: EdgeKind,
}

/// Acyclic dependency graph over declared resources.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: BTreeMap<ResourceKey, usize>,
    order: Vec<usize>,
    externals: Vec<ExternalRef>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl Graph {
    /// Build the graph, rejecting duplicates, unknown dependencies and cycles.
    pub fn build(resources: Vec<Resource>) -> Result<Self> {
        let mut index = BTreeMap::new();
        let mut nodes = Vec::with_capacity(resources.len());

        for resource in resources {
            let key = resource.key();
            if index.insert(key.clone(), nodes.len()).is_some() {
                return Err(Error::DuplicateResource { key });
            }
            nodes.push(Node {
                resource,
                key,
                deps: Vec::new(),
                dependents: Vec::new(),
            });
        }

        let mut externals = Vec::new();
        for i in 0..nodes.len() {
            let mut deps = BTreeSet::new();
            for (target, via) in nodes[i].resource.references() {
                match index.get(&target) {
                    Some(&j) => {
                        deps.insert(j);
                    }
                    None if via == EdgeKind::Explicit => {
                        return Err(Error::UnknownDependency {
                            resource: nodes[i].key.clone(),
                            target,
                        });
                    }
                    None => externals.push(ExternalRef {
                        from: i,
                        target,
                        via,
                    }),
                }
            }
            for &j in &deps {
                nodes[j].dependents.push(i);
            }
            nodes[i].deps = deps.into_iter().collect();
        }
        for node in &mut nodes {
            node.dependents.sort_unstable();
            node.dependents.dedup();
        }

        let order = topo_order(&nodes)?;
        log::debug!(
            "Built dependency graph: {} nodes, {} external requirements",
            nodes.len(),
            externals.len()
        );

        Ok(Self {
            nodes,
            index,
            order,
            externals,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, key: &ResourceKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Node indices with every node after all the nodes it requires.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn externals(&self) -> &[ExternalRef] {
        &self.externals
    }

    /// External requirements of one node.
    pub fn externals_of(&self, idx: usize) -> impl Iterator<Item = &ExternalRef> {
        self.externals.iter().filter(move |e| e.from == idx)
    }

    /// Every node that directly or transitively requires `idx`.
    pub fn transitive_dependents(&self, idx: usize) -> BTreeSet<usize> {
        let mut closure = self.dependents_closure([idx]);
        closure.remove(&idx);
        closure
    }

    /// `roots` plus everything that transitively requires them.
    pub fn dependents_closure(&self, roots: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<usize> = roots.into_iter().collect();
        while let Some(i) = stack.pop() {
            if seen.insert(i) {
                stack.extend(self.nodes[i].dependents.iter().copied());
            }
        }
        seen
    }
}

/// Postorder over requirement edges (requirements first), failing on the first cycle.
fn topo_order(nodes: &[Node]) -> Result<Vec<usize>> {
    let mut marks = vec![Mark::White; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    for root in 0..nodes.len() {
        if marks[root] != Mark::White {
            continue;
        }

        // Explicit stack of (node, next dep position) to avoid deep recursion
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Gray;

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&dep) = nodes[node].deps.get(top.1) {
                top.1 += 1;
                match marks[dep] {
                    Mark::White => {
                        marks[dep] = Mark::Gray;
                        stack.push((dep, 0));
                    }
                    Mark::Gray => {
                        let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut path: Vec<ResourceKey> =
                            stack[start..].iter().map(|(n, _)| nodes[*n].key.clone()).collect();
                        path.push(nodes[dep].key.clone());
                        return Err(Error::Cycle { path });
                    }
                    Mark::Black => {}
                }
            } else {
                marks[node] = Mark::Black;
                order.push(node);
                stack.pop();
            }
        }
    }

    Ok(order)
}
