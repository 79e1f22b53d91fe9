//! Dataflow graph of a composed operator

use crate::error::{KolosalError, Result};
use crate::lifecycle::LifecycleState;
use crate::operator::{OpId, Operator};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// An individual operator in the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: OpId,
    pub name: String,
    pub state: LifecycleState,
    /// Innermost choice this node is a branch of
    pub choice: Option<OpId>,
}

/// Nodes and edges of the DAG denoted by an operator
///
/// Nodes are individual operators in left-to-right order; composites only
/// contribute edges. A node occurring twice is listed once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<(OpId, OpId)>,
}

impl Graph {
    /// Node identities in execution order
    pub fn topological_order(&self) -> Result<Vec<OpId>> {
        let position: BTreeMap<OpId, usize> = self.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let mut in_degree: BTreeMap<OpId, usize> = self.nodes.iter().map(|n| (n.id, 0)).collect();
        let mut successors: BTreeMap<OpId, Vec<OpId>> = BTreeMap::new();
        for (from, to) in &self.edges {
            *in_degree.entry(*to).or_insert(0) += 1;
            successors.entry(*from).or_default().push(*to);
        }

        let rank = |id: &OpId| position.get(id).copied().unwrap_or(usize::MAX);
        let mut ready: BTreeSet<(usize, OpId)> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| (rank(id), *id))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            let (_, id) = next;
            order.push(id);
            for succ in successors.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(d) = in_degree.get_mut(succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert((rank(succ), *succ));
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            return Err(KolosalError::Composition("operator graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    pub fn node(&self, id: OpId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

impl Operator {
    /// The DAG of individual operators this operator denotes
    pub fn graph(&self) -> Graph {
        let mut graph = Graph::default();
        let mut seen = BTreeSet::new();
        let mut edges = BTreeSet::new();
        add_nodes(self, None, &mut graph, &mut seen, &mut edges);
        graph.edges = edges.into_iter().collect();
        graph
    }

    /// Individual operators whose output leaves this operator
    fn egress(&self) -> Vec<OpId> {
        match self {
            Operator::Individual(op) => vec![op.id()],
            Operator::Sequence(c) => c.steps().last().map(|s| s.egress()).unwrap_or_default(),
            Operator::Parallel(c) | Operator::Choice(c) => c.steps().iter().flat_map(|s| s.egress()).collect(),
        }
    }
}

fn add_nodes(
    op: &Operator,
    choice: Option<OpId>,
    graph: &mut Graph,
    seen: &mut BTreeSet<OpId>,
    edges: &mut BTreeSet<(OpId, OpId)>,
) {
    match op {
        Operator::Individual(ind) => {
            if seen.insert(ind.id()) {
                graph.nodes.push(GraphNode {
                    id: ind.id(),
                    name: ind.name().to_string(),
                    state: ind.state(),
                    choice,
                });
            }
        }
        Operator::Sequence(c) => {
            for step in c.steps() {
                add_nodes(step, choice, graph, seen, edges);
            }
            for pair in c.steps().windows(2) {
                for from in pair[0].egress() {
                    for to in pair[1].ingress() {
                        edges.insert((from, to.id()));
                    }
                }
            }
        }
        Operator::Parallel(c) => {
            for step in c.steps() {
                add_nodes(step, choice, graph, seen, edges);
            }
        }
        Operator::Choice(c) => {
            for step in c.steps() {
                add_nodes(step, Some(c.id()), graph, seen, edges);
            }
        }
    }
}
