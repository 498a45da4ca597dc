//! Lowering a rewritten e-class back to circuit operations.
//!
//! [`Extractor`] picks, for every e-class, the smallest-tree e-node
//! (counting one per operation), then rebuilds the chosen term as
//! [`Circuit`] nodes. Ties are broken by the class's sorted node
//! order, so extraction is deterministic.

use crate::egraph::{EGraph, ENode};
use crate::ir::{Circuit, OpId, TypingError};
use crate::util::HashMap;
use crate::Id;

/// Chooses a smallest representative term for each e-class.
pub struct Extractor<'a> {
    egraph: &'a EGraph,
    costs: HashMap<Id, (usize, ENode)>,
}

impl<'a> Extractor<'a> {
    /// Computes costs for every class of `egraph`, bottom-up to a
    /// fixpoint.
    pub fn new(egraph: &'a EGraph) -> Self {
        let mut extractor = Extractor {
            egraph,
            costs: HashMap::default(),
        };
        extractor.find_costs();
        extractor
    }

    fn node_cost(&self, node: &ENode) -> Option<usize> {
        if node.is_leaf() {
            return Some(1);
        }
        let mut cost = 1usize;
        for &child in &node.children {
            let (child_cost, _) = self.costs.get(&self.egraph.find(child))?;
            cost = cost.saturating_add(*child_cost);
        }
        Some(cost)
    }

    fn find_costs(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for class in self.egraph.classes() {
                let id = self.egraph.find(class.id);
                let best = class
                    .iter()
                    .filter_map(|node| self.node_cost(node).map(|cost| (cost, node)));
                // first-wins on equal cost keeps the sorted-order tie-break
                let best = best.reduce(|a, b| if b.0 < a.0 { b } else { a });
                if let Some((cost, node)) = best {
                    let current = self.costs.get(&id).map(|(c, _)| *c);
                    if current.map_or(true, |c| cost < c) {
                        self.costs.insert(id, (cost, node.clone()));
                        changed = true;
                    }
                }
            }
        }
    }

    /// The cost of the best term of `id`'s class.
    pub fn find_best_cost(&self, id: Id) -> usize {
        self.costs[&self.egraph.find(id)].0
    }

    /// Builds the best term of `id`'s class into `circuit`, sharing
    /// already-built subterms, and returns its operation id.
    pub fn find_best(&self, id: Id, circuit: &mut Circuit) -> Result<OpId, TypingError> {
        let mut built: HashMap<Id, OpId> = HashMap::default();
        self.build(self.egraph.find(id), circuit, &mut built)
    }

    fn build(
        &self,
        id: Id,
        circuit: &mut Circuit,
        built: &mut HashMap<Id, OpId>,
    ) -> Result<OpId, TypingError> {
        if let Some(&op) = built.get(&id) {
            return Ok(op);
        }
        let (_, node) = self
            .costs
            .get(&id)
            .unwrap_or_else(|| panic!("no finite-cost term for e-class {}", id));
        let node = node.clone();
        let mut operands = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            operands.push(self.build(self.egraph.find(child), circuit, built)?);
        }
        let op = circuit.create(node.kind, node.width, &operands)?;
        built.insert(id, op);
        Ok(op)
    }
}
