//! The e-graph: equivalence classes over circuit terms.
//!
//! An [`ENode`] is a circuit term whose children are e-class ids, so a
//! single e-node stands for every combination of equivalent subterms.
//! An [`EClass`] is a set of e-nodes proven semantically equal, plus
//! the list of parent e-nodes referencing it. Identity of a class is a
//! [`UnionFind`] id; after merges, [`EGraph::find`] maps any historical
//! id to the canonical one.
//!
//! Mutation follows the usual equality-saturation protocol: batch
//! [`EGraph::add`]s and [`EGraph::merge`]s, then call
//! [`EGraph::rebuild`] to restore the congruence invariant (two
//! e-nodes with the same canonical key always share a class) before
//! matching again.

use log::*;

use crate::ir::{Circuit, OpId, OpKind};
use crate::unionfind::UnionFind;
use crate::util::{HashMap, HashSet, IndexMap};
use crate::Id;

/// A term whose children are e-class ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ENode {
    /// The operation this term applies.
    pub kind: OpKind,
    /// Width of the produced bit-vector.
    pub width: u32,
    /// Child e-class ids, in operand order.
    pub children: Vec<Id>,
}

impl ENode {
    /// Makes an e-node.
    pub fn new(kind: OpKind, width: u32, children: Vec<Id>) -> Self {
        ENode {
            kind,
            width,
            children,
        }
    }

    /// Makes a childless e-node.
    pub fn leaf(kind: OpKind, width: u32) -> Self {
        Self::new(kind, width, vec![])
    }

    /// Whether this e-node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn update_children(&mut self, mut f: impl FnMut(Id) -> Id) {
        for child in &mut self.children {
            *child = f(*child);
        }
    }
}

/// An equivalence class of [`ENode`]s.
#[derive(Debug, Clone)]
pub struct EClass {
    /// This class's id.
    pub id: Id,
    /// Width shared by every e-node in the class.
    pub width: u32,
    /// The equivalent e-nodes in this class.
    pub nodes: Vec<ENode>,
    /// Parent e-nodes referencing this class, with their class ids.
    pub(crate) parents: Vec<(ENode, Id)>,
}

impl EClass {
    /// The number of e-nodes in this class.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the class holds no e-nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the e-nodes in this class.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ENode> {
        self.nodes.iter()
    }
}

/// Equivalence classes over circuit terms, maintained with
/// hash-consing and congruence closure.
#[derive(Debug, Default, Clone)]
pub struct EGraph {
    unionfind: UnionFind,
    memo: HashMap<ENode, Id>,
    classes: IndexMap<Id, EClass>,
    pending: Vec<(ENode, Id)>,
    n_unions: usize,
}

impl EGraph {
    /// Creates an empty e-graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an e-graph holding every node of `circuit` (reachable or
    /// not), returning the mapping from operation ids to e-class ids.
    pub fn from_circuit(circuit: &Circuit) -> (Self, HashMap<OpId, Id>) {
        let mut egraph = EGraph::default();
        let mut ids: HashMap<OpId, Id> = HashMap::default();

        let mut visited: HashSet<OpId> = HashSet::default();
        for op in circuit.ops() {
            for id in circuit.topo_order(op.id) {
                if !visited.insert(id) {
                    continue;
                }
                let op = circuit.op(id);
                let children = op.operands.iter().map(|o| ids[o]).collect();
                let class = egraph.add(ENode::new(op.kind.clone(), op.width, children));
                ids.insert(id, class);
            }
        }

        (egraph, ids)
    }

    /// The canonical id of `id`'s class. Read-only; panics on an id
    /// this e-graph never created.
    pub fn find(&self, id: Id) -> Id {
        self.unionfind.find(id)
    }

    /// The number of e-classes.
    pub fn number_of_classes(&self) -> usize {
        self.classes.len()
    }

    /// The number of e-nodes, summed over all classes.
    pub fn total_number_of_nodes(&self) -> usize {
        self.classes.values().map(|c| c.len()).sum()
    }

    /// The number of effective (non-trivial) merges so far.
    pub fn n_unions(&self) -> usize {
        self.n_unions
    }

    /// Iterates over the e-classes in insertion order.
    pub fn classes(&self) -> impl ExactSizeIterator<Item = &EClass> {
        self.classes.values()
    }

    /// The class of `id`. Panics on an unknown id.
    pub fn class(&self, id: Id) -> &EClass {
        let canonical = self.find(id);
        self.classes
            .get(&canonical)
            .unwrap_or_else(|| panic!("no e-class for id {}", id))
    }

    /// Adds an e-node, hash-consing it: if a congruent e-node is
    /// already present, the existing class id is returned.
    pub fn add(&mut self, mut enode: ENode) -> Id {
        // make sure the e-node's children are already in the graph
        if cfg!(debug_assertions) {
            for &child in &enode.children {
                assert!(
                    usize::from(child) < self.unionfind.size(),
                    "e-node child {} was never added",
                    child
                );
            }
        }

        let uf = &mut self.unionfind;
        enode.update_children(|c| uf.find_compress(c));

        if let Some(&id) = self.memo.get(&enode) {
            return self.unionfind.find_compress(id);
        }

        let id = self.unionfind.make_set();
        for &child in &enode.children {
            let class = self
                .classes
                .get_mut(&child)
                .unwrap_or_else(|| panic!("no e-class for child {}", child));
            class.parents.push((enode.clone(), id));
        }
        self.classes.insert(
            id,
            EClass {
                id,
                width: enode.width,
                nodes: vec![enode.clone()],
                parents: vec![],
            },
        );
        self.memo.insert(enode, id);
        trace!("added e-class {}", id);
        id
    }

    /// Merges the classes of `a` and `b`, returning the canonical id of
    /// the combined class. The survivor is decided by the union-find
    /// (rank, then smaller id); the other class's nodes and parents are
    /// absorbed into it and it is marked pending for [`rebuild`].
    ///
    /// [`rebuild`]: EGraph::rebuild
    pub fn merge(&mut self, a: Id, b: Id) -> Id {
        let a = self.unionfind.find_compress(a);
        let b = self.unionfind.find_compress(b);
        if a == b {
            return a;
        }

        let root = self.unionfind.merge(a, b);
        let loser = if root == a { b } else { a };
        self.n_unions += 1;

        let loser_class = self
            .classes
            .shift_remove(&loser)
            .unwrap_or_else(|| panic!("no e-class for id {}", loser));
        let winner_class = self.classes.get_mut(&root).unwrap();
        assert_eq!(
            winner_class.width, loser_class.width,
            "merged e-classes {} and {} of different widths",
            root, loser
        );

        self.pending.extend(loser_class.parents.iter().cloned());
        winner_class.nodes.extend(loser_class.nodes);
        winner_class.parents.extend(loser_class.parents);

        trace!("merged {} into {}", loser, root);
        root
    }

    /// Restores the congruence invariant after a batch of merges:
    /// re-canonicalizes the parents of every touched class, merging
    /// classes whose e-nodes collide on their canonical key, until no
    /// work remains. Returns the number of parent e-nodes repaired.
    pub fn rebuild(&mut self) -> usize {
        let mut n_repairs = 0;

        while let Some((mut enode, class)) = self.pending.pop() {
            let uf = &mut self.unionfind;
            enode.update_children(|c| uf.find_compress(c));
            let class = self.unionfind.find_compress(class);

            if let Some(old) = self.memo.insert(enode, class) {
                let old = self.unionfind.find_compress(old);
                if old != class {
                    self.merge(old, class);
                }
            }
            n_repairs += 1;
        }

        let trimmed = self.rebuild_classes();
        debug!(
            "rebuilt: {} repairs, {} nodes trimmed, {} classes",
            n_repairs,
            trimmed,
            self.classes.len()
        );
        n_repairs
    }

    /// Canonicalizes and deduplicates the node and parent lists of
    /// every class. Returns the number of duplicate nodes trimmed.
    fn rebuild_classes(&mut self) -> usize {
        let mut trimmed = 0;
        let uf = &mut self.unionfind;
        for class in self.classes.values_mut() {
            let old_len = class.nodes.len();
            for node in &mut class.nodes {
                node.update_children(|c| uf.find_compress(c));
            }
            class.nodes.sort_unstable();
            class.nodes.dedup();
            trimmed += old_len - class.nodes.len();

            for (node, id) in &mut class.parents {
                node.update_children(|c| uf.find_compress(c));
                *id = uf.find_compress(*id);
            }
            class.parents.sort_unstable();
            class.parents.dedup();
        }
        trimmed
    }

    /// Checks the congruence invariant; panics if two e-nodes with the
    /// same canonical key live in different classes. Intended for
    /// tests and debugging.
    pub fn assert_congruent(&self) {
        let mut seen: HashMap<ENode, Id> = HashMap::default();
        for class in self.classes.values() {
            assert_eq!(
                self.find(class.id),
                class.id,
                "class {} stored under a non-canonical id",
                class.id
            );
            for node in &class.nodes {
                let mut canonical = node.clone();
                canonical.update_children(|c| self.find(c));
                if let Some(&other) = seen.get(&canonical) {
                    assert_eq!(
                        self.find(other),
                        self.find(class.id),
                        "congruence violated for {:?}",
                        canonical
                    );
                } else {
                    seen.insert(canonical, class.id);
                }
            }
        }
    }
}
