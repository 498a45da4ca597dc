//! Pattern matching over the e-graph.
//!
//! [`match_pattern`] enumerates every way a [`MatchPattern`] embeds
//! into an [`EGraph`], by structural recursion: operation and constant
//! atoms are checked against individual e-nodes, places bind whole
//! e-classes (a place bound twice must see the same class), and lists
//! match a node's head and then thread the partial binding through the
//! node's children left to right.
//!
//! Matches are materialized into a `Vec` under the current e-graph
//! state; any `add`, `merge` or `rebuild` invalidates them, so callers
//! collect first and mutate after. Enumeration order is deterministic:
//! e-classes in insertion order, e-nodes in their (sorted) class order.

use crate::egraph::{EClass, EGraph, ENode};
use crate::ir::{bits_to_u64, OpKind};
use crate::pattern::{Atom, MatchPattern, PatternExpr};
use crate::util::{HashMap, Symbol};
use crate::Id;

/// A binding of place indices (positions in
/// [`MatchPattern::places`]) to e-class ids.
pub type Subst = HashMap<u32, Id>;

/// One way a pattern matches: the matched class and the places bound
/// along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The e-class the pattern root matched.
    pub root: Id,
    /// Bound places, keyed by place index.
    pub places: Subst,
}

fn place_index(places: &[Symbol], place: Symbol) -> u32 {
    places
        .iter()
        .position(|&p| p == place)
        .expect("place not declared by the pattern") as u32
}

/// Enumerates all matches of `pattern` in `egraph`. Only bindings that
/// cover every declared place are yielded.
pub fn match_pattern(pattern: &MatchPattern, egraph: &EGraph) -> Vec<MatchResult> {
    let mut results = Vec::new();
    for class in egraph.classes() {
        for m in match_in_class(&pattern.expr, class, egraph, &pattern.places, &Subst::default()) {
            if m.places.len() == pattern.places.len() {
                results.push(m);
            }
        }
    }
    results
}

fn bind_place(
    place: Symbol,
    class: Id,
    egraph: &EGraph,
    places: &[Symbol],
    partial: &Subst,
) -> Vec<MatchResult> {
    let index = place_index(places, place);
    let class = egraph.find(class);
    if let Some(&previous) = partial.get(&index) {
        // linearity: a place seen twice must match the same class
        if previous != class {
            return vec![];
        }
    }
    let mut bound = partial.clone();
    bound.insert(index, class);
    vec![MatchResult {
        root: class,
        places: bound,
    }]
}

fn match_in_class(
    expr: &PatternExpr,
    class: &EClass,
    egraph: &EGraph,
    places: &[Symbol],
    partial: &Subst,
) -> Vec<MatchResult> {
    if let PatternExpr::Atom(Atom::Place(p)) = expr {
        return bind_place(*p, class.id, egraph, places, partial);
    }
    class
        .iter()
        .flat_map(|node| match_on_node(expr, node, class, egraph, places, partial))
        .collect()
}

fn match_on_node(
    expr: &PatternExpr,
    node: &ENode,
    class: &EClass,
    egraph: &EGraph,
    places: &[Symbol],
    partial: &Subst,
) -> Vec<MatchResult> {
    let root = egraph.find(class.id);
    let hit = || {
        vec![MatchResult {
            root,
            places: partial.clone(),
        }]
    };

    match expr {
        PatternExpr::Atom(Atom::Constant(c)) => match &node.kind {
            OpKind::Constant(bits)
                if bits_to_u64(bits) == Some(c.value)
                    && c.width.map_or(true, |w| w == node.width) =>
            {
                hit()
            }
            _ => vec![],
        },

        PatternExpr::Atom(Atom::Operation(name)) => {
            if node.kind.name() == name.as_str() {
                hit()
            } else {
                vec![]
            }
        }

        PatternExpr::Atom(Atom::Place(p)) => bind_place(*p, class.id, egraph, places, partial),

        PatternExpr::Atom(Atom::Label(_)) => {
            unreachable!("labels are rejected at rule compile time")
        }

        PatternExpr::List(items) => {
            let (head, child_patterns) = items.split_first().expect("empty pattern list");
            let heads = match_on_node(head, node, class, egraph, places, partial);
            if child_patterns.is_empty() {
                return heads;
            }
            if node.children.len() != child_patterns.len() {
                return vec![];
            }

            let mut results = Vec::new();
            for head_match in heads {
                let mut partials = vec![head_match.places];
                for (pattern, &child) in child_patterns.iter().zip(&node.children) {
                    let child_class = egraph.class(child);
                    let mut next = Vec::new();
                    for p in &partials {
                        for m in match_in_class(pattern, child_class, egraph, places, p) {
                            next.push(m.places);
                        }
                    }
                    partials = next;
                    if partials.is_empty() {
                        break;
                    }
                }
                results.extend(partials.into_iter().map(|places| MatchResult {
                    root,
                    places,
                }));
            }
            results
        }
    }
}
