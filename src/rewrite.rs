//! Applying rewrite rules to the e-graph.
//!
//! For every match of a rule's left-hand side, the right-hand side is
//! instantiated bottom-up (places become the bound e-class ids, lists
//! become fresh e-nodes with inferred widths) and the resulting class
//! is merged with the matched class. Applications are batched: the
//! caller collects all matches first, applies them, then calls
//! [`EGraph::rebuild`] once.

use log::*;

use crate::egraph::{EGraph, ENode};
use crate::ir::{u64_to_bits, OpKind};
use crate::ematch::MatchResult;
use crate::pattern::{Atom, PatternExpr, RewriteRule};
use crate::util::Symbol;
use crate::Id;

impl RewriteRule {
    /// Enumerates this rule's matches under the current e-graph state.
    pub fn search(&self, egraph: &EGraph) -> Vec<MatchResult> {
        crate::ematch::match_pattern(&self.lhs, egraph)
    }
}

/// Infers the width an rhs operation produces from its children's
/// widths, per the IR typing rules. Only called for kinds that
/// [`crate::pattern`] allows on a right-hand side.
fn infer_width(kind: &OpKind, child_widths: &[u32]) -> u32 {
    match kind {
        OpKind::Icmp(_) | OpKind::Parity => 1,
        OpKind::Select => child_widths[1],
        OpKind::Concat => child_widths.iter().sum(),
        _ => child_widths[0],
    }
}

fn instantiate(
    expr: &PatternExpr,
    m: &MatchResult,
    places: &[Symbol],
    root_width: u32,
    egraph: &mut EGraph,
) -> Option<Id> {
    match expr {
        PatternExpr::Atom(Atom::Place(p)) => {
            let index = places.iter().position(|q| q == p).expect("bound place") as u32;
            Some(m.places[&index])
        }
        PatternExpr::Atom(Atom::Constant(c)) => {
            let width = c.width.unwrap_or(root_width);
            Some(egraph.add(ENode::leaf(
                OpKind::Constant(u64_to_bits(c.value, width)),
                width,
            )))
        }
        PatternExpr::Atom(Atom::Operation(_) | Atom::Label(_)) => {
            unreachable!("rejected at rule compile time")
        }
        PatternExpr::List(items) => {
            let (head, child_patterns) = items.split_first().expect("empty pattern list");
            let name = match head {
                PatternExpr::Atom(Atom::Operation(name)) => name,
                _ => unreachable!("rejected at rule compile time"),
            };
            let kind = OpKind::from_rule_name(name.as_str()).expect("constructible");

            let mut children = Vec::with_capacity(child_patterns.len());
            for pattern in child_patterns {
                children.push(instantiate(pattern, m, places, root_width, egraph)?);
            }
            let child_widths: Vec<u32> =
                children.iter().map(|&c| egraph.class(c).width).collect();

            // a binary operation applied to classes of unequal widths
            // cannot be typed; drop the match
            if matches!(
                kind,
                OpKind::Add
                    | OpKind::Sub
                    | OpKind::Mul
                    | OpKind::And
                    | OpKind::Or
                    | OpKind::Xor
                    | OpKind::Shl
                    | OpKind::LShr
                    | OpKind::AShr
                    | OpKind::Icmp(_)
            ) && child_widths[0] != child_widths[1]
            {
                warn!(
                    "skipping rewrite: {} over widths {} and {}",
                    name, child_widths[0], child_widths[1]
                );
                return None;
            }

            let width = infer_width(&kind, &child_widths);
            Some(egraph.add(ENode::new(kind, width, children)))
        }
    }
}

/// Applies every match of `rule`, merging each instantiated right-hand
/// side with its matched class. Returns the number of matches whose
/// merge actually changed the e-graph.
pub fn apply_matches(egraph: &mut EGraph, rule: &RewriteRule, matches: &[MatchResult]) -> usize {
    let mut applied = 0;
    for m in matches {
        let root = egraph.find(m.root);
        let root_width = egraph.class(root).width;
        let Some(instantiated) = instantiate(&rule.rhs, m, &rule.lhs.places, root_width, egraph)
        else {
            continue;
        };

        let before = egraph.n_unions();
        egraph.merge(root, instantiated);
        if egraph.n_unions() > before {
            applied += 1;
        }
    }
    if applied > 0 {
        debug!("applied {} {} times", rule.name, applied);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> ENode {
        ENode::leaf(OpKind::InputRegister(name.into()), 8)
    }

    #[test]
    fn commute_and_merge() {
        crate::init_logger();
        let mut egraph = EGraph::new();
        let three = egraph.add(ENode::leaf(OpKind::Constant(u64_to_bits(3, 8)), 8));
        let x = egraph.add(reg("x"));
        let plus = egraph.add(ENode::new(OpKind::Add, 8, vec![three, x]));

        let rule = RewriteRule::new("comm", "(add ?a ?b)", "(add ?b ?a)").unwrap();
        let matches = rule.search(&egraph);
        assert_eq!(matches.len(), 1);
        assert_eq!(apply_matches(&mut egraph, &rule, &matches), 1);
        egraph.rebuild();

        // both orderings now live in one class
        let flipped = egraph.add(ENode::new(OpKind::Add, 8, vec![x, three]));
        assert_eq!(egraph.find(plus), egraph.find(flipped));

        // a second round adds nothing new
        let matches = rule.search(&egraph);
        assert_eq!(apply_matches(&mut egraph, &rule, &matches), 0);
    }
}
