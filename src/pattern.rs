//! Rewrite-rule patterns and their s-expression DSL.
//!
//! Grammar:
//!
//! ```text
//! rule      ::= '(' 'rule' name pattern '=>' pattern ')'
//! pattern   ::= atom | '(' pattern+ ')'
//! atom      ::= constant | '?'ident | ident | ':'ident
//! constant  ::= decimal | '#b' bits | '#x' hex
//! ```
//!
//! `?x` is a *place* (a variable binding), bare identifiers name
//! operations, `#b…`/`#x…` are sized constants and plain decimals are
//! unsized ones. Rules are checked when they are built: operation
//! names must be known, every place on the right-hand side must be
//! bound on the left, the right-hand side may only construct
//! payload-free operations, and `:label` references (unimplemented in
//! the matcher) are rejected outright.

use std::fmt;

use symbolic_expressions::Sexp;
use thiserror::Error;

use crate::ir::OpKind;
use crate::util::Symbol;

/// A constant occurring in a pattern. `#b…`/`#x…` syntax fixes the
/// width; a plain decimal leaves it to be inferred from the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantAtom {
    /// The constant's value.
    pub value: u64,
    /// The constant's width, when spelled with `#b`/`#x`.
    pub width: Option<u32>,
}

/// A pattern leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// Matches a constant operation with this value.
    Constant(ConstantAtom),
    /// Matches any operation with this name.
    Operation(Symbol),
    /// Binds (or checks) a place.
    Place(Symbol),
    /// A named sub-pattern reference. Parsed, never matched.
    Label(Symbol),
}

/// A pattern tree: an atom, or a list whose head is matched against a
/// node and whose tail is matched against the node's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternExpr {
    /// A leaf.
    Atom(Atom),
    /// `(head child…)`.
    List(Vec<PatternExpr>),
}

/// A compiled left-hand side: the pattern plus its places in
/// first-occurrence order (a place's index in this list is its binding
/// slot in a [`Subst`](crate::Subst)).
#[derive(Debug, Clone)]
pub struct MatchPattern {
    /// The pattern tree.
    pub expr: PatternExpr,
    /// Declared places, in first-occurrence order.
    pub places: Vec<Symbol>,
}

/// A named rewrite rule, `lhs => rhs`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    /// The rule's name, used in logs and application counts.
    pub name: Symbol,
    /// The left-hand side.
    pub lhs: MatchPattern,
    /// The right-hand side.
    pub rhs: PatternExpr,
}

/// Errors detected while parsing or compiling a rule.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The s-expression itself is malformed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A rule is not of the form `(rule name lhs => rhs)`.
    #[error("malformed rule, expected (rule name lhs => rhs)")]
    MalformedRule,
    /// An empty `()` pattern.
    #[error("empty pattern")]
    EmptyPattern,
    /// An identifier does not name any operation.
    #[error("unknown operation {0}")]
    UnknownOperation(String),
    /// A right-hand-side place that the left-hand side never binds.
    #[error("place ?{0} appears only on the right-hand side")]
    FreePlace(Symbol),
    /// Labels are parsed for grammar compatibility but not matchable.
    #[error("label :{0} is not supported in rules")]
    Label(Symbol),
    /// The right-hand side names an operation that cannot be built
    /// without a payload (extract bounds, register names, …).
    #[error("operation {0} cannot be constructed by a right-hand side")]
    Unconstructible(String),
    /// An operation on the right-hand side has the wrong child count.
    #[error("operation {op} takes {expected} children, got {got}")]
    RhsArity {
        /// Operation name.
        op: String,
        /// Expected child count (rendered, may be a range).
        expected: String,
        /// Actual child count.
        got: usize,
    },
}

fn parse_atom(token: &str) -> Result<Atom, PatternError> {
    if let Some(place) = token.strip_prefix('?') {
        if place.is_empty() {
            return Err(PatternError::Parse("empty place name".into()));
        }
        return Ok(Atom::Place(place.into()));
    }
    if let Some(label) = token.strip_prefix(':') {
        if label.is_empty() {
            return Err(PatternError::Parse("empty label name".into()));
        }
        return Ok(Atom::Label(label.into()));
    }
    if let Some(bits) = token.strip_prefix("#b") {
        let value = u64::from_str_radix(bits, 2)
            .map_err(|e| PatternError::Parse(format!("bad binary constant {}: {}", token, e)))?;
        return Ok(Atom::Constant(ConstantAtom {
            value,
            width: Some(bits.len() as u32),
        }));
    }
    if let Some(hex) = token.strip_prefix("#x") {
        let value = u64::from_str_radix(hex, 16)
            .map_err(|e| PatternError::Parse(format!("bad hex constant {}: {}", token, e)))?;
        return Ok(Atom::Constant(ConstantAtom {
            value,
            width: Some(4 * hex.len() as u32),
        }));
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        let value: u64 = token
            .parse()
            .map_err(|e| PatternError::Parse(format!("bad constant {}: {}", token, e)))?;
        return Ok(Atom::Constant(ConstantAtom { value, width: None }));
    }
    Ok(Atom::Operation(token.into()))
}

fn parse_pattern(sexp: &Sexp) -> Result<PatternExpr, PatternError> {
    match sexp {
        Sexp::Empty => Err(PatternError::EmptyPattern),
        Sexp::String(token) => Ok(PatternExpr::Atom(parse_atom(token)?)),
        Sexp::List(items) => {
            if items.is_empty() {
                return Err(PatternError::EmptyPattern);
            }
            let items: Result<Vec<_>, _> = items.iter().map(parse_pattern).collect();
            Ok(PatternExpr::List(items?))
        }
    }
}

fn gather_places(expr: &PatternExpr, places: &mut Vec<Symbol>) {
    match expr {
        PatternExpr::Atom(Atom::Place(p)) => {
            if !places.contains(p) {
                places.push(*p);
            }
        }
        PatternExpr::Atom(_) => {}
        PatternExpr::List(items) => {
            for item in items {
                gather_places(item, places);
            }
        }
    }
}

/// Child counts an rhs operation accepts, `(min, max)`.
fn rhs_arity(kind: &OpKind) -> (usize, usize) {
    match kind {
        OpKind::Not | OpKind::Parity | OpKind::PopCount => (1, 1),
        OpKind::Select => (3, 3),
        OpKind::Concat => (1, usize::MAX),
        _ => (2, 2),
    }
}

fn check_side(expr: &PatternExpr, rhs: bool, lhs_places: &[Symbol]) -> Result<(), PatternError> {
    match expr {
        PatternExpr::Atom(Atom::Label(l)) => Err(PatternError::Label(*l)),
        PatternExpr::Atom(Atom::Place(p)) => {
            if rhs && !lhs_places.contains(p) {
                return Err(PatternError::FreePlace(*p));
            }
            Ok(())
        }
        PatternExpr::Atom(Atom::Constant(_)) => Ok(()),
        PatternExpr::Atom(Atom::Operation(name)) => {
            if !OpKind::is_known_name(name.as_str()) {
                return Err(PatternError::UnknownOperation(name.as_str().into()));
            }
            if rhs {
                // a bare operation atom on the rhs has no children to
                // infer a width from
                return Err(PatternError::Unconstructible(name.as_str().into()));
            }
            Ok(())
        }
        PatternExpr::List(items) => {
            if rhs {
                let name = match &items[0] {
                    PatternExpr::Atom(Atom::Operation(name)) => *name,
                    other => {
                        return Err(PatternError::Parse(format!(
                            "rhs list head must be an operation, got {}",
                            other
                        )))
                    }
                };
                let kind = OpKind::from_rule_name(name.as_str())
                    .ok_or_else(|| PatternError::Unconstructible(name.as_str().into()))?;
                let (min, max) = rhs_arity(&kind);
                let got = items.len() - 1;
                if got < min || got > max {
                    return Err(PatternError::RhsArity {
                        op: name.as_str().into(),
                        expected: if min == max {
                            min.to_string()
                        } else {
                            format!("{}+", min)
                        },
                        got,
                    });
                }
                for item in &items[1..] {
                    check_side(item, rhs, lhs_places)?;
                }
                Ok(())
            } else {
                for item in items {
                    check_side(item, rhs, lhs_places)?;
                }
                Ok(())
            }
        }
    }
}

impl RewriteRule {
    /// Compiles a rule from its name and the two pattern sources.
    pub fn new(name: &str, lhs: &str, rhs: &str) -> Result<RewriteRule, PatternError> {
        let lhs = parse_pattern(&parse_str(lhs)?)?;
        let rhs = parse_pattern(&parse_str(rhs)?)?;
        Self::compile(name.into(), lhs, rhs)
    }

    /// Parses a full `(rule name lhs => rhs)` form.
    pub fn parse(source: &str) -> Result<RewriteRule, PatternError> {
        let sexp = parse_str(source)?;
        let items = match &sexp {
            Sexp::List(items) if items.len() == 5 => items,
            _ => return Err(PatternError::MalformedRule),
        };
        match (&items[0], &items[1], &items[3]) {
            (Sexp::String(rule), Sexp::String(name), Sexp::String(arrow))
                if rule.as_str() == "rule" && arrow.as_str() == "=>" =>
            {
                let lhs = parse_pattern(&items[2])?;
                let rhs = parse_pattern(&items[4])?;
                Self::compile(name.as_str().into(), lhs, rhs)
            }
            _ => Err(PatternError::MalformedRule),
        }
    }

    fn compile(
        name: Symbol,
        lhs: PatternExpr,
        rhs: PatternExpr,
    ) -> Result<RewriteRule, PatternError> {
        let mut places = Vec::new();
        gather_places(&lhs, &mut places);
        check_side(&lhs, false, &places)?;
        check_side(&rhs, true, &places)?;
        Ok(RewriteRule {
            name,
            lhs: MatchPattern { expr: lhs, places },
            rhs,
        })
    }
}

fn parse_str(source: &str) -> Result<Sexp, PatternError> {
    symbolic_expressions::parser::parse_str(source.trim())
        .map_err(|e| PatternError::Parse(e.to_string()))
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Constant(c) => match c.width {
                Some(width) => write!(f, "#b{:0>1$b}", c.value, width as usize),
                None => write!(f, "{}", c.value),
            },
            Atom::Operation(name) => write!(f, "{}", name),
            Atom::Place(p) => write!(f, "?{}", p),
            Atom::Label(l) => write!(f, ":{}", l),
        }
    }
}

impl fmt::Display for PatternExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternExpr::Atom(atom) => write!(f, "{}", atom),
            PatternExpr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_form() {
        let rule = RewriteRule::parse("(rule comm (add ?a ?b) => (add ?b ?a))").unwrap();
        assert_eq!(rule.name.as_str(), "comm");
        assert_eq!(rule.lhs.places.len(), 2);
        assert_eq!(rule.lhs.expr.to_string(), "(add ?a ?b)");
        assert_eq!(rule.rhs.to_string(), "(add ?b ?a)");
    }

    #[test]
    fn sized_constants() {
        let rule = RewriteRule::new("mask", "(and ?a #xff)", "?a").unwrap();
        match &rule.lhs.expr {
            PatternExpr::List(items) => match &items[2] {
                PatternExpr::Atom(Atom::Constant(c)) => {
                    assert_eq!(c.value, 0xff);
                    assert_eq!(c.width, Some(8));
                }
                other => panic!("expected constant, got {}", other),
            },
            other => panic!("expected list, got {}", other),
        }
    }

    #[test]
    fn free_rhs_place_is_rejected() {
        assert!(matches!(
            RewriteRule::new("bad", "(add ?a ?b)", "(add ?a ?c)"),
            Err(PatternError::FreePlace(_))
        ));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(matches!(
            RewriteRule::new("bad", "(frobnicate ?a)", "?a"),
            Err(PatternError::UnknownOperation(_))
        ));
    }

    #[test]
    fn labels_are_rejected() {
        assert!(matches!(
            RewriteRule::new("bad", "(add :sub ?b)", "?b"),
            Err(PatternError::Label(_))
        ));
    }

    #[test]
    fn rhs_cannot_build_payload_kinds() {
        assert!(matches!(
            RewriteRule::new("bad", "(extract ?a)", "(extract ?a)"),
            Err(PatternError::Unconstructible(_))
        ));
        assert!(matches!(
            RewriteRule::new("bad", "(add ?a ?b)", "(add ?a)"),
            Err(PatternError::RhsArity { .. })
        ));
    }
}
