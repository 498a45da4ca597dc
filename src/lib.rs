#![warn(missing_docs)]
/*!

`circuitry` lifts machine-code instruction semantics into a typed DAG of
bit-vector operations (a *circuit*), rewrites that circuit with an
e-graph based equality-saturation engine, and synthesizes an instruction
*decoder*: a decision tree that classifies a 15-byte buffer as one of
the circuit's known instruction encodings.

The crate is organized around five pieces:

- [`Circuit`] and [`Operation`]: the circuit IR ([`ir`]), with a
  binary serialization format ([`serialize`]) and raw-IR rewrite passes
  ([`transforms`]).
- [`EGraph`]: equivalence classes of circuit terms, maintained with
  hash-consing and congruence closure ([`egraph`], [`unionfind`]).
- [`RewriteRule`]: declarative `lhs => rhs` rules parsed from an
  s-expression DSL ([`pattern`]), matched ([`ematch`]) and applied
  ([`rewrite`]) by a fuel-bounded [`Runner`] ([`run`]).
- [`Decoder`]: the decoder synthesizer ([`decoder`]).
- [`Lifter`]: the interface to an external machine-code semantics
  provider ([`lift`]).

## Logging

Many parts of `circuitry` dump useful logging info using the
[`log`](https://docs.rs/log/) crate. The easiest way to see this info is
to use the [`env_logger`](https://docs.rs/env_logger/) crate in your
binary or test, and set `RUST_LOG=circuitry=info` (or `debug`, `trace`).

*/

mod util;

pub mod decoder;
pub mod dot;
pub mod egraph;
pub mod ematch;
pub mod extract;
pub mod ir;
pub mod lift;
pub mod pattern;
pub mod rewrite;
pub mod run;
pub mod serialize;
pub mod transforms;
pub mod unionfind;

/// A key to identify e-classes within an [`EGraph`].
#[derive(Clone, Copy, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Id(u32);

impl From<usize> for Id {
    fn from(n: usize) -> Id {
        Id(n as u32)
    }
}

impl From<Id> for usize {
    fn from(id: Id) -> usize {
        id.0 as usize
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub use {
    decoder::{Decoder, DecodeError},
    dot::Dot,
    egraph::{EClass, EGraph, ENode},
    extract::Extractor,
    ir::{Circuit, IcmpPred, KindTag, OpId, OpKind, Operation, TypingError},
    lift::{LiftError, Lifter},
    pattern::{Atom, ConstantAtom, MatchPattern, PatternError, PatternExpr, RewriteRule},
    rewrite::apply_matches,
    run::{Iteration, Runner, StopReason},
    serialize::SerializeError,
    unionfind::UnionFind,
    util::Symbol,
};

pub use ematch::{match_pattern, MatchResult, Subst};

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
