//! The decoder synthesizer.
//!
//! Walks a [`Circuit`]'s per-instruction contexts, projects their
//! decode conditions onto a tri-state bit pattern over the 15-byte
//! encoding buffer, and builds a greedy decision tree that classifies
//! an arbitrary input buffer as one of the known encodings. The result
//! can be evaluated in-process with [`Decoder::decode`] or emitted as
//! C source with the [`Display`](fmt::Display) implementation.
//!
//! The tree construction is a non-backtracking heuristic: at each step
//! it tests the bit maximizing `min(|zeros|, |ones|)` over the
//! remaining contexts, replicating don't-care contexts into both
//! branches. That keeps construction linear in the number of contexts
//! at the price of some depth over the optimum.

use std::fmt;

use log::*;
use thiserror::Error;

use crate::ir::{Circuit, KindTag, OpId, OpKind};

/// Bits in a full 15-byte instruction encoding.
pub const ENCODING_BITS: usize = 120;

/// What a context requires of one encoding bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriState {
    Zero,
    One,
    Ignore,
}

/// Errors raised while extracting decode contexts.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The circuit has no root node to find contexts under.
    #[error("circuit has no root")]
    NoRoot,
    /// A context carries no condition delimiting the encoding length.
    #[error("context {0} has no length-delimiting decode condition")]
    MissingLengthDelimiter(OpId),
    /// A context claims an encoding longer than the 15-byte maximum.
    #[error("context {0} encodes {1} bytes, longer than 15")]
    EncodingTooLong(OpId, u32),
    /// Two conditions of one context disagree about a bit.
    #[error("context {ctx}: conditions disagree at bit {bit}")]
    ConflictingBit {
        /// The offending context.
        ctx: OpId,
        /// The bit both conditions constrain.
        bit: usize,
    },
    /// A decode condition's operands are not the expected
    /// constant/extract-of-instruction-bits pair.
    #[error("node {0} is not a well-formed decode condition")]
    MalformedCondition(OpId),
}

/// A decode condition narrowed to its payload: `bits` must equal the
/// `[low, high)` slice of the instruction bits.
#[derive(Debug, Clone)]
struct DecodeSlice {
    bits: String,
    low: u32,
    high: u32,
}

/// A context extracted from one `verify_instruction` node.
#[derive(Debug, Clone)]
struct ExtractedCtx {
    name: String,
    vi: OpId,
    encoding_bytes: u32,
    conditions: Vec<DecodeSlice>,
}

impl ExtractedCtx {
    /// Projects the conditions onto 16 bytes of tri-state bits. The
    /// length delimiter contributes nothing; bits past the buffer
    /// (index 120 and up) stay ignored.
    fn pattern(&self) -> Result<[TriState; 128], DecodeError> {
        let mut pattern = [TriState::Ignore; 128];
        for condition in &self.conditions {
            if condition.high as usize == ENCODING_BITS {
                continue;
            }
            for bit in condition.low..condition.high {
                let bit = bit as usize;
                if bit >= ENCODING_BITS {
                    break;
                }
                let value = if condition.bits.as_bytes()[bit - condition.low as usize] == b'1' {
                    TriState::One
                } else {
                    TriState::Zero
                };
                if pattern[bit] != TriState::Ignore && pattern[bit] != value {
                    return Err(DecodeError::ConflictingBit { ctx: self.vi, bit });
                }
                pattern[bit] = value;
            }
        }
        Ok(pattern)
    }
}

/// One 64-bit half of a context's match check: `expected` holds the
/// required one-bits, `ignore` the don't-care mask.
#[derive(Debug, Clone, Copy)]
struct HalfCheck {
    expected: u64,
    ignore: u64,
}

impl HalfCheck {
    fn from_pattern(pattern: &[TriState]) -> Self {
        let mut expected = 0u64;
        let mut ignore = 0u64;
        for (i, tri) in pattern.iter().enumerate() {
            match tri {
                TriState::One => expected |= 1 << i,
                TriState::Ignore => ignore |= 1 << i,
                TriState::Zero => {}
            }
        }
        HalfCheck { expected, ignore }
    }

    fn all_ignore(&self) -> bool {
        self.ignore == u64::MAX
    }

    fn any_ignore(&self) -> bool {
        self.ignore != 0
    }

    /// All cared bits of `half` equal the expected bits. The don't-care
    /// bits are forced to one first, then neutralized by the inverted
    /// expected value, fusing mask and comparison.
    fn matches(&self, half: u64) -> bool {
        (half | self.ignore) ^ !self.expected == !self.ignore
    }
}

/// The emitted per-context match function, kept evaluable in-process.
#[derive(Debug, Clone)]
struct MatchFn {
    name: String,
    first: HalfCheck,
    second: HalfCheck,
    encoding_bytes: u32,
}

impl MatchFn {
    fn matches(&self, first8: u64, second8: u64) -> i32 {
        let mut ok = true;
        if !self.first.all_ignore() {
            ok &= self.first.matches(first8);
        }
        if !self.second.all_ignore() {
            ok &= self.second.matches(second8);
        }
        if ok {
            self.encoding_bytes as i32
        } else {
            0
        }
    }
}

/// The dispatch decision tree. A leaf tries its contexts in order;
/// identical-pattern contexts share a leaf, so none is unreachable.
#[derive(Debug, Clone)]
enum DecisionTree {
    Fail,
    Leaf(Vec<usize>),
    Branch {
        bit: usize,
        ones: Box<DecisionTree>,
        zeros: Box<DecisionTree>,
    },
}

/// A synthesized decoder: per-context match functions plus the
/// selection tree over them.
#[derive(Debug, Clone)]
pub struct Decoder {
    match_fns: Vec<MatchFn>,
    tree: DecisionTree,
    /// The deepest chain of bit tests in the selection tree.
    pub max_depth: usize,
}

impl Decoder {
    /// Synthesizes a decoder for every context of `circuit`. A
    /// malformed context aborts synthesis.
    pub fn synthesize(circuit: &Circuit) -> Result<Decoder, DecodeError> {
        Self::build(circuit, false)
    }

    /// Like [`synthesize`](Decoder::synthesize), but skips malformed
    /// contexts with a warning instead of aborting.
    pub fn synthesize_best_effort(circuit: &Circuit) -> Result<Decoder, DecodeError> {
        Self::build(circuit, true)
    }

    fn build(circuit: &Circuit, best_effort: bool) -> Result<Decoder, DecodeError> {
        let ctxs = extract_contexts(circuit, best_effort)?;

        let mut patterns = Vec::with_capacity(ctxs.len());
        let mut match_fns = Vec::with_capacity(ctxs.len());
        for ctx in &ctxs {
            let pattern = match ctx.pattern() {
                Ok(pattern) => pattern,
                Err(e) if best_effort => {
                    warn!("skipping context {}: {}", ctx.vi, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match_fns.push(MatchFn {
                name: ctx.name.clone(),
                first: HalfCheck::from_pattern(&pattern[..64]),
                second: HalfCheck::from_pattern(&pattern[64..]),
                encoding_bytes: ctx.encoding_bytes,
            });
            patterns.push(pattern);
        }

        let mut max_depth = 0;
        let all: Vec<usize> = (0..patterns.len()).collect();
        let tree = select(&patterns, all, Vec::new(), 0, &mut max_depth);
        info!(
            "selection tree depth {} for {} contexts",
            max_depth,
            patterns.len()
        );

        Ok(Decoder {
            match_fns,
            tree,
            max_depth,
        })
    }

    /// The number of contexts the decoder distinguishes.
    pub fn contexts(&self) -> usize {
        self.match_fns.len()
    }

    /// Indices of contexts that no leaf of the selection tree calls.
    /// Always empty for a well-formed synthesis; contexts with
    /// identical bit patterns share a leaf rather than shadowing each
    /// other.
    pub fn unreachable_contexts(&self) -> Vec<usize> {
        fn visit(tree: &DecisionTree, reached: &mut [bool]) {
            match tree {
                DecisionTree::Fail => {}
                DecisionTree::Leaf(ctxs) => {
                    for &ctx in ctxs {
                        reached[ctx] = true;
                    }
                }
                DecisionTree::Branch { ones, zeros, .. } => {
                    visit(ones, reached);
                    visit(zeros, reached);
                }
            }
        }
        let mut reached = vec![false; self.match_fns.len()];
        visit(&self.tree, &mut reached);
        reached
            .iter()
            .enumerate()
            .filter(|(_, &r)| !r)
            .map(|(i, _)| i)
            .collect()
    }

    /// Classifies `input`: the matched context's encoding length in
    /// bytes, or `-1` if no context matches.
    pub fn decode(&self, input: &[u8; 15]) -> i32 {
        let mut first = [0u8; 8];
        first.copy_from_slice(&input[..8]);
        let first8 = u64::from_le_bytes(first);

        let mut second = [0u8; 8];
        second[..7].copy_from_slice(&input[8..]);
        let second8 = u64::from_le_bytes(second);

        let mut tree = &self.tree;
        loop {
            match tree {
                DecisionTree::Fail => return -1,
                DecisionTree::Leaf(ctxs) => {
                    for &ctx in ctxs {
                        let len = self.match_fns[ctx].matches(first8, second8);
                        if len != 0 {
                            return len;
                        }
                    }
                    return -1;
                }
                DecisionTree::Branch { bit, ones, zeros } => {
                    tree = if input[bit / 8] & (1 << (bit % 8)) != 0 {
                        ones
                    } else {
                        zeros
                    };
                }
            }
        }
    }

    fn emit_match_fn(&self, f: &mut fmt::Formatter<'_>, mf: &MatchFn) -> fmt::Result {
        writeln!(
            f,
            "static int {}(uint64_t first8bytes, uint64_t second8bytes) {{",
            mf.name
        )?;
        let mut comparisons = Vec::new();
        for (check, arg) in [(mf.first, "first8bytes"), (mf.second, "second8bytes")] {
            if check.all_ignore() {
                continue;
            }
            if check.any_ignore() {
                writeln!(f, "  {arg} = {arg} | 0x{:016x}ULL;", check.ignore)?;
            }
            comparisons.push(format!(
                "(({arg} ^ 0x{:016x}ULL) == 0x{:016x}ULL)",
                !check.expected, !check.ignore
            ));
        }
        match comparisons.len() {
            0 => writeln!(f, "  return {};", mf.encoding_bytes)?,
            1 => writeln!(f, "  return {} * {};", comparisons[0], mf.encoding_bytes)?,
            _ => writeln!(
                f,
                "  return ({} && {}) * {};",
                comparisons[0], comparisons[1], mf.encoding_bytes
            )?,
        }
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn emit_tree(
        &self,
        f: &mut fmt::Formatter<'_>,
        tree: &DecisionTree,
        indent: usize,
    ) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match tree {
            DecisionTree::Fail => writeln!(f, "{pad}return -1;"),
            DecisionTree::Leaf(ctxs) => {
                for &ctx in ctxs {
                    let mf = &self.match_fns[ctx];
                    writeln!(
                        f,
                        "{pad}if ((ret = {}(first8bytes, second8bytes)) != 0) return ret;",
                        mf.name
                    )?;
                }
                writeln!(f, "{pad}return -1;")
            }
            DecisionTree::Branch { bit, ones, zeros } => {
                writeln!(f, "{pad}if (input[{}] & (1 << {})) {{", bit / 8, bit % 8)?;
                self.emit_tree(f, ones, indent + 1)?;
                writeln!(f, "{pad}}} else {{")?;
                self.emit_tree(f, zeros, indent + 1)?;
                writeln!(f, "{pad}}}")
            }
        }
    }
}

impl fmt::Display for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#include <array>")?;
        writeln!(f, "#include <stdint.h>")?;
        writeln!(f)?;
        for mf in &self.match_fns {
            self.emit_match_fn(f, mf)?;
        }

        writeln!(f, "int circuit_decode(std::array<uint8_t, 15> input) {{")?;
        for (arg, range) in [("first8bytes", 0..8usize), ("second8bytes", 8..15)] {
            writeln!(f, "  uint64_t {arg} = 0;")?;
            for i in range.clone() {
                writeln!(
                    f,
                    "  {arg} = {arg} + ((uint64_t)(input[{i}]) << {});",
                    8 * (i - range.start)
                )?;
            }
        }
        writeln!(f, "  int ret = 0;")?;
        writeln!(f, "  (void)ret;")?;
        self.emit_tree(f, &self.tree, 1)?;
        writeln!(f, "  return -1;")?;
        writeln!(f, "}}")
    }
}

/// Collects the decode conditions of every `verify_instruction`
/// context under the circuit root.
fn extract_contexts(circuit: &Circuit, best_effort: bool) -> Result<Vec<ExtractedCtx>, DecodeError> {
    let root = circuit.root().ok_or(DecodeError::NoRoot)?;

    let mut ctxs = Vec::new();
    'contexts: for &vi in &circuit.op(root).operands {
        if circuit.op(vi).kind.tag() != KindTag::VerifyInstruction {
            continue;
        }

        let mut conditions = Vec::new();
        for id in circuit.topo_order(vi) {
            let op = circuit.op(id);
            if op.kind.tag() != KindTag::DecodeCondition {
                continue;
            }
            match narrow_condition(circuit, id) {
                Ok(slice) => conditions.push(slice),
                Err(e) if best_effort => {
                    warn!("skipping context {}: {}", vi, e);
                    continue 'contexts;
                }
                Err(e) => return Err(e),
            }
        }

        let delimiter = conditions
            .iter()
            .find(|c| c.high as usize == ENCODING_BITS);
        let encoding_bytes = match delimiter {
            Some(delimiter) => delimiter.low / 8,
            None if best_effort => {
                warn!("skipping context {}: no length delimiter", vi);
                continue;
            }
            None => return Err(DecodeError::MissingLengthDelimiter(vi)),
        };
        if encoding_bytes > 15 {
            if best_effort {
                warn!("skipping context {}: {} byte encoding", vi, encoding_bytes);
                continue;
            }
            return Err(DecodeError::EncodingTooLong(vi, encoding_bytes));
        }

        ctxs.push(ExtractedCtx {
            name: format!("generated_decoder_prefix_{}", vi),
            vi,
            encoding_bytes,
            conditions,
        });
    }
    Ok(ctxs)
}

/// Narrows a decode condition to its constant bits and extract range,
/// checking that the slice really is taken from the instruction bits.
fn narrow_condition(circuit: &Circuit, id: OpId) -> Result<DecodeSlice, DecodeError> {
    let op = circuit.op(id);
    let bits = match &circuit.op(op.operands[0]).kind {
        OpKind::Constant(bits) => bits.clone(),
        _ => return Err(DecodeError::MalformedCondition(id)),
    };
    let extract = circuit.op(op.operands[1]);
    let (low, high) = match extract.kind {
        OpKind::Extract { low, high } => (low, high),
        _ => return Err(DecodeError::MalformedCondition(id)),
    };
    if circuit.op(extract.operands[0]).kind.tag() != KindTag::InputInstructionBits {
        return Err(DecodeError::MalformedCondition(id));
    }
    Ok(DecodeSlice { bits, low, high })
}

/// Builds the selection tree over `set` (indices into `patterns`),
/// greedily testing the untested bit with the best worst-case split.
fn select(
    patterns: &[[TriState; 128]],
    set: Vec<usize>,
    tested: Vec<usize>,
    depth: usize,
    max_depth: &mut usize,
) -> DecisionTree {
    if depth > *max_depth {
        *max_depth = depth;
    }
    if set.is_empty() {
        return DecisionTree::Fail;
    }
    if set.len() == 1 {
        return DecisionTree::Leaf(set);
    }

    // bit 119 is the length-delimiter position and never tested
    let mut best: Option<(usize, usize)> = None;
    for bit in 0..ENCODING_BITS - 1 {
        if tested.contains(&bit) {
            continue;
        }
        let mut zeros = 0usize;
        let mut ones = 0usize;
        for &ctx in &set {
            match patterns[ctx][bit] {
                TriState::Zero => zeros += 1,
                TriState::One => ones += 1,
                TriState::Ignore => {}
            }
        }
        let score = zeros.min(ones);
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, bit));
        }
    }

    let Some((score, bit)) = best else {
        // every bit tested and the set is still ambiguous; let the
        // leaf try each context in turn
        return DecisionTree::Leaf(set);
    };
    if score == 0 {
        // no untested bit separates these contexts; a branch would
        // keep the whole set on one side. The leaf's match functions
        // still check every cared bit.
        return DecisionTree::Leaf(set);
    }

    let mut zeros = Vec::new();
    let mut ones = Vec::new();
    for &ctx in &set {
        match patterns[ctx][bit] {
            TriState::Zero => zeros.push(ctx),
            TriState::One => ones.push(ctx),
            // don't-cares accept either value, so they go both ways
            TriState::Ignore => {
                zeros.push(ctx);
                ones.push(ctx);
            }
        }
    }

    let mut tested = tested;
    tested.push(bit);

    DecisionTree::Branch {
        bit,
        ones: Box::new(select(patterns, ones, tested.clone(), depth + 1, max_depth)),
        zeros: Box::new(select(patterns, zeros, tested, depth + 1, max_depth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::u64_to_bits;

    /// Builds a circuit with one context per (pattern byte, length).
    /// Each context constrains its first byte to the given value.
    pub(crate) fn one_byte_circuit(specs: &[(u8, u32)]) -> Circuit {
        let mut circuit = Circuit::new();
        let ibits = circuit
            .create(OpKind::InputInstructionBits, ENCODING_BITS as u32, &[])
            .unwrap();

        let mut contexts = Vec::new();
        for &(byte, len) in specs {
            let pattern = circuit
                .create(OpKind::Constant(u64_to_bits(byte as u64, 8)), 8, &[])
                .unwrap();
            let slice = circuit
                .create(OpKind::Extract { low: 0, high: 8 }, 8, &[ibits])
                .unwrap();
            let check = circuit
                .create(OpKind::DecodeCondition, 1, &[pattern, slice])
                .unwrap();

            // the length delimiter covers [8 * len, 120)
            let tail_bits = ENCODING_BITS as u32 - 8 * len;
            let zeros = circuit
                .create(OpKind::Constant("0".repeat(tail_bits as usize)), tail_bits, &[])
                .unwrap();
            let tail = circuit
                .create(
                    OpKind::Extract {
                        low: 8 * len,
                        high: ENCODING_BITS as u32,
                    },
                    tail_bits,
                    &[ibits],
                )
                .unwrap();
            let delimiter = circuit
                .create(OpKind::DecodeCondition, 1, &[zeros, tail])
                .unwrap();

            let vi = circuit
                .create(OpKind::VerifyInstruction, 1, &[check, delimiter])
                .unwrap();
            contexts.push(vi);
        }
        circuit.create(OpKind::Circuit, 1, &contexts).unwrap();
        circuit
    }

    #[test]
    fn two_context_decode() {
        crate::init_logger();
        let circuit = one_byte_circuit(&[(0x90, 1), (0xc3, 1)]);
        let decoder = Decoder::synthesize(&circuit).unwrap();
        assert_eq!(decoder.contexts(), 2);

        let buf = |b: u8| {
            let mut buf = [0u8; 15];
            buf[0] = b;
            buf
        };
        assert_eq!(decoder.decode(&buf(0x90)), 1);
        assert_eq!(decoder.decode(&buf(0xc3)), 1);
        assert_eq!(decoder.decode(&buf(0x00)), -1);
    }

    #[test]
    fn missing_delimiter_is_reported() {
        let mut circuit = Circuit::new();
        let ibits = circuit
            .create(OpKind::InputInstructionBits, ENCODING_BITS as u32, &[])
            .unwrap();
        let pattern = circuit
            .create(OpKind::Constant(u64_to_bits(0x90, 8)), 8, &[])
            .unwrap();
        let slice = circuit
            .create(OpKind::Extract { low: 0, high: 8 }, 8, &[ibits])
            .unwrap();
        let check = circuit
            .create(OpKind::DecodeCondition, 1, &[pattern, slice])
            .unwrap();
        let vi = circuit
            .create(OpKind::VerifyInstruction, 1, &[check])
            .unwrap();
        circuit.create(OpKind::Circuit, 1, &[vi]).unwrap();

        assert!(matches!(
            Decoder::synthesize(&circuit),
            Err(DecodeError::MissingLengthDelimiter(_))
        ));
        let decoder = Decoder::synthesize_best_effort(&circuit).unwrap();
        assert_eq!(decoder.contexts(), 0);
    }

    #[test]
    fn unconstrained_context_always_matches() {
        // a context whose only condition is the length delimiter
        let mut circuit = Circuit::new();
        let ibits = circuit
            .create(OpKind::InputInstructionBits, ENCODING_BITS as u32, &[])
            .unwrap();
        let zeros = circuit
            .create(OpKind::Constant("0".repeat(112)), 112, &[])
            .unwrap();
        let tail = circuit
            .create(
                OpKind::Extract {
                    low: 8,
                    high: ENCODING_BITS as u32,
                },
                112,
                &[ibits],
            )
            .unwrap();
        let delimiter = circuit
            .create(OpKind::DecodeCondition, 1, &[zeros, tail])
            .unwrap();
        let vi = circuit
            .create(OpKind::VerifyInstruction, 1, &[delimiter])
            .unwrap();
        circuit.create(OpKind::Circuit, 1, &[vi]).unwrap();

        let decoder = Decoder::synthesize(&circuit).unwrap();
        assert_eq!(decoder.decode(&[0xab; 15]), 1);
        assert_eq!(decoder.decode(&[0x00; 15]), 1);
    }

    #[test]
    fn emitted_source_shape() {
        let circuit = one_byte_circuit(&[(0x90, 1)]);
        let decoder = Decoder::synthesize(&circuit).unwrap();
        let source = decoder.to_string();
        assert!(source.contains("#include <stdint.h>"));
        assert!(source.contains("static int generated_decoder_prefix_"));
        assert!(source.contains("int circuit_decode(std::array<uint8_t, 15> input)"));
        assert!(source.contains("return -1;"));
    }
}
