//! The circuit intermediate representation.
//!
//! A [`Circuit`] owns a DAG of [`Operation`]s. Every operation has a
//! stable [`OpId`] (assigned monotonically at creation, never reused),
//! an [`OpKind`], a bit-vector width, an ordered operand list, and a
//! user list kept coherent with the operand lists of its users.
//!
//! Widths are checked at creation time: each kind has a typing rule
//! relating operand widths to the result width, and [`Circuit::create`]
//! fails with a [`TypingError`] when it is violated.

use std::fmt;

use thiserror::Error;

use crate::util::{HashSet, IndexMap, Symbol};

/// A stable identifier of an [`Operation`] within its [`Circuit`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(u32);

impl From<usize> for OpId {
    fn from(n: usize) -> OpId {
        OpId(n as u32)
    }
}

impl From<OpId> for usize {
    fn from(id: OpId) -> usize {
        id.0 as usize
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Predicate of an integer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum IcmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Slt,
    Sle,
}

impl IcmpPred {
    /// All predicates, in serialization order.
    pub const ALL: [IcmpPred; 6] = [
        IcmpPred::Eq,
        IcmpPred::Ne,
        IcmpPred::Ult,
        IcmpPred::Ule,
        IcmpPred::Slt,
        IcmpPred::Sle,
    ];
}

/// The kind of an [`Operation`].
///
/// Constants carry their bits as a `String` of `'0'`/`'1'` characters,
/// least-significant bit first, so that `bits[i]` is bit `i` of the
/// value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    /// An architectural register read at instruction entry.
    InputRegister(Symbol),
    /// An architectural register written at instruction exit.
    OutputRegister(Symbol),
    /// A bit-vector literal, bits least-significant first.
    Constant(String),
    /// A nondeterministic oracle input, used as a rewrite target.
    Advice,
    /// An undefined value.
    Undefined,
    /// The raw instruction encoding stream.
    InputInstructionBits,

    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Bitwise complement.
    Not,
    /// Left shift.
    Shl,
    /// Logical right shift.
    LShr,
    /// Arithmetic right shift.
    AShr,
    /// Integer comparison, yielding a 1-bit value.
    Icmp(IcmpPred),
    /// `Select(cond, t, f)`.
    Select,
    /// Concatenation; the result width is the sum of the operands'.
    Concat,
    /// `Extract { low, high }` yields bits `[low, high)` of its operand.
    Extract {
        /// First extracted bit, inclusive.
        low: u32,
        /// One past the last extracted bit.
        high: u32,
    },
    /// Zero extension.
    ZExt,
    /// Sign extension.
    SExt,
    /// Bit parity, yielding a 1-bit value.
    Parity,
    /// Population count.
    PopCount,

    /// A boolean: an [`OpKind::Extract`] slice of the instruction bits
    /// equals an [`OpKind::Constant`].
    DecodeCondition,
    /// A per-instruction context: the conjunction of its decode and
    /// semantic conditions.
    VerifyInstruction,
    /// `RegConstraint(value, output_register)` asserts a register's
    /// output value.
    RegConstraint,
    /// The single root; its operands are the per-instruction contexts.
    Circuit,
}

/// The kind of an operation with payloads stripped, for cheap
/// kind-based filtering and serialization tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum KindTag {
    InputRegister,
    OutputRegister,
    Constant,
    Advice,
    Undefined,
    InputInstructionBits,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Not,
    Shl,
    LShr,
    AShr,
    Icmp,
    Select,
    Concat,
    Extract,
    ZExt,
    SExt,
    Parity,
    PopCount,
    DecodeCondition,
    VerifyInstruction,
    RegConstraint,
    Circuit,
}

impl OpKind {
    /// The payload-free tag of this kind.
    pub fn tag(&self) -> KindTag {
        match self {
            OpKind::InputRegister(_) => KindTag::InputRegister,
            OpKind::OutputRegister(_) => KindTag::OutputRegister,
            OpKind::Constant(_) => KindTag::Constant,
            OpKind::Advice => KindTag::Advice,
            OpKind::Undefined => KindTag::Undefined,
            OpKind::InputInstructionBits => KindTag::InputInstructionBits,
            OpKind::Add => KindTag::Add,
            OpKind::Sub => KindTag::Sub,
            OpKind::Mul => KindTag::Mul,
            OpKind::And => KindTag::And,
            OpKind::Or => KindTag::Or,
            OpKind::Xor => KindTag::Xor,
            OpKind::Not => KindTag::Not,
            OpKind::Shl => KindTag::Shl,
            OpKind::LShr => KindTag::LShr,
            OpKind::AShr => KindTag::AShr,
            OpKind::Icmp(_) => KindTag::Icmp,
            OpKind::Select => KindTag::Select,
            OpKind::Concat => KindTag::Concat,
            OpKind::Extract { .. } => KindTag::Extract,
            OpKind::ZExt => KindTag::ZExt,
            OpKind::SExt => KindTag::SExt,
            OpKind::Parity => KindTag::Parity,
            OpKind::PopCount => KindTag::PopCount,
            OpKind::DecodeCondition => KindTag::DecodeCondition,
            OpKind::VerifyInstruction => KindTag::VerifyInstruction,
            OpKind::RegConstraint => KindTag::RegConstraint,
            OpKind::Circuit => KindTag::Circuit,
        }
    }

    /// The name this kind goes by in the rewrite-rule DSL and in
    /// printed output. Comparison predicates get per-predicate names.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::InputRegister(_) => "input_register",
            OpKind::OutputRegister(_) => "output_register",
            OpKind::Constant(_) => "constant",
            OpKind::Advice => "advice",
            OpKind::Undefined => "undefined",
            OpKind::InputInstructionBits => "input_instruction_bits",
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Not => "not",
            OpKind::Shl => "shl",
            OpKind::LShr => "lshr",
            OpKind::AShr => "ashr",
            OpKind::Icmp(IcmpPred::Eq) => "icmp_eq",
            OpKind::Icmp(IcmpPred::Ne) => "icmp_ne",
            OpKind::Icmp(IcmpPred::Ult) => "icmp_ult",
            OpKind::Icmp(IcmpPred::Ule) => "icmp_ule",
            OpKind::Icmp(IcmpPred::Slt) => "icmp_slt",
            OpKind::Icmp(IcmpPred::Sle) => "icmp_sle",
            OpKind::Select => "select",
            OpKind::Concat => "concat",
            OpKind::Extract { .. } => "extract",
            OpKind::ZExt => "zext",
            OpKind::SExt => "sext",
            OpKind::Parity => "parity",
            OpKind::PopCount => "pop_count",
            OpKind::DecodeCondition => "decode_condition",
            OpKind::VerifyInstruction => "verify_instruction",
            OpKind::RegConstraint => "reg_constraint",
            OpKind::Circuit => "circuit",
        }
    }

    /// Looks up a payload-free kind by its DSL name. Kinds that carry a
    /// payload (registers, constants, extracts) cannot be named this
    /// way; neither can the structural kinds.
    pub fn from_rule_name(name: &str) -> Option<OpKind> {
        let kind = match name {
            "add" => OpKind::Add,
            "sub" => OpKind::Sub,
            "mul" => OpKind::Mul,
            "and" => OpKind::And,
            "or" => OpKind::Or,
            "xor" => OpKind::Xor,
            "not" => OpKind::Not,
            "shl" => OpKind::Shl,
            "lshr" => OpKind::LShr,
            "ashr" => OpKind::AShr,
            "icmp_eq" => OpKind::Icmp(IcmpPred::Eq),
            "icmp_ne" => OpKind::Icmp(IcmpPred::Ne),
            "icmp_ult" => OpKind::Icmp(IcmpPred::Ult),
            "icmp_ule" => OpKind::Icmp(IcmpPred::Ule),
            "icmp_slt" => OpKind::Icmp(IcmpPred::Slt),
            "icmp_sle" => OpKind::Icmp(IcmpPred::Sle),
            "select" => OpKind::Select,
            "concat" => OpKind::Concat,
            "parity" => OpKind::Parity,
            "pop_count" => OpKind::PopCount,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether `name` names any operation kind, payload-carrying or
    /// not. Used to validate left-hand sides of rewrite rules, which
    /// match by name only.
    pub fn is_known_name(name: &str) -> bool {
        OpKind::from_rule_name(name).is_some()
            || matches!(
                name,
                "input_register"
                    | "output_register"
                    | "constant"
                    | "advice"
                    | "undefined"
                    | "input_instruction_bits"
                    | "extract"
                    | "zext"
                    | "sext"
                    | "decode_condition"
                    | "verify_instruction"
                    | "reg_constraint"
                    | "circuit"
            )
    }
}

/// Converts a least-significant-first bit string to a `u64`, if it fits.
pub fn bits_to_u64(bits: &str) -> Option<u64> {
    let mut value = 0u64;
    for (i, c) in bits.chars().enumerate() {
        match c {
            '0' => {}
            '1' => {
                if i >= 64 {
                    return None;
                }
                value |= 1 << i;
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Renders the low `width` bits of `value` as a least-significant-first
/// bit string.
pub fn u64_to_bits(value: u64, width: u32) -> String {
    (0..width)
        .map(|i| {
            if i < 64 && (value >> i) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

/// Errors raised by [`Circuit::create`] when operand widths or arities
/// violate a kind's typing rule.
#[derive(Debug, Error)]
pub enum TypingError {
    /// Wrong number of operands for the kind.
    #[error("{kind} expects {expected} operands, got {got}")]
    Arity {
        /// Kind name.
        kind: &'static str,
        /// Expected operand count (rendered, may be a range).
        expected: String,
        /// Actual operand count.
        got: usize,
    },
    /// An operand width does not fit the kind's rule.
    #[error("{kind}: operand {index} has width {got}, expected {expected}")]
    OperandWidth {
        /// Kind name.
        kind: &'static str,
        /// Operand index.
        index: usize,
        /// Expected operand width.
        expected: u32,
        /// Actual operand width.
        got: u32,
    },
    /// The declared result width does not follow from the operands.
    #[error("{kind}: result width {got} does not match required {expected}")]
    ResultWidth {
        /// Kind name.
        kind: &'static str,
        /// Width required by the typing rule.
        expected: u32,
        /// Declared width.
        got: u32,
    },
    /// A constant's bit string length differs from its width.
    #[error("constant of width {width} carries {len} bits")]
    ConstantBits {
        /// Declared width.
        width: u32,
        /// Length of the bit string.
        len: usize,
    },
    /// A constant's bit string contains characters other than 0/1.
    #[error("constant bits {0:?} are not a 0/1 string")]
    ConstantDigits(String),
    /// An extract range is empty or exceeds the operand width.
    #[error("extract [{low}, {high}) of a {operand_width}-bit operand")]
    ExtractRange {
        /// Low bit, inclusive.
        low: u32,
        /// High bit, exclusive.
        high: u32,
        /// Width of the extracted operand.
        operand_width: u32,
    },
    /// An operand has the wrong kind for a structural operation.
    #[error("{kind}: operand {index} must be a {expected}")]
    OperandKind {
        /// Kind name.
        kind: &'static str,
        /// Operand index.
        index: usize,
        /// Expected operand kind name.
        expected: &'static str,
    },
    /// A second `Circuit` root was created.
    #[error("circuit already has a root (node {0})")]
    DuplicateRoot(OpId),
}

/// One node of the circuit DAG.
#[derive(Debug, Clone)]
pub struct Operation {
    /// This operation's id.
    pub id: OpId,
    /// This operation's kind.
    pub kind: OpKind,
    /// Semantic width of the produced bit-vector.
    pub width: u32,
    /// Ordered operand references.
    pub operands: Vec<OpId>,
    /// Back-references: every operation listing this one as an operand,
    /// with multiplicity. The exact inverse of the operand lists.
    pub users: Vec<OpId>,
    /// String-keyed metadata.
    pub meta: IndexMap<String, String>,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::InputRegister(name) | OpKind::OutputRegister(name) => {
                write!(f, "{}:{}:{}", self.kind.name(), name, self.width)
            }
            OpKind::Constant(bits) => write!(f, "constant:{}:{}", bits, self.width),
            OpKind::Extract { low, high } => write!(f, "extract:{}:{}", low, high),
            _ => write!(f, "{}:{}", self.kind.name(), self.width),
        }
    }
}

/// A circuit: the exclusive owner of a DAG of [`Operation`]s, rooted at
/// a single node of kind [`OpKind::Circuit`].
#[derive(Debug, Default, Clone)]
pub struct Circuit {
    slots: Vec<Option<Operation>>,
    root: Option<OpId>,
}

impl Circuit {
    /// Creates an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root node, if a node of kind [`OpKind::Circuit`] was created.
    pub fn root(&self) -> Option<OpId> {
        self.root
    }

    /// The number of ids handed out (including orphaned nodes).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the circuit has no nodes.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Looks up a node. Panics on an id this circuit never created;
    /// that is a programmer error, not a recoverable condition.
    pub fn op(&self, id: OpId) -> &Operation {
        self.slots[usize::from(id)]
            .as_ref()
            .unwrap_or_else(|| panic!("no operation with id {}", id))
    }

    fn op_mut(&mut self, id: OpId) -> &mut Operation {
        self.slots[usize::from(id)]
            .as_mut()
            .unwrap_or_else(|| panic!("no operation with id {}", id))
    }

    /// Iterates over all nodes in id order.
    pub fn ops(&self) -> impl Iterator<Item = &Operation> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Iterates over all nodes of the given kind, in id order.
    pub fn ops_of(&self, tag: KindTag) -> impl Iterator<Item = &Operation> {
        self.ops().filter(move |op| op.kind.tag() == tag)
    }

    /// Creates a node, wiring user back-references, after checking the
    /// kind's typing rule against the operand widths.
    pub fn create(
        &mut self,
        kind: OpKind,
        width: u32,
        operands: &[OpId],
    ) -> Result<OpId, TypingError> {
        self.check_typing(&kind, width, operands)?;

        if kind.tag() == KindTag::Circuit {
            if let Some(root) = self.root {
                return Err(TypingError::DuplicateRoot(root));
            }
        }

        let id = OpId::from(self.slots.len());
        for &operand in operands {
            self.op_mut(operand).users.push(id);
        }
        let is_root = kind.tag() == KindTag::Circuit;
        self.slots.push(Some(Operation {
            id,
            kind,
            width,
            operands: operands.to_vec(),
            users: Vec::new(),
            meta: IndexMap::default(),
        }));
        if is_root {
            self.root = Some(id);
        }
        Ok(id)
    }

    /// Creates a constant node from a value and width.
    pub fn constant(&mut self, value: u64, width: u32) -> Result<OpId, TypingError> {
        self.create(OpKind::Constant(u64_to_bits(value, width)), width, &[])
    }

    /// Inserts a node under an explicit id, used by deserialization.
    /// The slot must be vacant and all operands already present.
    pub(crate) fn insert_with_id(
        &mut self,
        id: OpId,
        kind: OpKind,
        width: u32,
        operands: Vec<OpId>,
        meta: IndexMap<String, String>,
    ) -> Result<(), TypingError> {
        self.check_typing(&kind, width, &operands)?;
        if kind.tag() == KindTag::Circuit {
            if let Some(root) = self.root {
                return Err(TypingError::DuplicateRoot(root));
            }
        }

        let index = usize::from(id);
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        assert!(self.slots[index].is_none(), "id {} created twice", id);

        for &operand in &operands {
            self.op_mut(operand).users.push(id);
        }
        let is_root = kind.tag() == KindTag::Circuit;
        self.slots[index] = Some(Operation {
            id,
            kind,
            width,
            operands,
            users: Vec::new(),
            meta,
        });
        if is_root {
            self.root = Some(id);
        }
        Ok(())
    }

    /// Attaches a metadata entry to a node, replacing any previous
    /// value under the same key.
    pub fn set_meta(&mut self, id: OpId, key: impl Into<String>, value: impl Into<String>) {
        self.op_mut(id).meta.insert(key.into(), value.into());
    }

    /// Rewrites every use of `old` to `new`; `old` keeps its operands
    /// but loses all users.
    pub fn replace_all_uses(&mut self, old: OpId, new: OpId) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.op_mut(old).users);
        for &user in &users {
            for operand in &mut self.op_mut(user).operands {
                if *operand == old {
                    *operand = new;
                }
            }
        }
        self.op_mut(new).users.extend(users);
    }

    /// Depth-first walk from `from`, visiting each reachable node once,
    /// operands before users (postorder).
    pub fn traverse(&self, from: OpId, f: &mut impl FnMut(&Operation)) {
        for id in self.topo_order(from) {
            f(self.op(id));
        }
    }

    /// Reachable nodes of `from` in postorder: every operand precedes
    /// its users.
    pub fn topo_order(&self, from: OpId) -> Vec<OpId> {
        let mut order = Vec::new();
        let mut visited = HashSet::default();
        // (id, operands_done)
        let mut stack = vec![(from, false)];
        while let Some((id, operands_done)) = stack.pop() {
            if operands_done {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for &operand in self.op(id).operands.iter().rev() {
                stack.push((operand, false));
            }
        }
        order
    }

    /// Checks the users/operands coherence invariant, panicking with
    /// the offending node id on desync. Inconsistency here is a bug in
    /// the pass that produced it.
    pub fn verify(&self) {
        for op in self.ops() {
            for &operand in &op.operands {
                let uses = self.op(operand).users.iter().filter(|&&u| u == op.id).count();
                let listed = op.operands.iter().filter(|&&o| o == operand).count();
                assert!(
                    uses == listed,
                    "node {}: operand {} lists {} uses, expected {}",
                    op.id,
                    operand,
                    uses,
                    listed
                );
            }
            for &user in &op.users {
                assert!(
                    self.op(user).operands.contains(&op.id),
                    "node {}: stale user {}",
                    op.id,
                    user
                );
            }
        }
    }

    fn check_typing(
        &self,
        kind: &OpKind,
        width: u32,
        operands: &[OpId],
    ) -> Result<(), TypingError> {
        let name = kind.name();
        let w = |i: usize| self.op(operands[i]).width;

        let arity = |expected: usize| -> Result<(), TypingError> {
            if operands.len() != expected {
                return Err(TypingError::Arity {
                    kind: name,
                    expected: expected.to_string(),
                    got: operands.len(),
                });
            }
            Ok(())
        };
        let result_width = |expected: u32| -> Result<(), TypingError> {
            if width != expected {
                return Err(TypingError::ResultWidth {
                    kind: name,
                    expected,
                    got: width,
                });
            }
            Ok(())
        };
        let operand_width = |i: usize, expected: u32| -> Result<(), TypingError> {
            if w(i) != expected {
                return Err(TypingError::OperandWidth {
                    kind: name,
                    index: i,
                    expected,
                    got: w(i),
                });
            }
            Ok(())
        };

        match kind {
            OpKind::InputRegister(_)
            | OpKind::OutputRegister(_)
            | OpKind::Advice
            | OpKind::Undefined
            | OpKind::InputInstructionBits => arity(0),

            OpKind::Constant(bits) => {
                arity(0)?;
                if bits.chars().any(|c| c != '0' && c != '1') {
                    return Err(TypingError::ConstantDigits(bits.clone()));
                }
                if bits.len() != width as usize {
                    return Err(TypingError::ConstantBits {
                        width,
                        len: bits.len(),
                    });
                }
                Ok(())
            }

            OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::And
            | OpKind::Or
            | OpKind::Xor
            | OpKind::Shl
            | OpKind::LShr
            | OpKind::AShr => {
                arity(2)?;
                operand_width(0, width)?;
                operand_width(1, width)
            }

            OpKind::Not => {
                arity(1)?;
                operand_width(0, width)
            }

            OpKind::Icmp(_) => {
                arity(2)?;
                operand_width(1, w(0))?;
                result_width(1)
            }

            OpKind::Select => {
                arity(3)?;
                operand_width(0, 1)?;
                operand_width(1, width)?;
                operand_width(2, width)
            }

            OpKind::Concat => {
                if operands.is_empty() {
                    return Err(TypingError::Arity {
                        kind: name,
                        expected: "1 or more".into(),
                        got: 0,
                    });
                }
                let sum: u32 = (0..operands.len()).map(w).sum();
                result_width(sum)
            }

            OpKind::Extract { low, high } => {
                arity(1)?;
                if low >= high || *high > w(0) {
                    return Err(TypingError::ExtractRange {
                        low: *low,
                        high: *high,
                        operand_width: w(0),
                    });
                }
                result_width(high - low)
            }

            OpKind::ZExt | OpKind::SExt => {
                arity(1)?;
                if width < w(0) {
                    return Err(TypingError::ResultWidth {
                        kind: name,
                        expected: w(0),
                        got: width,
                    });
                }
                Ok(())
            }

            OpKind::Parity => {
                arity(1)?;
                result_width(1)
            }

            OpKind::PopCount => {
                arity(1)?;
                result_width(w(0))
            }

            OpKind::DecodeCondition => {
                arity(2)?;
                if self.op(operands[0]).kind.tag() != KindTag::Constant {
                    return Err(TypingError::OperandKind {
                        kind: name,
                        index: 0,
                        expected: "constant",
                    });
                }
                if self.op(operands[1]).kind.tag() != KindTag::Extract {
                    return Err(TypingError::OperandKind {
                        kind: name,
                        index: 1,
                        expected: "extract",
                    });
                }
                operand_width(1, w(0))?;
                result_width(1)
            }

            OpKind::VerifyInstruction => {
                for i in 0..operands.len() {
                    operand_width(i, 1)?;
                }
                result_width(1)
            }

            OpKind::RegConstraint => {
                arity(2)?;
                if self.op(operands[1]).kind.tag() != KindTag::OutputRegister {
                    return Err(TypingError::OperandKind {
                        kind: name,
                        index: 1,
                        expected: "output_register",
                    });
                }
                operand_width(1, w(0))?;
                result_width(1)
            }

            OpKind::Circuit => {
                for i in 0..operands.len() {
                    operand_width(i, 1)?;
                }
                result_width(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_rules() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        let y = circuit
            .create(OpKind::InputRegister("y".into()), 16, &[])
            .unwrap();

        assert!(circuit.create(OpKind::Add, 8, &[x, x]).is_ok());
        assert!(circuit.create(OpKind::Add, 8, &[x, y]).is_err());
        assert!(circuit.create(OpKind::Add, 16, &[x, x]).is_err());
        assert!(circuit.create(OpKind::Concat, 24, &[x, y]).is_ok());
        assert!(circuit
            .create(OpKind::Extract { low: 0, high: 9 }, 9, &[x])
            .is_err());
        assert!(circuit
            .create(OpKind::Extract { low: 2, high: 5 }, 3, &[x])
            .is_ok());
        assert!(circuit.create(OpKind::Icmp(IcmpPred::Eq), 1, &[x, x]).is_ok());
        assert!(circuit.constant(3, 2).is_ok());
        assert!(circuit
            .create(OpKind::Constant("01".into()), 3, &[])
            .is_err());
    }

    #[test]
    fn users_track_operands() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        let double = circuit.create(OpKind::Add, 8, &[x, x]).unwrap();
        assert_eq!(circuit.op(x).users, vec![double, double]);
        circuit.verify();

        let y = circuit
            .create(OpKind::InputRegister("y".into()), 8, &[])
            .unwrap();
        circuit.replace_all_uses(x, y);
        assert!(circuit.op(x).users.is_empty());
        assert_eq!(circuit.op(double).operands, vec![y, y]);
        circuit.verify();
    }

    #[test]
    fn topo_order_is_postorder() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        let one = circuit.constant(1, 8).unwrap();
        let sum = circuit.create(OpKind::Add, 8, &[x, one]).unwrap();
        let order = circuit.topo_order(sum);
        assert_eq!(order.last(), Some(&sum));
        let pos =
            |id: OpId| order.iter().position(|&o| o == id).unwrap();
        assert!(pos(x) < pos(sum));
        assert!(pos(one) < pos(sum));
    }
}
