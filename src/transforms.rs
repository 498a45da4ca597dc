//! Rewrite passes over the raw circuit IR.
//!
//! These run directly on the [`Circuit`], without an e-graph: they
//! match syntactically by kind and operand shape, build replacement
//! nodes, and redirect users. Only nodes reachable from the circuit
//! root are considered, so both passes are idempotent: subtrees
//! orphaned by a replacement never match again.

use log::info;

use crate::ir::{bits_to_u64, Circuit, IcmpPred, KindTag, OpId, OpKind, TypingError};
use crate::util::HashSet;

fn live_set(circuit: &Circuit) -> HashSet<OpId> {
    match circuit.root() {
        Some(root) => circuit.topo_order(root).into_iter().collect(),
        None => circuit.ops().map(|op| op.id).collect(),
    }
}

fn is_constant_one(circuit: &Circuit, id: OpId) -> bool {
    match &circuit.op(id).kind {
        OpKind::Constant(bits) => bits_to_u64(bits) == Some(1),
        _ => false,
    }
}

fn pop_count_operand(circuit: &Circuit, id: OpId) -> Option<OpId> {
    let op = circuit.op(id);
    if op.kind.tag() == KindTag::PopCount {
        Some(op.operands[0])
    } else {
        None
    }
}

/// The operand `x` when `id` computes the low bit of `pop_count(x)`:
/// either `and(pop_count(x), 1)` (any operand order) or
/// `extract[0,1)(pop_count(x))`.
fn parity_value(circuit: &Circuit, id: OpId) -> Option<OpId> {
    let op = circuit.op(id);
    match op.kind {
        OpKind::And => {
            let [lhs, rhs] = [op.operands[0], op.operands[1]];
            if is_constant_one(circuit, rhs) {
                pop_count_operand(circuit, lhs)
            } else if is_constant_one(circuit, lhs) {
                pop_count_operand(circuit, rhs)
            } else {
                None
            }
        }
        OpKind::Extract { low: 0, high: 1 } => pop_count_operand(circuit, op.operands[0]),
        _ => None,
    }
}

/// Finds uses of population count that actually compute the parity of
/// some bits, and replaces the computation with a [`OpKind::Parity`]
/// node.
///
/// Recognized shapes, all producing a 1-bit result:
/// `icmp_eq(p, 1)` where `p` is `and(pop_count(x), 1)` or
/// `extract[0,1)(pop_count(x))`, and a standalone
/// `extract[0,1)(pop_count(x))`.
///
/// Returns whether anything changed.
pub fn convert_pop_count_to_parity(circuit: &mut Circuit) -> Result<bool, TypingError> {
    let live = live_set(circuit);
    let mut comparisons: Vec<(OpId, OpId, OpId)> = Vec::new();
    let mut extracts: Vec<(OpId, OpId)> = Vec::new();

    for op in circuit.ops().filter(|op| live.contains(&op.id)) {
        match &op.kind {
            OpKind::Icmp(IcmpPred::Eq) => {
                let [a, b] = [op.operands[0], op.operands[1]];
                let inner = if is_constant_one(circuit, b) {
                    parity_value(circuit, a).map(|x| (a, x))
                } else if is_constant_one(circuit, a) {
                    parity_value(circuit, b).map(|x| (b, x))
                } else {
                    None
                };
                if let Some((p, x)) = inner {
                    comparisons.push((op.id, p, x));
                }
            }
            OpKind::Extract { low: 0, high: 1 } => {
                if let Some(x) = pop_count_operand(circuit, op.operands[0]) {
                    extracts.push((op.id, x));
                }
            }
            _ => {}
        }
    }

    // the low-bit node inside a rewritten comparison does not get its
    // own parity node unless something else still uses it
    let consumed: HashSet<OpId> = comparisons.iter().map(|&(_, p, _)| p).collect();
    let mut replacements: Vec<(OpId, OpId)> =
        comparisons.into_iter().map(|(old, _, x)| (old, x)).collect();
    for (old, x) in extracts {
        if consumed.contains(&old) && circuit.op(old).users.len() == 1 {
            continue;
        }
        replacements.push((old, x));
    }

    for &(old, x) in &replacements {
        let parity = circuit.create(OpKind::Parity, 1, &[x])?;
        circuit.replace_all_uses(old, parity);
    }

    if !replacements.is_empty() {
        info!("converted {} pop_count uses to parity", replacements.len());
    }
    Ok(!replacements.is_empty())
}

/// Lowers every reachable [`OpKind::PopCount`] to the balanced tree of
/// half-adder shifts: at level `k`, `v = (v & m_k) + ((v >> 2^k) & m_k)`
/// with `m_k` the alternating mask of `2^k`-bit groups. Operands whose
/// width is not a power of two are zero-extended first and the count is
/// extracted back down.
///
/// Returns whether anything changed.
pub fn strength_reduce_pop_count(circuit: &mut Circuit) -> Result<bool, TypingError> {
    let live = live_set(circuit);
    let pop_counts: Vec<(OpId, OpId, u32)> = circuit
        .ops_of(KindTag::PopCount)
        .filter(|op| live.contains(&op.id))
        .map(|op| (op.id, op.operands[0], op.width))
        .collect();

    for &(pc, x, n) in &pop_counts {
        if n == 1 {
            circuit.replace_all_uses(pc, x);
            continue;
        }

        let w = n.next_power_of_two();
        let mut v = if w > n {
            circuit.create(OpKind::ZExt, w, &[x])?
        } else {
            x
        };

        for k in 0..w.trailing_zeros() {
            let group = 1u32 << k;
            let mask_bits: String = (0..w)
                .map(|i| if (i / group) % 2 == 0 { '1' } else { '0' })
                .collect();
            let mask = circuit.create(OpKind::Constant(mask_bits), w, &[])?;
            let shift = circuit.constant(group as u64, w)?;

            let low_half = circuit.create(OpKind::And, w, &[v, mask])?;
            let shifted = circuit.create(OpKind::LShr, w, &[v, shift])?;
            let high_half = circuit.create(OpKind::And, w, &[shifted, mask])?;
            v = circuit.create(OpKind::Add, w, &[low_half, high_half])?;
        }

        if w > n {
            v = circuit.create(OpKind::Extract { low: 0, high: n }, n, &[v])?;
        }
        circuit.replace_all_uses(pc, v);
    }

    if !pop_counts.is_empty() {
        info!("strength-reduced {} pop_count nodes", pop_counts.len());
    }
    Ok(!pop_counts.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_shapes() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        let pc = circuit.create(OpKind::PopCount, 8, &[x]).unwrap();
        let one8 = circuit.constant(1, 8).unwrap();
        let and = circuit.create(OpKind::And, 8, &[pc, one8]).unwrap();
        let cmp = circuit
            .create(OpKind::Icmp(IcmpPred::Eq), 1, &[and, one8])
            .unwrap();
        let bit = circuit
            .create(OpKind::Extract { low: 0, high: 1 }, 1, &[pc])
            .unwrap();
        let all = circuit
            .create(OpKind::VerifyInstruction, 1, &[cmp, bit])
            .unwrap();
        circuit.create(OpKind::Circuit, 1, &[all]).unwrap();

        assert!(convert_pop_count_to_parity(&mut circuit).unwrap());
        let conds = circuit.op(all).operands.clone();
        for cond in conds {
            let op = circuit.op(cond);
            assert_eq!(op.kind.tag(), KindTag::Parity);
            assert_eq!(op.operands, vec![x]);
        }
        circuit.verify();

        // idempotent
        assert!(!convert_pop_count_to_parity(&mut circuit).unwrap());
    }

    #[test]
    fn strength_reduce_levels() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        let pc = circuit.create(OpKind::PopCount, 8, &[x]).unwrap();
        let one8 = circuit.constant(1, 8).unwrap();
        let cmp = circuit
            .create(OpKind::Icmp(IcmpPred::Eq), 1, &[pc, one8])
            .unwrap();
        let all = circuit.create(OpKind::VerifyInstruction, 1, &[cmp]).unwrap();
        circuit.create(OpKind::Circuit, 1, &[all]).unwrap();

        assert!(strength_reduce_pop_count(&mut circuit).unwrap());
        let lowered = circuit.op(cmp).operands[0];
        // 8 bits is a power of two: three add levels, no widening
        assert_eq!(circuit.op(lowered).kind.tag(), KindTag::Add);
        assert!(circuit.op(pc).users.is_empty());
        circuit.verify();

        assert!(!strength_reduce_pop_count(&mut circuit).unwrap());
    }

    #[test]
    fn one_bit_pop_count_is_identity() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 1, &[])
            .unwrap();
        let pc = circuit.create(OpKind::PopCount, 1, &[x]).unwrap();
        let all = circuit.create(OpKind::VerifyInstruction, 1, &[pc]).unwrap();
        circuit.create(OpKind::Circuit, 1, &[all]).unwrap();

        assert!(strength_reduce_pop_count(&mut circuit).unwrap());
        assert_eq!(circuit.op(all).operands, vec![x]);
    }
}
