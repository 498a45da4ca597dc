use circuitry::transforms::{convert_pop_count_to_parity, strength_reduce_pop_count};
use circuitry::{Circuit, IcmpPred, KindTag, OpKind};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The parity idiom from lifted flag semantics:
/// `circuit(verify_instruction(icmp_eq(extract[0,1)(pop_count(x)), 1)))`.
fn parity_idiom() -> Circuit {
    let mut circuit = Circuit::new();
    let x = circuit
        .create(OpKind::InputRegister("x".into()), 8, &[])
        .unwrap();
    let pc = circuit.create(OpKind::PopCount, 8, &[x]).unwrap();
    let bit = circuit
        .create(OpKind::Extract { low: 0, high: 1 }, 1, &[pc])
        .unwrap();
    let one = circuit.constant(1, 1).unwrap();
    let cmp = circuit
        .create(OpKind::Icmp(IcmpPred::Eq), 1, &[bit, one])
        .unwrap();
    let vi = circuit.create(OpKind::VerifyInstruction, 1, &[cmp]).unwrap();
    circuit.create(OpKind::Circuit, 1, &[vi]).unwrap();
    circuit
}

#[test]
fn parity_idiom_collapses_to_parity_node() {
    init();
    let mut circuit = parity_idiom();

    convert_pop_count_to_parity(&mut circuit).unwrap();
    strength_reduce_pop_count(&mut circuit).unwrap();
    circuit.verify();

    let root = circuit.root().unwrap();
    let vi = circuit.op(root).operands[0];
    let top = circuit.op(circuit.op(vi).operands[0]);
    assert_eq!(top.kind.tag(), KindTag::Parity);

    let x = circuit.op(top.operands[0]);
    assert_eq!(x.kind, OpKind::InputRegister("x".into()));
    assert_eq!(x.width, 8);
}

#[test]
fn both_passes_are_idempotent() {
    init();
    let mut circuit = parity_idiom();

    assert!(convert_pop_count_to_parity(&mut circuit).unwrap());
    assert!(!convert_pop_count_to_parity(&mut circuit).unwrap());

    // after parity conversion nothing reachable still computes a
    // population count
    assert!(!strength_reduce_pop_count(&mut circuit).unwrap());

    let before = circuit.len();
    assert!(!convert_pop_count_to_parity(&mut circuit).unwrap());
    assert!(!strength_reduce_pop_count(&mut circuit).unwrap());
    assert_eq!(circuit.len(), before);
}

#[test]
fn wide_pop_count_is_lowered_reachably() {
    init();
    let mut circuit = Circuit::new();
    let x = circuit
        .create(OpKind::InputRegister("x".into()), 64, &[])
        .unwrap();
    let pc = circuit.create(OpKind::PopCount, 64, &[x]).unwrap();
    let limit = circuit.constant(32, 64).unwrap();
    let cmp = circuit
        .create(OpKind::Icmp(IcmpPred::Ult), 1, &[pc, limit])
        .unwrap();
    let vi = circuit.create(OpKind::VerifyInstruction, 1, &[cmp]).unwrap();
    circuit.create(OpKind::Circuit, 1, &[vi]).unwrap();

    assert!(strength_reduce_pop_count(&mut circuit).unwrap());
    circuit.verify();

    // six halving levels for 64 bits, and no pop_count left in the
    // reachable graph
    let root = circuit.root().unwrap();
    let reachable = circuit.topo_order(root);
    assert!(reachable
        .iter()
        .all(|&id| circuit.op(id).kind.tag() != KindTag::PopCount));

    assert!(!strength_reduce_pop_count(&mut circuit).unwrap());
}
