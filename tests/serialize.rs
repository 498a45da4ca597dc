use circuitry::ir::u64_to_bits;
use circuitry::{Circuit, IcmpPred, OpId, OpKind};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assert_structurally_equal(a: &Circuit, b: &Circuit) {
    assert_eq!(a.len(), b.len());
    assert_eq!(a.root(), b.root());
    for op in a.ops() {
        let other = b.op(op.id);
        assert_eq!(op.kind, other.kind, "kind of node {}", op.id);
        assert_eq!(op.width, other.width, "width of node {}", op.id);
        assert_eq!(op.operands, other.operands, "operands of node {}", op.id);
        assert_eq!(op.meta, other.meta, "metadata of node {}", op.id);
    }
}

/// A circuit mixing every payload-carrying kind, metadata included.
fn varied_circuit(groups: usize) -> Circuit {
    let mut circuit = Circuit::new();
    let ibits = circuit
        .create(OpKind::InputInstructionBits, 120, &[])
        .unwrap();

    let mut contexts = Vec::new();
    for i in 0..groups {
        let name = format!("r{}", i % 7);
        let reg = circuit
            .create(OpKind::InputRegister(name.as_str().into()), 64, &[])
            .unwrap();
        let out = circuit
            .create(OpKind::OutputRegister(name.as_str().into()), 64, &[])
            .unwrap();
        let k = circuit.constant(i as u64, 64).unwrap();

        let sum = circuit.create(OpKind::Add, 64, &[reg, k]).unwrap();
        let shifted = circuit.create(OpKind::LShr, 64, &[sum, k]).unwrap();
        let folded = circuit.create(OpKind::Xor, 64, &[shifted, reg]).unwrap();
        let advice = circuit.create(OpKind::Advice, 8, &[]).unwrap();
        let undef = circuit.create(OpKind::Undefined, 8, &[]).unwrap();
        let tag = circuit.create(OpKind::Concat, 16, &[advice, undef]).unwrap();
        let wide = circuit.create(OpKind::ZExt, 64, &[tag]).unwrap();
        let signed = circuit.create(OpKind::SExt, 64, &[tag]).unwrap();
        let mixed = circuit.create(OpKind::Or, 64, &[wide, signed]).unwrap();
        let picked = {
            let cond = circuit
                .create(OpKind::Icmp(IcmpPred::Ult), 1, &[folded, mixed])
                .unwrap();
            circuit
                .create(OpKind::Select, 64, &[cond, folded, sum])
                .unwrap()
        };
        let constraint = circuit
            .create(OpKind::RegConstraint, 1, &[picked, out])
            .unwrap();

        let opcode = circuit
            .create(OpKind::Constant(u64_to_bits(i as u64, 8)), 8, &[])
            .unwrap();
        let slice = circuit
            .create(OpKind::Extract { low: 0, high: 8 }, 8, &[ibits])
            .unwrap();
        let decode = circuit
            .create(OpKind::DecodeCondition, 1, &[opcode, slice])
            .unwrap();

        let vi = circuit
            .create(OpKind::VerifyInstruction, 1, &[constraint, decode])
            .unwrap();
        contexts.push(vi);
    }
    let root = circuit.create(OpKind::Circuit, 1, &contexts).unwrap();
    circuit.set_meta(root, "arch", "x86");
    circuit
}

#[test]
fn round_trip_preserves_everything() {
    init();
    let mut circuit = varied_circuit(90);
    assert!(circuit.len() > 1000);

    // sprinkle metadata over a few nodes
    for id in [0usize, 7, 42, circuit.len() - 1] {
        let id = OpId::from(id);
        circuit.set_meta(id, "origin", format!("node-{}", id));
        circuit.set_meta(id, "pass", "lift");
    }

    let mut bytes = Vec::new();
    circuit.serialize(&mut bytes).unwrap();
    let restored = Circuit::deserialize(&bytes[..]).unwrap();
    assert_structurally_equal(&circuit, &restored);

    // serializing the restored circuit is byte-identical
    let mut again = Vec::new();
    restored.serialize(&mut again).unwrap();
    assert_eq!(bytes, again);
}

#[test]
fn dangling_operand_is_rejected() {
    init();
    let mut circuit = Circuit::new();
    let x = circuit
        .create(OpKind::InputRegister("x".into()), 8, &[])
        .unwrap();
    circuit.create(OpKind::Not, 8, &[x]).unwrap();

    let mut bytes = Vec::new();
    circuit.serialize(&mut bytes).unwrap();

    // corrupt the not-node's operand reference to an undefined id
    let needle = bytes.len() - 4 /* root id */ - 4 /* meta count */ - 4;
    bytes[needle..needle + 4].copy_from_slice(&99u32.to_le_bytes());
    assert!(Circuit::deserialize(&bytes[..]).is_err());
}

#[test]
fn version_mismatch_is_rejected() {
    init();
    let circuit = varied_circuit(1);
    let mut bytes = Vec::new();
    circuit.serialize(&mut bytes).unwrap();
    bytes[4] = 0xff; // bump the version field
    assert!(matches!(
        Circuit::deserialize(&bytes[..]),
        Err(circuitry::SerializeError::BadVersion(_))
    ));
}
