use circuitry::{
    Circuit, EGraph, ENode, Extractor, KindTag, OpKind, RewriteRule, Runner, StopReason,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn commutativity_merges_both_orderings() {
    init();
    let mut circuit = Circuit::new();
    let three = circuit.constant(3, 8).unwrap();
    let x = circuit
        .create(OpKind::InputRegister("x".into()), 8, &[])
        .unwrap();
    circuit.create(OpKind::Add, 8, &[three, x]).unwrap();

    let rules = vec![RewriteRule::parse("(rule comm (add ?a ?b) => (add ?b ?a))").unwrap()];
    let runner = Runner::new().with_circuit(&circuit).run(&rules);
    assert!(matches!(runner.stop_reason, Some(StopReason::Saturated)));

    let mut egraph = runner.egraph;
    egraph.assert_congruent();

    // both orderings are now the same class
    let c = egraph.add(ENode::leaf(OpKind::Constant("11000000".into()), 8));
    let r = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
    let forward = egraph.add(ENode::new(OpKind::Add, 8, vec![c, r]));
    let backward = egraph.add(ENode::new(OpKind::Add, 8, vec![r, c]));
    assert_eq!(egraph.find(forward), egraph.find(backward));
}

#[test]
fn saturated_runs_stay_saturated() {
    init();
    let mut egraph = EGraph::new();
    let x = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
    let y = egraph.add(ENode::leaf(OpKind::InputRegister("y".into()), 8));
    egraph.add(ENode::new(OpKind::Add, 8, vec![x, y]));

    let rules = vec![
        RewriteRule::new("comm", "(add ?a ?b)", "(add ?b ?a)").unwrap(),
        RewriteRule::new("add-0", "(add ?a 0)", "?a").unwrap(),
    ];
    let runner = Runner::new().with_egraph(egraph).run(&rules);
    assert!(matches!(runner.stop_reason, Some(StopReason::Saturated)));
    let unions = runner.egraph.n_unions();

    // running again finds nothing new
    let runner = Runner::new().with_egraph(runner.egraph).run(&rules);
    assert!(matches!(runner.stop_reason, Some(StopReason::Saturated)));
    assert_eq!(runner.egraph.n_unions(), unions);
}

#[test]
fn exhausted_fuel_reports_budget_and_keeps_congruence() {
    init();
    let mut egraph = EGraph::new();
    let x = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
    let y = egraph.add(ENode::leaf(OpKind::InputRegister("y".into()), 8));
    egraph.add(ENode::new(OpKind::Add, 8, vec![x, y]));

    let rules = vec![
        RewriteRule::new("zero-intro", "?a", "(add ?a 0)").unwrap(),
        RewriteRule::new("zero-elim", "(add ?a 0)", "?a").unwrap(),
    ];
    let runner = Runner::new()
        .with_egraph(egraph)
        .with_iter_limit(2)
        .run(&rules);

    let reason = runner.stop_reason.unwrap();
    assert!(reason.is_budget_exceeded(), "stopped by {:?}", reason);

    // partial results are valid: the e-graph is congruent and the
    // zero-add identity has been learned
    runner.egraph.assert_congruent();
    let mut egraph = runner.egraph;
    let zero = egraph.add(ENode::leaf(OpKind::Constant("00000000".into()), 8));
    let x = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
    let padded = egraph.add(ENode::new(OpKind::Add, 8, vec![x, zero]));
    assert_eq!(egraph.find(x), egraph.find(padded));
}

#[test]
fn node_limit_stops_growth() {
    init();
    let mut egraph = EGraph::new();
    let x = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
    let y = egraph.add(ENode::leaf(OpKind::InputRegister("y".into()), 8));
    egraph.add(ENode::new(OpKind::Add, 8, vec![x, y]));

    let rules =
        vec![RewriteRule::new("grow", "(add ?a ?b)", "(add (not ?a) (not ?b))").unwrap()];
    let runner = Runner::new()
        .with_egraph(egraph)
        .with_node_limit(50)
        .run(&rules);
    assert!(matches!(runner.stop_reason, Some(StopReason::NodeLimit(_))));
    runner.egraph.assert_congruent();
}

#[test]
fn extraction_picks_the_rewritten_form() {
    init();
    let mut circuit = Circuit::new();
    let x = circuit
        .create(OpKind::InputRegister("x".into()), 8, &[])
        .unwrap();
    let zero = circuit.constant(0, 8).unwrap();
    let padded = circuit.create(OpKind::Add, 8, &[x, zero]).unwrap();
    let not = circuit.create(OpKind::Not, 8, &[padded]).unwrap();

    let (egraph, ids) = EGraph::from_circuit(&circuit);
    let rules = vec![RewriteRule::new("add-0", "(add ?a 0)", "?a").unwrap()];
    let runner = Runner::new().with_egraph(egraph).run(&rules);

    let extractor = Extractor::new(&runner.egraph);
    let mut lowered = Circuit::new();
    let best = extractor.find_best(ids[&not], &mut lowered).unwrap();
    // not(add(x, 0)) extracts as not(x)
    let top = lowered.op(best);
    assert_eq!(top.kind.tag(), KindTag::Not);
    assert_eq!(
        lowered.op(top.operands[0]).kind,
        OpKind::InputRegister("x".into())
    );
}
