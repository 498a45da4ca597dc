//! The equality-saturation driver.
//!
//! [`Runner`] applies a set of [`RewriteRule`]s to an [`EGraph`] until
//! saturation or until one of its fuel bounds trips. Each iteration is
//! batched for reproducibility: all matches are collected under the
//! pre-iteration e-graph state, all rewrites are applied, and
//! [`EGraph::rebuild`] runs exactly once. Limits are checked between
//! iterations, so a started iteration always completes and partial
//! results remain valid.

use instant::{Duration, Instant};
use log::*;

use crate::egraph::EGraph;
use crate::ir::Circuit;
use crate::pattern::RewriteRule;
use crate::rewrite::apply_matches;
use crate::util::{IndexMap, Symbol};
use crate::Id;

/// Why a [`Runner`] stopped.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// An iteration produced no new merges.
    Saturated,
    /// The iteration limit was hit. The data is the limit.
    IterationLimit(usize),
    /// The e-node limit was hit. The data is the e-node count.
    NodeLimit(usize),
    /// The time limit was hit. The data is the elapsed seconds.
    TimeLimit(f64),
}

impl StopReason {
    /// Whether the runner stopped because a fuel bound was exceeded
    /// rather than because the rule set saturated. The e-graph is
    /// still congruent and usable either way.
    pub fn is_budget_exceeded(&self) -> bool {
        !matches!(self, StopReason::Saturated)
    }
}

/// Statistics recorded for one iteration of the saturation loop.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Iteration {
    /// E-nodes at the start of this iteration.
    pub egraph_nodes: usize,
    /// E-classes at the start of this iteration.
    pub egraph_classes: usize,
    /// Effective applications per rule in this iteration.
    pub applied: IndexMap<Symbol, usize>,
    /// Seconds spent searching.
    pub search_time: f64,
    /// Seconds spent applying.
    pub apply_time: f64,
    /// Seconds spent rebuilding.
    pub rebuild_time: f64,
    /// Parent e-nodes repaired by the rebuild.
    pub n_repairs: usize,
    /// New merges performed by this iteration (including congruence
    /// merges discovered during rebuild).
    pub n_unions: usize,
}

/// Facilitates running rewrites over an [`EGraph`].
///
/// Configured in the builder-pattern style:
///
/// ```
/// use circuitry::{Runner, RewriteRule};
///
/// let rules = vec![RewriteRule::new("comm", "(add ?a ?b)", "(add ?b ?a)").unwrap()];
/// let runner = Runner::new().with_iter_limit(8).run(&rules);
/// assert!(runner.stop_reason.is_some());
/// ```
pub struct Runner {
    /// The e-graph being saturated.
    pub egraph: EGraph,
    /// Per-iteration statistics, in order.
    pub iterations: Vec<Iteration>,
    /// E-classes of interest registered by [`with_circuit`] or
    /// [`with_root`], in insertion order.
    ///
    /// [`with_circuit`]: Runner::with_circuit
    /// [`with_root`]: Runner::with_root
    pub roots: Vec<Id>,
    /// Why the runner stopped; `None` until [`run`] returns.
    ///
    /// [`run`]: Runner::run
    pub stop_reason: Option<StopReason>,

    iter_limit: usize,
    node_limit: usize,
    time_limit: Duration,
    start_time: Option<Instant>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with the default fuel: 30 iterations, 10,000
    /// e-nodes, 5 seconds.
    pub fn new() -> Self {
        Self {
            egraph: EGraph::new(),
            iterations: vec![],
            roots: vec![],
            stop_reason: None,
            iter_limit: 30,
            node_limit: 10_000,
            time_limit: Duration::from_secs(5),
            start_time: None,
        }
    }

    /// Sets the iteration limit. Default: 30.
    pub fn with_iter_limit(self, iter_limit: usize) -> Self {
        Self { iter_limit, ..self }
    }

    /// Sets the e-graph size limit, in e-nodes. Default: 10,000.
    pub fn with_node_limit(self, node_limit: usize) -> Self {
        Self { node_limit, ..self }
    }

    /// Sets the wall-clock limit. Default: 5 seconds.
    pub fn with_time_limit(self, time_limit: Duration) -> Self {
        Self { time_limit, ..self }
    }

    /// Replaces the e-graph.
    pub fn with_egraph(self, egraph: EGraph) -> Self {
        Self { egraph, ..self }
    }

    /// Loads `circuit` into the e-graph; the circuit root's e-class
    /// (if any) is recorded in [`roots`](Runner::roots).
    pub fn with_circuit(mut self, circuit: &Circuit) -> Self {
        let (egraph, ids) = EGraph::from_circuit(circuit);
        self.egraph = egraph;
        if let Some(root) = circuit.root() {
            self.roots.push(ids[&root]);
        }
        self
    }

    /// Records an e-class of interest.
    pub fn with_root(mut self, root: Id) -> Self {
        self.roots.push(root);
        self
    }

    /// Runs until saturation or fuel exhaustion. Afterwards
    /// [`stop_reason`](Runner::stop_reason) is guaranteed to be set.
    pub fn run(mut self, rules: &[RewriteRule]) -> Self {
        self.egraph.rebuild();
        loop {
            if let Err(stop_reason) = self.run_one(rules) {
                info!("stopping: {:?}", stop_reason);
                self.stop_reason = Some(stop_reason);
                break;
            }
        }
        self
    }

    fn run_one(&mut self, rules: &[RewriteRule]) -> Result<(), StopReason> {
        self.start_time.get_or_insert_with(Instant::now);
        self.check_limits()?;

        debug!("iteration {}", self.iterations.len());
        let egraph_nodes = self.egraph.total_number_of_nodes();
        let egraph_classes = self.egraph.number_of_classes();
        let unions_before = self.egraph.n_unions();

        let search_start = Instant::now();
        let matches: Vec<_> = rules.iter().map(|rule| rule.search(&self.egraph)).collect();
        let search_time = search_start.elapsed().as_secs_f64();

        let apply_start = Instant::now();
        let mut applied = IndexMap::default();
        for (rule, ms) in rules.iter().zip(&matches) {
            let n = apply_matches(&mut self.egraph, rule, ms);
            if n > 0 {
                *applied.entry(rule.name).or_insert(0) += n;
            }
        }
        let apply_time = apply_start.elapsed().as_secs_f64();

        let rebuild_start = Instant::now();
        let n_repairs = self.egraph.rebuild();
        let rebuild_time = rebuild_start.elapsed().as_secs_f64();

        let n_unions = self.egraph.n_unions() - unions_before;
        debug!(
            "iteration {}: {} unions, {} nodes, {} classes",
            self.iterations.len(),
            n_unions,
            self.egraph.total_number_of_nodes(),
            self.egraph.number_of_classes()
        );

        self.iterations.push(Iteration {
            egraph_nodes,
            egraph_classes,
            applied,
            search_time,
            apply_time,
            rebuild_time,
            n_repairs,
            n_unions,
        });

        if n_unions == 0 {
            Err(StopReason::Saturated)
        } else {
            Ok(())
        }
    }

    fn check_limits(&self) -> Result<(), StopReason> {
        let elapsed = self.start_time.expect("started").elapsed();
        if elapsed > self.time_limit {
            return Err(StopReason::TimeLimit(elapsed.as_secs_f64()));
        }
        let size = self.egraph.total_number_of_nodes();
        if size > self.node_limit {
            return Err(StopReason::NodeLimit(size));
        }
        if self.iterations.len() >= self.iter_limit {
            return Err(StopReason::IterationLimit(self.iterations.len()));
        }
        Ok(())
    }

    /// Prints a short report of the run to the log.
    pub fn log_report(&self) {
        let search: f64 = self.iterations.iter().map(|i| i.search_time).sum();
        let apply: f64 = self.iterations.iter().map(|i| i.apply_time).sum();
        let rebuild: f64 = self.iterations.iter().map(|i| i.rebuild_time).sum();
        info!(
            "stop reason: {:?}, iterations: {}, e-graph: {} nodes / {} classes",
            self.stop_reason,
            self.iterations.len(),
            self.egraph.total_number_of_nodes(),
            self.egraph.number_of_classes()
        );
        info!(
            "search: {:.3}s, apply: {:.3}s, rebuild: {:.3}s",
            search, apply, rebuild
        );
    }
}
