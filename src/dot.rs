/*!
GraphViz output for circuits and e-graphs.

Both printers implement [`Display`], so they can be written anywhere;
[`Dot::to_dot`] and [`CircuitDot::to_dot`] dump straight to a file.
The e-graph rendering clusters e-nodes by e-class.
!*/

use std::fmt::{self, Display, Formatter};
use std::io::{Result, Write};
use std::path::Path;

use crate::egraph::EGraph;
use crate::ir::Circuit;

/// A wrapper for an [`EGraph`] that can output GraphViz for
/// visualization.
pub struct Dot<'a> {
    egraph: &'a EGraph,
}

impl EGraph {
    /// Makes a GraphViz printer for this e-graph.
    pub fn dot(&self) -> Dot<'_> {
        Dot { egraph: self }
    }
}

impl<'a> Dot<'a> {
    /// Writes the rendering to a `.dot` file with the given filename.
    pub fn to_dot(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(filename)?;
        write!(file, "{}", self)?;
        Ok(())
    }
}

impl<'a> Display for Dot<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "digraph egraph {{")?;

        // set compound=true to enable edges to clusters
        writeln!(f, "  compound=true")?;
        writeln!(f, "  clusterrank=local")?;

        // define all the nodes, clustered by eclass
        for class in self.egraph.classes() {
            writeln!(f, "  subgraph cluster_{} {{", class.id)?;
            writeln!(f, "    style=dotted")?;
            for (i, node) in class.iter().enumerate() {
                writeln!(
                    f,
                    "    \"{}.{}\" [label = \"{}\"]",
                    class.id,
                    i,
                    node.kind.name()
                )?;
            }
            writeln!(f, "  }}")?;
        }

        for class in self.egraph.classes() {
            for (i_in_class, node) in class.iter().enumerate() {
                for (arg_i, child) in node.children.iter().enumerate() {
                    // clip the edge to the child's eclass with lhead
                    let child_leader = self.egraph.find(*child);
                    if child_leader == class.id {
                        writeln!(
                            f,
                            "  \"{}.{}\" -> \"{}.{}\":n [lhead = cluster_{}, label = {}]",
                            class.id, i_in_class, class.id, i_in_class, class.id, arg_i
                        )?;
                    } else {
                        writeln!(
                            f,
                            "  \"{}.{}\" -> \"{}.0\" [lhead = cluster_{}, label = {}]",
                            class.id, i_in_class, child_leader, child_leader, arg_i
                        )?;
                    }
                }
            }
        }

        write!(f, "}}")
    }
}

/// A wrapper for a [`Circuit`] that can output GraphViz.
pub struct CircuitDot<'a> {
    circuit: &'a Circuit,
}

impl Circuit {
    /// Makes a GraphViz printer for this circuit.
    pub fn dot(&self) -> CircuitDot<'_> {
        CircuitDot { circuit: self }
    }
}

impl<'a> CircuitDot<'a> {
    /// Writes the rendering to a `.dot` file with the given filename.
    pub fn to_dot(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(filename)?;
        write!(file, "{}", self)?;
        Ok(())
    }
}

impl<'a> Display for CircuitDot<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "digraph circuit {{")?;
        for op in self.circuit.ops() {
            writeln!(f, "  n{} [label = \"{}\"]", op.id, op)?;
            for (arg_i, operand) in op.operands.iter().enumerate() {
                writeln!(f, "  n{} -> n{} [label = {}]", op.id, operand, arg_i)?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::egraph::{EGraph, ENode};
    use crate::ir::{Circuit, OpKind};

    #[test]
    fn renders_clusters() {
        let mut egraph = EGraph::new();
        let x = egraph.add(ENode::leaf(OpKind::InputRegister("x".into()), 8));
        let y = egraph.add(ENode::leaf(OpKind::InputRegister("y".into()), 8));
        egraph.add(ENode::new(OpKind::Add, 8, vec![x, y]));

        let dot = egraph.dot().to_string();
        assert!(dot.starts_with("digraph egraph {"));
        assert!(dot.contains("cluster_"));
    }

    #[test]
    fn renders_circuit_edges() {
        let mut circuit = Circuit::new();
        let x = circuit
            .create(OpKind::InputRegister("x".into()), 8, &[])
            .unwrap();
        circuit.create(OpKind::Not, 8, &[x]).unwrap();

        let dot = circuit.dot().to_string();
        assert!(dot.contains("n1 -> n0"));
    }
}
