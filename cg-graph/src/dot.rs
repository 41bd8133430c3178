use std::io::Write;

use crate::graph::{ConnectedGraph, Producer};

/// Render `graph` as a GraphViz digraph, with one node per op and per model input.
/// Parameters are not drawn.
pub fn graph_to_dot(mut f: impl Write, graph: &ConnectedGraph) -> std::io::Result<()> {
    writeln!(f, "digraph {{")?;
    writeln!(f)?;

    for &input in graph.model_inputs() {
        let product = &graph[input];
        writeln!(
            f,
            "p{} [label=\"{}\\n{:?}\", color=\"gray\", shape=ellipse]",
            input.index(),
            product.name(),
            product.shape()
        )?;
    }

    for op in graph.get_all_ops().values() {
        let color = match op.op_type() {
            _ if op.is_split() => "red",
            "convolution" | "linear" => "blue",
            "relu" | "add" | "batch_norm" => "green",
            "max_pool2d" | "avg_pool2d" | "adaptive_avg_pool2d" => "purple",
            "view" | "size" | "cat" => "brown",
            _ => "black",
        };

        let mut attrs = vec![("shape", format!("{:?}", op.output_shape()))];
        if let Some(module_name) = op.module_name() {
            attrs.push(("module", module_name.to_owned()));
        }
        if let Some(output_index) = graph
            .model_outputs()
            .iter()
            .position(|&p| op.outputs().contains(&p))
        {
            attrs.push(("output", format!("{}", output_index)));
        }

        let mut table = String::from("<TABLE BORDER=\"0\">\n");
        table.push_str(&format!("<TR><TD>{}</TD><TD><B>{}</B></TD></TR>\n", op.name(), op.op_type()));
        for (key, value) in attrs {
            table.push_str(&format!("<TR><TD>{}</TD><TD>{}</TD></TR>\n", key, value));
        }
        table.push_str("</TABLE>\n");

        writeln!(
            f,
            "o{} [label=<{}>, color={:?}, shape=box, width=2]",
            op.id().index(),
            table,
            color,
        )?;
    }

    writeln!(f)?;

    for op in graph.get_all_ops().values() {
        for &input in op.inputs() {
            match graph[input].producer() {
                Producer::Op(producer) => writeln!(f, "o{} -> o{}", producer.index(), op.id().index())?,
                Producer::ModelInput(_) => writeln!(f, "p{} -> o{}", input.index(), op.id().index())?,
                Producer::Parameter => {}
            }
        }
    }

    writeln!(f)?;
    writeln!(f, "}}")?;
    Ok(())
}
