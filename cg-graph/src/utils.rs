use crate::graph::{ConnectedGraph, OpId, ProductId, Producer};

/// The ops that are fed only by model inputs and parameters, looking through splits.
pub fn get_all_input_ops(graph: &ConnectedGraph) -> Vec<OpId> {
    graph
        .ordered_ops()
        .iter()
        .copied()
        .filter(|&op| !graph[op].inputs().iter().any(|&p| comes_from_op(graph, p)))
        .collect()
}

/// The ops whose outputs are not consumed by any other op.
pub fn get_all_output_ops(graph: &ConnectedGraph) -> Vec<OpId> {
    graph
        .ordered_ops()
        .iter()
        .copied()
        .filter(|&op| graph[op].outputs().iter().all(|&p| graph[p].consumers().is_empty()))
        .collect()
}

fn comes_from_op(graph: &ConnectedGraph, product: ProductId) -> bool {
    match graph[product].producer() {
        Producer::Op(op) if graph[op].is_split() => graph[op].inputs().iter().any(|&p| comes_from_op(graph, p)),
        Producer::Op(_) => true,
        Producer::ModelInput(_) | Producer::Parameter => false,
    }
}
