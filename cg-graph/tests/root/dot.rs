use cg_graph::dot::graph_to_dot;
use cg_graph::graph::ConnectedGraph;
use cg_trace::models::ConcatModel;
use cg_trace::tensor::create_rand_tensors_given_shapes;

#[test]
fn concat_dot() {
    let model = ConcatModel::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 8, 8], &[1, 3, 8, 8], &[1, 3, 8, 8]]);
    let graph = ConnectedGraph::build(&model, &inputs).unwrap();

    let mut buffer = vec![];
    graph_to_dot(&mut buffer, &graph).unwrap();
    let dot = String::from_utf8(buffer).unwrap();

    assert!(dot.starts_with("digraph {"));
    assert!(dot.trim_end().ends_with('}'));
    assert!(dot.contains("<B>cat</B>"));
    assert!(dot.contains("ConcatModel.conv2"));

    // one edge per tensor input, parameters excluded
    let expected_edges: usize = graph
        .get_all_ops()
        .values()
        .map(|op| op.inputs().iter().filter(|&&p| !graph[p].is_parameter()).count())
        .sum();
    assert_eq!(dot.lines().filter(|l| l.contains(" -> ")).count(), expected_edges);
    assert_eq!(expected_edges, 11);
}
