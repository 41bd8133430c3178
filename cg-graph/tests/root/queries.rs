use cg_graph::graph::ConnectedGraph;
use cg_graph::result::GraphError;
use cg_graph::utils::{get_all_input_ops, get_all_output_ops};
use cg_trace::models::{ModelWithReusedNodes, SingleResidual};
use cg_trace::tensor::create_rand_tensors_given_shapes;

#[test]
fn module_name_lookup() {
    let model = SingleResidual::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let graph = ConnectedGraph::build(&model, &inputs).unwrap();

    let relu = graph.get_op_from_module_name("SingleResidual.relu1").unwrap();
    assert_eq!(relu.name(), "relu_2");
    assert_eq!(relu.op_type(), "relu");

    assert_eq!(
        graph.get_op_from_module_name("SingleResidual.conv5").unwrap_err(),
        GraphError::ModuleNotFound("SingleResidual.conv5".to_owned())
    );
    // containers and the root are never invoked directly
    assert!(graph.get_op_from_module_name("SingleResidual").is_err());
    assert!(graph.get_op_from_module_name("conv1").is_err());
}

#[test]
fn reused_module_first_invocation() {
    let model = ModelWithReusedNodes::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let graph = ConnectedGraph::build(&model, &inputs).unwrap();

    let relu = graph.get_op_from_module_name("ModelWithReusedNodes.relu1").unwrap();
    assert_eq!(relu.name(), "relu_1");

    let invocations = graph
        .ordered_ops()
        .iter()
        .filter(|&&op| {
            graph[op]
                .module()
                .map_or(false, |module| std::sync::Arc::ptr_eq(module, &model.relu1))
        })
        .count();
    assert_eq!(invocations, 2);

    assert!(graph.get_op_from_module_name("ModelWithReusedNodes.relu2").is_err());
}

#[test]
fn sources_and_sinks() {
    let model = ModelWithReusedNodes::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let graph = ConnectedGraph::build(&model, &inputs).unwrap();

    let sources = get_all_input_ops(&graph);
    assert_eq!(sources.len(), 1);
    assert_eq!(graph[sources[0]].name(), "convolution_0");

    let sinks = get_all_output_ops(&graph);
    assert_eq!(sinks.len(), 1);
    assert_eq!(graph[sinks[0]].outputs(), graph.model_outputs());
}

#[test]
fn display() {
    let model = SingleResidual::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let graph = ConnectedGraph::build(&model, &inputs).unwrap();

    let text = graph.to_string();
    assert!(text.starts_with("ConnectedGraph {"));
    assert!(text.contains("inputs: [x0],"));
    assert!(text.contains("split_count: 2,"));
    assert!(text.contains("linear_16 = linear("));
    assert!(text.contains("module: SingleResidual.fc"));
    assert_eq!(text.lines().filter(|l| l.contains(" = split(")).count(), 2);
}
