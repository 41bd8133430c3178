use itertools::Itertools;

use cg_graph::graph::{BuildSettings, ConnectedGraph, Producer};
use cg_graph::normalize::{normalize_trace, InputRef};
use cg_graph::utils::{get_all_input_ops, get_all_output_ops};

const FAN_OUT: &str = "
# two consumers of the model input, and an op using the same tensor twice
graph(x0 : Float(1, 4)):
  input0 : Float(1, 4) = aten::relu(x0)

  input1 : Float(1, 4) = aten::sigmoid(x0)
  input2 : Float(1, 4) = aten::add(input0, input1, 1)
  input3 : Float(1, 4) = aten::add(input2, input2, 1)
  return (input3)
";

#[test]
fn fan_out_default() {
    let graph = ConnectedGraph::from_trace(FAN_OUT, None, BuildSettings::default()).unwrap();

    let names = graph.get_all_ops().keys().collect_vec();
    assert_eq!(names, vec!["relu_0", "sigmoid_1", "add_2", "add_3", "split_0", "split_1"]);
    assert_eq!(graph.split_count(), 2);

    let input = &graph[graph.model_inputs()[0]];
    assert_eq!(input.consumers(), &[graph.get_all_ops()["split_0"].id()]);

    let add = &graph.get_all_ops()["add_3"];
    let add_inputs = add.inputs().iter().map(|&p| graph[p].name()).collect_vec();
    assert_eq!(add_inputs, vec!["split_1_to_add_3", "split_1_to_add_3_1"]);

    let sources = get_all_input_ops(&graph).iter().map(|&op| graph[op].name()).collect_vec();
    assert_eq!(sources, vec!["relu_0", "sigmoid_1"]);
    let sinks = get_all_output_ops(&graph).iter().map(|&op| graph[op].name()).collect_vec();
    assert_eq!(sinks, vec!["add_3"]);
}

#[test]
fn fan_out_keep_model_inputs() {
    let settings = BuildSettings {
        split_model_inputs: false,
        ..BuildSettings::default()
    };
    let graph = ConnectedGraph::from_trace(FAN_OUT, None, settings).unwrap();

    assert_eq!(graph.split_count(), 1);
    assert_eq!(graph[graph.model_inputs()[0]].consumers().len(), 2);
    assert_eq!(graph.get_all_ops().len(), 5);
}

#[test]
fn fan_out_no_splits() {
    let settings = BuildSettings {
        insert_splits: false,
        ..BuildSettings::default()
    };
    let graph = ConnectedGraph::from_trace(FAN_OUT, None, settings).unwrap();

    assert_eq!(graph.split_count(), 0);
    assert_eq!(graph.get_all_ops().len(), 4);

    let add = graph.get_all_ops()["add_3"].id();
    let doubled = graph.product("input2").unwrap();
    assert_eq!(doubled.consumers(), &[add, add]);
    assert_eq!(doubled.producer(), Producer::Op(graph.get_all_ops()["add_2"].id()));
}

#[test]
fn parameters_are_never_split() {
    let text = "
graph(x0 : Float(1, 4)):
  w : Float(4, 4) = prim::Param(), scope: Net/Linear[fc]
  input0 : Float(1, 4) = aten::linear(x0, w, None), scope: Net/Linear[fc]
  input1 : Float(1, 4) = aten::linear(input0, w, None), scope: Net/Linear[fc]
  return (input1)
";
    let graph = ConnectedGraph::from_trace(text, None, BuildSettings::default()).unwrap();

    assert_eq!(graph.split_count(), 0);
    let weight = graph.product("w").unwrap();
    assert!(weight.is_parameter());
    assert_eq!(weight.consumers().len(), 2);

    // without a hierarchy there are no modules
    assert!(graph.ordered_ops().iter().all(|&op| graph[op].module().is_none()));
}

#[test]
fn normalize_groups() {
    let text = "
graph(x0 : Float(2, 3, 4)):
  _0 : int = aten::size(x0, 0), scope: Net
  _1 = prim::ListConstruct(_0, -1), scope: Net
  input2 : Float(2, 12) = aten::view(x0, _1), scope: Net
  input3 : Float(2, 12) = aten::reshape(input2, [annotate(List[_0, _0], int), 12]), scope: Net
  return (input3)
";
    let normalized = normalize_trace(text).unwrap();

    assert_eq!(normalized.inputs[0].shape, vec![2, 3, 4]);
    assert_eq!(normalized.records.len(), 3);

    let size = &normalized.records[0];
    assert_eq!(size.op_type, "size");
    assert!(size.output_shape.is_empty());
    assert_eq!(size.constants, vec!["0"]);

    let view = &normalized.records[1];
    assert_eq!(view.line, 5);
    assert_eq!(
        view.inputs,
        vec![InputRef::Value("x0".to_owned()), InputRef::Value("_0".to_owned())]
    );
    assert_eq!(view.constants, vec!["-1"]);
    assert_eq!(normalized.named_groups["_1"], vec!["_0", "-1"]);

    let reshape = &normalized.records[2];
    assert_eq!(reshape.inputs.len(), 3);
    assert_eq!(reshape.constants, vec!["int", "12"]);
    assert_eq!(normalized.outputs, vec!["input3"]);
    assert_eq!(normalized.return_line, 7);
}

#[test]
fn normalize_op_types() {
    let text = "
graph(x0 : Float(1, 3, 4, 4)):
  w : Float(3, 3, 1, 1) = prim::Param(), scope: Net/Conv2d[conv]
  input0 : Float(1, 3, 4, 4) = aten::_convolution(x0, w, None, [1, 1], [0, 0], [1, 1], False, [0, 0], 1), scope: Net/Conv2d[conv]
  input1 : Float(1, 3, 4, 4) = aten::relu_(input0), scope: Net/ReLU[relu]
  input2 : Float(1, 3, 4, 4) = aten::feature_dropout(input1, 0.5, False), scope: Net/Dropout2d[drop]
  return (input2)
";
    let normalized = normalize_trace(text).unwrap();

    let types = normalized.records.iter().map(|r| r.op_type.as_str()).collect_vec();
    assert_eq!(types, vec!["convolution", "relu", "feature_dropout"]);
    assert_eq!(normalized.records[0].callee, "aten::_convolution");
    assert_eq!(normalized.records[0].inputs[1], InputRef::Parameter("w".to_owned()));
    assert_eq!(normalized.records[0].constants.len(), 11);
    assert_eq!(normalized.params[0].scope.as_deref(), Some("Net/Conv2d[conv]"));
}
