use itertools::Itertools;

use cg_trace::models::{ConcatModel, ModelWithReusedNodes, MultiInput, SingleResidual};
use cg_trace::module::Module;
use cg_trace::result::TraceError;
use cg_trace::tensor::{create_rand_tensors_given_shapes, Tensor};
use cg_trace::tracer::{trace, Tracer, ViewDim};

fn trimmed_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).collect_vec()
}

#[test]
fn concat_trace() {
    let model = ConcatModel::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 8, 8], &[1, 3, 8, 8], &[1, 3, 8, 8]]);
    let raw = trace(&model, &inputs).unwrap();
    let lines = trimmed_lines(raw.text());

    assert_eq!(
        lines[0],
        "graph(x0 : Float(1, 3, 8, 8), x1 : Float(1, 3, 8, 8), x2 : Float(1, 3, 8, 8)):"
    );
    assert_eq!(
        lines[1],
        "conv1.weight : Float(6, 3, 3, 3) = prim::Param(), scope: ConcatModel/Conv2d[conv1]"
    );
    assert!(lines.contains(
        &"input0 : Float(1, 6, 8, 8) = aten::_convolution(x0, conv1.weight, None, [1, 1], [1, 1], [1, 1], False, [0, 0], 1), scope: ConcatModel/Conv2d[conv1]"
    ));
    assert!(lines.contains(&"_3 = prim::ListConstruct(input0, input1, input2), scope: ConcatModel"));
    assert!(lines.contains(&"input4 : Float(1, 14, 8, 8) = aten::cat(_3, 1), scope: ConcatModel"));
    assert!(lines.contains(&"_5 : int = aten::size(input4, 0), scope: ConcatModel"));
    assert!(lines.contains(&"input6 : Float(1, 896) = aten::view(input4, [_5, -1]), scope: ConcatModel"));
    assert_eq!(*lines.last().unwrap(), "return (input7)");
}

#[test]
fn parameters_declared_once() {
    let model = ModelWithReusedNodes::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let raw = trace(&model, &inputs).unwrap();

    let params = raw.lines().filter(|l| l.contains("prim::Param()")).count();
    // conv1 weight, 4 batchnorm tensors, fc weight and bias
    assert_eq!(params, 7);

    let relu_calls = raw
        .lines()
        .filter(|l| l.ends_with("scope: ModelWithReusedNodes/ReLU[relu1]"))
        .count();
    assert_eq!(relu_calls, 2);
}

#[test]
fn trace_ignores_devices() {
    let mut model = SingleResidual::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
    let expected = trace(&model, &inputs).unwrap();

    model.device = cg_trace::device::Device::Cuda(0);
    let cuda_inputs = inputs.iter().map(Tensor::cuda).collect_vec();
    assert_eq!(trace(&model, &cuda_inputs).unwrap(), expected);
}

#[test]
fn shape_mismatch() {
    let model = MultiInput::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32], &[1, 3, 16, 16]]);

    // the two branches no longer agree on their spatial size
    let result = trace(&model, &inputs);
    assert!(matches!(result, Err(TraceError::ShapeMismatch { ref what, .. }) if what == "aten::add"));
}

#[test]
fn missing_input() {
    let model = ConcatModel::new();
    let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 8, 8]]);
    assert_eq!(
        trace(&model, &inputs).unwrap_err(),
        TraceError::MissingInput { index: 1, count: 1 }
    );
}

#[test]
fn containers_not_callable() {
    let model = SingleResidual::new();
    let root = cg_trace::model::Model::root(&model);
    let mut tracer = Tracer::new(root);
    let x = tracer.input(&[1, 3, 32, 32]);

    assert_eq!(
        tracer.call(root, &x).unwrap_err(),
        TraceError::NotCallable {
            path: "".to_owned(),
            type_name: "SingleResidual".to_owned()
        }
    );
    assert_eq!(
        tracer.call(&Module::relu(false), &x).unwrap_err(),
        TraceError::UnknownModule {
            type_name: "ReLU".to_owned()
        }
    );
}

#[test]
fn view_validation() {
    let model = SingleResidual::new();
    let mut tracer = Tracer::new(cg_trace::model::Model::root(&model));
    let x = tracer.input(&[2, 3, 4]);

    let y = tracer.view(&x, &[ViewDim::Fixed(6), ViewDim::Fixed(-1)]).unwrap();
    assert_eq!(y.shape(), &[6, 4]);

    assert!(tracer.view(&x, &[ViewDim::Fixed(5), ViewDim::Fixed(-1)]).is_err());
    assert!(tracer.view(&x, &[ViewDim::Fixed(-1), ViewDim::Fixed(-1)]).is_err());

    let batch = tracer.size(&x, 0).unwrap();
    assert_eq!(batch.value(), 2);
    let z = tracer.view(&x, &[ViewDim::Traced(batch), ViewDim::Fixed(12)]).unwrap();
    assert_eq!(z.shape(), &[2, 12]);
}

#[test]
fn view_negative_size() {
    let model = SingleResidual::new();
    let mut tracer = Tracer::new(cg_trace::model::Model::root(&model));

    let x = tracer.input(&[2, 3, 4]);
    assert!(matches!(
        tracer.view(&x, &[ViewDim::Fixed(-2), ViewDim::Fixed(-12)]),
        Err(TraceError::ShapeMismatch { .. })
    ));

    // an empty input makes every product zero, the size itself still has to be rejected
    let empty = tracer.input(&[0, 4]);
    assert!(matches!(
        tracer.view(&empty, &[ViewDim::Fixed(-2), ViewDim::Fixed(4)]),
        Err(TraceError::ShapeMismatch { .. })
    ));
    let y = tracer.view(&empty, &[ViewDim::Fixed(0), ViewDim::Fixed(4)]).unwrap();
    assert_eq!(y.shape(), &[0, 4]);
}
