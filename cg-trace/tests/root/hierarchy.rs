use std::sync::Arc;

use itertools::Itertools;

use cg_trace::device::Device;
use cg_trace::models::ModuleListModel;
use cg_trace::module::Module;
use cg_trace::tensor::{create_rand_tensors_given_shapes, Tensor};

#[test]
fn module_list_paths() {
    let model = ModuleListModel::new();
    let root = cg_trace::model::Model::root(&model);

    let paths = root.named_modules().into_iter().map(|(path, _)| path).collect_vec();
    assert_eq!(
        paths,
        vec![
            "", "mod_list", "mod_list.0", "mod_list.1", "mod_list.2", "mod_list.3", "mod_list.4", "mod_list.5",
            "seq_list", "seq_list.0", "seq_list.1", "seq_list.2", "fc"
        ]
    );
    assert!(Arc::ptr_eq(root.child("fc").unwrap(), &model.fc));
}

#[test]
fn shared_instance_listed_once() {
    let relu = Module::relu(true);
    let root = Module::custom("Net", vec![("a", relu.clone()), ("b", relu.clone())]);

    let named = root.named_modules();
    assert_eq!(named.len(), 2);
    assert_eq!(named[1].0, "a");
    assert!(Arc::ptr_eq(&named[1].1, &relu));
}

#[test]
fn module_identity() {
    let a = Module::relu(true);
    let b = Module::relu(true);
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
    assert_eq!(a.kind(), b.kind());
}

#[test]
fn parameters() {
    let conv = Module::conv2d(3, 8, 3, 1, 1, false);
    assert_eq!(conv.parameters(), vec![("weight", vec![8, 3, 3, 3])]);

    let fc = Module::linear(10, 2);
    assert_eq!(fc.parameters(), vec![("weight", vec![2, 10]), ("bias", vec![2])]);

    assert!(Module::relu(false).parameters().is_empty());
}

#[test]
fn random_tensors() {
    let tensors = create_rand_tensors_given_shapes(&[&[1, 3, 4, 4], &[2, 5]]);
    assert_eq!(tensors.len(), 2);
    assert_eq!(tensors[0].shape(), &[1, 3, 4, 4]);
    assert_eq!(tensors[1].shape(), &[2, 5]);
    assert!(tensors[0].data().iter().all(|&x| (0.0..1.0).contains(&x)));

    let single = create_rand_tensors_given_shapes(&[&[3]]);
    assert_eq!(single.len(), 1);

    let moved = Tensor::zeros(&[2]).to(Device::Cuda(1));
    assert_eq!(moved.device(), Device::Cuda(1));
    assert_eq!(moved.device().to_string(), "cuda:1");
    assert_eq!(moved.cpu().device(), Device::Cpu);
}
