use std::sync::Arc;

use itertools::Itertools;

use cg_graph::modules::{get_ordered_list_of_conv_modules, get_ordered_list_of_modules, get_reused_modules};
use cg_trace::models::{ModelWithReusedNodes, ModuleListModel, SingleResidual};

#[test]
fn ordered_modules() {
    let model = SingleResidual::new();
    let modules = get_ordered_list_of_modules(&model, &[&[1, 3, 32, 32]]).unwrap();

    let paths = modules.iter().map(|(path, _)| path.as_str()).collect_vec();
    assert_eq!(
        paths,
        vec![
            "conv1", "bn1", "relu1", "maxpool", "conv2", "bn2", "relu2", "conv3", "ada", "conv4", "bn3", "relu3",
            "avgpool", "fc"
        ]
    );
    assert!(Arc::ptr_eq(&modules[0].1, &model.conv1));
}

#[test]
fn ordered_conv_modules() {
    let model = ModuleListModel::new();
    let modules = get_ordered_list_of_conv_modules(&model, &[&[1, 3, 8, 8]]).unwrap();

    let paths = modules.iter().map(|(path, _)| path.as_str()).collect_vec();
    assert_eq!(paths, vec!["mod_list.4", "mod_list.2", "seq_list.0"]);
    assert!(modules.iter().all(|(_, module)| module.is_conv()));
}

#[test]
fn reused_modules() {
    let model = ModelWithReusedNodes::new();
    let reused = get_reused_modules(&model, &[&[1, 3, 32, 32]]).unwrap();

    assert_eq!(reused.len(), 1);
    assert_eq!(reused[0].0, "relu1");
    assert!(Arc::ptr_eq(&reused[0].1, &model.relu1));
    assert!(!Arc::ptr_eq(&reused[0].1, &model.relu2));
}

#[test]
fn no_reused_modules() {
    let model = SingleResidual::new();
    let reused = get_reused_modules(&model, &[&[1, 3, 32, 32]]).unwrap();
    assert!(reused.is_empty());
}
