//! Questions about which modules a model actually invokes, answered by building its graph once.

use std::sync::Arc;

use cg_trace::model::Model;
use cg_trace::module::Module;
use cg_trace::tensor::create_rand_tensors_given_shapes;
use itertools::Itertools;

use crate::graph::ConnectedGraph;
use crate::result::GraphResult;

/// Every module invoked during a forward pass on random inputs of the given shapes,
/// as `(path, module)` in order of first invocation. Paths are relative to the model root.
pub fn get_ordered_list_of_modules(
    model: &dyn Model,
    input_shapes: &[&[usize]],
) -> GraphResult<Vec<(String, Arc<Module>)>> {
    let invocations = invoked_modules(model, input_shapes)?;
    Ok(invocations
        .into_iter()
        .unique_by(|(_, module)| Arc::as_ptr(module))
        .collect())
}

/// The convolution subset of [get_ordered_list_of_modules].
pub fn get_ordered_list_of_conv_modules(
    model: &dyn Model,
    input_shapes: &[&[usize]],
) -> GraphResult<Vec<(String, Arc<Module>)>> {
    let modules = get_ordered_list_of_modules(model, input_shapes)?;
    Ok(modules.into_iter().filter(|(_, module)| module.is_conv()).collect())
}

/// The modules invoked more than once during a forward pass, in order of first invocation.
pub fn get_reused_modules(model: &dyn Model, input_shapes: &[&[usize]]) -> GraphResult<Vec<(String, Arc<Module>)>> {
    let invocations = invoked_modules(model, input_shapes)?;
    let counts = invocations.iter().counts_by(|(_, module)| Arc::as_ptr(module));

    Ok(invocations
        .into_iter()
        .filter(|(_, module)| counts[&Arc::as_ptr(module)] > 1)
        .unique_by(|(_, module)| Arc::as_ptr(module))
        .collect())
}

/// One entry per module invocation, in trace order.
fn invoked_modules(model: &dyn Model, input_shapes: &[&[usize]]) -> GraphResult<Vec<(String, Arc<Module>)>> {
    let inputs = create_rand_tensors_given_shapes(input_shapes);
    let graph = ConnectedGraph::build(model, &inputs)?;
    let named = model.root().named_modules();

    let result = graph
        .ordered_ops()
        .iter()
        .filter_map(|&op| graph[op].module())
        .filter_map(|module| {
            named
                .iter()
                .find(|(_, m)| Arc::ptr_eq(m, module))
                .map(|(path, m)| (path.clone(), m.clone()))
        })
        .collect();
    Ok(result)
}
