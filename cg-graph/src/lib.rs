#![warn(missing_debug_implementations)]
#![allow(clippy::new_without_default)]

//! Connected graph construction from model traces, with surrounding query utilities.
//!
//! The core type of this crate is [ConnectedGraph](graph::ConnectedGraph), built by tracing a
//! [Model](cg_trace::model::Model) once and turning the recorded instructions into ops and products.
//!
//! An example demonstrating some of the features of this crate:
//! ```
//! # use cg_graph::graph::ConnectedGraph;
//! # use cg_graph::utils::{get_all_input_ops, get_all_output_ops};
//! # use cg_trace::models::SingleResidual;
//! # use cg_trace::tensor::create_rand_tensors_given_shapes;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // build the graph for a model and example inputs
//! let model = SingleResidual::new();
//! let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
//! let graph = ConnectedGraph::build(&model, &inputs)?;
//!
//! // every tensor used twice got a split op
//! assert_eq!(graph.get_all_ops().len(), graph.ordered_ops().len() + graph.split_count());
//!
//! // find the sources and sinks
//! let sources = get_all_input_ops(&graph);
//! let sinks = get_all_output_ops(&graph);
//! assert_eq!(graph[sources[0]].module_name(), Some("SingleResidual.conv1"));
//! assert_eq!(graph[sinks[0]].module_name(), Some("SingleResidual.fc"));
//!
//! // look up ops by module name
//! let fc = graph.get_op_from_module_name("SingleResidual.fc")?;
//! println!("{} has output shape {:?}", fc.name(), fc.output_shape());
//! # Ok(())
//! # }
//! ```

/// The core graph datastructure.
pub mod graph;
/// Dotted module names and scope resolution.
pub mod hierarchy;
/// Module inspection built on top of graph construction.
pub mod modules;
/// Trace text interpretation.
pub mod normalize;
pub mod result;
/// Instruction argument splitting.
pub mod tokenize;
/// Source and sink queries.
pub mod utils;

/// Graph visualization as a `dot` file.
pub mod dot;
