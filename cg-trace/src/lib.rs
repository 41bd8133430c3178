#![warn(missing_debug_implementations)]
#![allow(clippy::new_without_default)]

//! The model side of connected graph construction: module hierarchies, example tensors and the tracer.
//!
//! A [Model](model::Model) exposes a named [Module](module::Module) hierarchy and a forward function
//! written against a [Tracer](tracer::Tracer). Tracing runs that forward function once, propagating
//! shapes instead of values, and records every executed instruction as a [RawTrace](tracer::RawTrace).
//!
//! ```
//! # use cg_trace::models::SingleResidual;
//! # use cg_trace::tensor::create_rand_tensors_given_shapes;
//! # use cg_trace::tracer::trace;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SingleResidual::new();
//! let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 32, 32]]);
//! let raw = trace(&model, &inputs)?;
//! println!("{}", raw);
//! # Ok(())
//! # }
//! ```
//!
//! Devices are carried by models and tensors but never influence the trace,
//! so graphs built from it are identical whether the model or inputs live on the CPU or a GPU.

/// The [ndarray] crate is used for example tensor storage, and re-exported for convenience.
pub use ndarray;

/// The [Device](device::Device) enum.
pub mod device;
/// The [Model](model::Model) trait.
pub mod model;
/// Example models.
pub mod models;
/// The named module hierarchy.
pub mod module;
pub mod result;
/// Example input tensors.
pub mod tensor;
/// Shape-propagating tracing.
pub mod tracer;
