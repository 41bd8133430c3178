use std::sync::Arc;

use crate::device::Device;
use crate::module::Module;
use crate::result::{TraceError, TraceResult};
use crate::tracer::{TracedTensor, Tracer};

/// A model that can be traced: a named module hierarchy plus a forward function written against a [Tracer].
pub trait Model {
    /// The root of the module hierarchy. Its type name is the first segment of every scope.
    fn root(&self) -> &Arc<Module>;

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>>;
}

/// Get model input `index`, failing if the caller passed too few inputs.
pub fn nth_input(inputs: &[TracedTensor], index: usize) -> TraceResult<&TracedTensor> {
    inputs.get(index).ok_or(TraceError::MissingInput {
        index,
        count: inputs.len(),
    })
}
