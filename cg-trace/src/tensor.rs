use ndarray::{ArrayD, IxDyn};
use rand::random;

use crate::device::Device;

/// An example input tensor, used to drive a single traced forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
    device: Device,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Tensor {
            data,
            device: Device::Cpu,
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Tensor::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// A tensor of the given shape filled with uniform values in `[0, 1)`.
    pub fn rand(shape: &[usize]) -> Self {
        Tensor::new(ArrayD::from_shape_simple_fn(IxDyn(shape), random::<f32>))
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn to(&self, device: Device) -> Tensor {
        Tensor {
            data: self.data.clone(),
            device,
        }
    }

    #[must_use]
    pub fn cuda(&self) -> Tensor {
        self.to(Device::Cuda(0))
    }

    #[must_use]
    pub fn cpu(&self) -> Tensor {
        self.to(Device::Cpu)
    }
}

/// Create one random tensor per shape, in order.
pub fn create_rand_tensors_given_shapes(shapes: &[&[usize]]) -> Vec<Tensor> {
    shapes.iter().map(|shape| Tensor::rand(shape)).collect()
}
