use std::fmt::{Display, Formatter};

/// The device a model or tensor lives on.
///
/// Tracing only looks at shapes, so the device never influences the recorded trace.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_cuda(self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}
