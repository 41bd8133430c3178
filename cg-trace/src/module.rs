use std::sync::Arc;

use itertools::Itertools;

/// A node in a model's named module hierarchy.
///
/// Modules are shared through [Arc], and module identity is pointer identity:
/// invoking the same `Arc<Module>` twice is a reuse of one module, not two modules.
#[derive(Debug)]
pub struct Module {
    type_name: String,
    kind: ModuleKind,
    children: Vec<(String, Arc<Module>)>,
}

/// The layer a module implements, with the hyper-parameters that determine its output shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleKind {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    },
    Linear {
        in_features: usize,
        out_features: usize,
        bias: bool,
    },
    BatchNorm2d {
        features: usize,
    },
    ReLU {
        inplace: bool,
    },
    MaxPool2d {
        kernel: usize,
        stride: usize,
        padding: usize,
    },
    AvgPool2d {
        kernel: usize,
        stride: usize,
        padding: usize,
    },
    AdaptiveAvgPool2d {
        output: usize,
    },
    Dropout {
        p: f32,
    },
    Dropout2d {
        p: f32,
    },

    /// Runs its children in order when called.
    Sequential,
    /// An indexed container that cannot be called itself.
    ModuleList,
    /// A user-defined module, only traced through the model's own forward function.
    Custom,
}

/// Modules compare by identity, matching how reuse is defined.
impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Module {}

impl Module {
    fn leaf(type_name: &str, kind: ModuleKind) -> Arc<Module> {
        Arc::new(Module {
            type_name: type_name.to_owned(),
            kind,
            children: vec![],
        })
    }

    pub fn conv2d(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Arc<Module> {
        let kind = ModuleKind::Conv2d {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            bias,
        };
        Module::leaf("Conv2d", kind)
    }

    pub fn linear(in_features: usize, out_features: usize) -> Arc<Module> {
        let kind = ModuleKind::Linear {
            in_features,
            out_features,
            bias: true,
        };
        Module::leaf("Linear", kind)
    }

    pub fn batch_norm2d(features: usize) -> Arc<Module> {
        Module::leaf("BatchNorm2d", ModuleKind::BatchNorm2d { features })
    }

    pub fn relu(inplace: bool) -> Arc<Module> {
        Module::leaf("ReLU", ModuleKind::ReLU { inplace })
    }

    pub fn max_pool2d(kernel: usize, stride: usize, padding: usize) -> Arc<Module> {
        let kind = ModuleKind::MaxPool2d {
            kernel,
            stride,
            padding,
        };
        Module::leaf("MaxPool2d", kind)
    }

    pub fn avg_pool2d(kernel: usize, stride: usize, padding: usize) -> Arc<Module> {
        let kind = ModuleKind::AvgPool2d {
            kernel,
            stride,
            padding,
        };
        Module::leaf("AvgPool2d", kind)
    }

    pub fn adaptive_avg_pool2d(output: usize) -> Arc<Module> {
        Module::leaf("AdaptiveAvgPool2d", ModuleKind::AdaptiveAvgPool2d { output })
    }

    pub fn dropout(p: f32) -> Arc<Module> {
        Module::leaf("Dropout", ModuleKind::Dropout { p })
    }

    pub fn dropout2d(p: f32) -> Arc<Module> {
        Module::leaf("Dropout2d", ModuleKind::Dropout2d { p })
    }

    /// Children are named by their index.
    pub fn sequential(children: Vec<Arc<Module>>) -> Arc<Module> {
        Module::indexed("Sequential", ModuleKind::Sequential, children)
    }

    /// Children are named by their index.
    pub fn module_list(children: Vec<Arc<Module>>) -> Arc<Module> {
        Module::indexed("ModuleList", ModuleKind::ModuleList, children)
    }

    fn indexed(type_name: &str, kind: ModuleKind, children: Vec<Arc<Module>>) -> Arc<Module> {
        let children = children
            .into_iter()
            .enumerate()
            .map(|(i, child)| (i.to_string(), child))
            .collect_vec();

        Arc::new(Module {
            type_name: type_name.to_owned(),
            kind,
            children,
        })
    }

    /// A user-defined module with the given type name and named children.
    pub fn custom(type_name: &str, children: Vec<(&str, Arc<Module>)>) -> Arc<Module> {
        let children = children
            .into_iter()
            .map(|(name, child)| (name.to_owned(), child))
            .collect_vec();

        Arc::new(Module {
            type_name: type_name.to_owned(),
            kind: ModuleKind::Custom,
            children,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    pub fn children(&self) -> &[(String, Arc<Module>)] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Arc<Module>> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn is_conv(&self) -> bool {
        matches!(self.kind, ModuleKind::Conv2d { .. })
    }

    /// The parameters (and buffers) of this module itself, excluding children, with their shapes.
    pub fn parameters(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self.kind {
            ModuleKind::Conv2d {
                in_channels,
                out_channels,
                kernel,
                bias,
                ..
            } => {
                let mut params = vec![("weight", vec![out_channels, in_channels, kernel, kernel])];
                if bias {
                    params.push(("bias", vec![out_channels]));
                }
                params
            }
            ModuleKind::Linear {
                in_features,
                out_features,
                bias,
            } => {
                let mut params = vec![("weight", vec![out_features, in_features])];
                if bias {
                    params.push(("bias", vec![out_features]));
                }
                params
            }
            ModuleKind::BatchNorm2d { features } => vec![
                ("weight", vec![features]),
                ("bias", vec![features]),
                ("running_mean", vec![features]),
                ("running_var", vec![features]),
            ],
            _ => vec![],
        }
    }

    /// All modules in this hierarchy as `(dotted path, module)`, pre-order, starting with `("", self)`.
    ///
    /// A module instance registered under multiple paths is only listed under the first one.
    pub fn named_modules(self: &Arc<Self>) -> Vec<(String, Arc<Module>)> {
        let mut result = vec![];
        visit_named(self, String::new(), &mut result);
        result
    }
}

fn visit_named(module: &Arc<Module>, path: String, result: &mut Vec<(String, Arc<Module>)>) {
    if result.iter().any(|(_, m)| Arc::ptr_eq(m, module)) {
        return;
    }
    result.push((path.clone(), module.clone()));

    for (name, child) in &module.children {
        let child_path = if path.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", path, name)
        };
        visit_named(child, child_path, result);
    }
}
