use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use crate::model::Model;
use crate::module::{Module, ModuleKind};
use crate::result::{TraceError, TraceResult};
use crate::tensor::Tensor;

/// A tensor flowing through a traced forward pass: its trace name and shape.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TracedTensor {
    name: String,
    shape: Vec<usize>,
}

/// A scalar integer flowing through a traced forward pass, typically the result of [Tracer::size].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TracedInt {
    name: String,
    value: usize,
}

/// A dimension passed to [Tracer::view].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ViewDim {
    Traced(TracedInt),
    /// A fixed size, where `-1` means "infer from the remaining size".
    Fixed(isize),
}

/// The textual instruction log of a single forward pass.
///
/// Line grammar:
/// ```text
/// graph(x0 : Float(1, 3, 8, 8)):
///   conv.weight : Float(4, 3, 3, 3) = prim::Param(), scope: Net/Conv2d[conv]
///   input0 : Float(1, 4, 8, 8) = aten::_convolution(x0, conv.weight, None, [1, 1], [1, 1], [1, 1], False, [0, 0], 1), scope: Net/Conv2d[conv]
///   return (input0)
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawTrace {
    text: String,
}

#[derive(Debug, Clone)]
struct ModuleEntry {
    path: String,
    scope: String,
    module: Arc<Module>,
}

/// Records the instructions a model executes, propagating shapes instead of values.
#[derive(Debug)]
pub struct Tracer {
    root_scope: String,
    modules: Vec<ModuleEntry>,
    inputs: Vec<String>,
    lines: Vec<String>,
    next_id: usize,
}

/// Run `model` once on `inputs` and record the resulting trace.
///
/// Only the shapes of the inputs are used, the devices of the model and inputs are ignored.
pub fn trace(model: &dyn Model, inputs: &[Tensor]) -> TraceResult<RawTrace> {
    let root = model.root();
    let input_devices = inputs.iter().map(|t| t.device().to_string()).join(", ");
    debug!(
        "Tracing model {} on {} with inputs on [{}]",
        root.type_name(),
        model.device(),
        input_devices
    );

    let mut tracer = Tracer::new(root);
    let traced_inputs = inputs.iter().map(|t| tracer.input(t.shape())).collect_vec();
    let outputs = model.forward(&mut tracer, &traced_inputs)?;

    let trace = tracer.finish(&outputs);
    debug!("Recorded trace with {} lines", trace.lines().count());
    Ok(trace)
}

impl TracedTensor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl TracedInt {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> usize {
        self.value
    }
}

impl RawTrace {
    pub fn new(text: impl Into<String>) -> Self {
        RawTrace { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

impl Display for RawTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Tracer {
    /// Create a tracer for the hierarchy rooted at `root`, declaring all parameters up front.
    pub fn new(root: &Arc<Module>) -> Self {
        let root_scope = root.type_name().to_owned();
        let mut modules = vec![];
        collect_entries(root, String::new(), root_scope.clone(), &mut modules);

        let mut tracer = Tracer {
            root_scope,
            modules,
            inputs: vec![],
            lines: vec![],
            next_id: 0,
        };

        let mut param_lines = vec![];
        for entry in &tracer.modules {
            for (param, shape) in entry.module.parameters() {
                param_lines.push(format!(
                    "{} : {} = prim::Param(), scope: {}",
                    param_name(&entry.path, param),
                    float_type(&shape),
                    entry.scope
                ));
            }
        }
        tracer.lines = param_lines;

        tracer
    }

    /// Declare the next model input.
    pub fn input(&mut self, shape: &[usize]) -> TracedTensor {
        let name = format!("x{}", self.inputs.len());
        self.inputs.push(format!("{} : {}", name, float_type(shape)));
        TracedTensor {
            name,
            shape: shape.to_vec(),
        }
    }

    /// Finish the trace, marking `outputs` as the model outputs.
    pub fn finish(mut self, outputs: &[TracedTensor]) -> RawTrace {
        self.lines
            .push(format!("return ({})", outputs.iter().map(|o| &o.name).join(", ")));

        let mut text = format!("graph({}):\n", self.inputs.join(", "));
        for line in &self.lines {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        RawTrace { text }
    }

    fn entry(&self, module: &Arc<Module>) -> TraceResult<ModuleEntry> {
        self.modules
            .iter()
            .find(|e| Arc::ptr_eq(&e.module, module))
            .cloned()
            .ok_or_else(|| TraceError::UnknownModule {
                type_name: module.type_name().to_owned(),
            })
    }

    fn fresh_name(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.next_id);
        self.next_id += 1;
        name
    }

    fn emit_tensor(&mut self, callee: &str, args: &[String], shape: Vec<usize>, scope: &str) -> TracedTensor {
        let name = self.fresh_name("input");
        self.lines.push(format!(
            "{} : {} = {}({}), scope: {}",
            name,
            float_type(&shape),
            callee,
            args.join(", "),
            scope
        ));
        TracedTensor { name, shape }
    }

    /// Invoke `module` on `input`.
    ///
    /// Containers of type [ModuleKind::Sequential] run their children in order,
    /// other containers cannot be called and must be traced through their children.
    pub fn call(&mut self, module: &Arc<Module>, input: &TracedTensor) -> TraceResult<TracedTensor> {
        let entry = self.entry(module)?;
        let x = input.name.clone();
        let shape = input.shape.as_slice();
        let scope = entry.scope.as_str();
        let param = |name: &str| param_name(&entry.path, name);

        let result = match *module.kind() {
            ModuleKind::Conv2d {
                in_channels,
                out_channels,
                kernel,
                stride,
                padding,
                bias,
            } => {
                let [n, c, h, w] = expect_rank4(&entry.path, shape)?;
                if c != in_channels {
                    return Err(mismatch(&entry.path, format!("{} input channels", in_channels), shape));
                }
                let out_h = pooled_size(&entry.path, shape, h, kernel, stride, padding)?;
                let out_w = pooled_size(&entry.path, shape, w, kernel, stride, padding)?;

                let bias = if bias { param("bias") } else { "None".to_owned() };
                let args = [
                    x,
                    param("weight"),
                    bias,
                    format!("[{}, {}]", stride, stride),
                    format!("[{}, {}]", padding, padding),
                    "[1, 1]".to_owned(),
                    "False".to_owned(),
                    "[0, 0]".to_owned(),
                    "1".to_owned(),
                ];
                self.emit_tensor("aten::_convolution", &args, vec![n, out_channels, out_h, out_w], scope)
            }
            ModuleKind::Linear {
                in_features,
                out_features,
                bias,
            } => {
                let (&last, batch) = shape
                    .split_last()
                    .ok_or_else(|| mismatch(&entry.path, "rank at least 1".to_owned(), shape))?;
                if last != in_features {
                    return Err(mismatch(&entry.path, format!("{} input features", in_features), shape));
                }

                let bias = if bias { param("bias") } else { "None".to_owned() };
                let args = [x, param("weight"), bias];
                let out_shape = batch.iter().copied().chain([out_features]).collect_vec();
                self.emit_tensor("aten::linear", &args, out_shape, scope)
            }
            ModuleKind::BatchNorm2d { features } => {
                let [_, c, _, _] = expect_rank4(&entry.path, shape)?;
                if c != features {
                    return Err(mismatch(&entry.path, format!("{} channels", features), shape));
                }

                let args = [
                    x,
                    param("weight"),
                    param("bias"),
                    param("running_mean"),
                    param("running_var"),
                    "False".to_owned(),
                    "0.1".to_owned(),
                    "1e-05".to_owned(),
                    "True".to_owned(),
                ];
                self.emit_tensor("aten::batch_norm", &args, shape.to_vec(), scope)
            }
            ModuleKind::ReLU { inplace } => {
                let callee = if inplace { "aten::relu_" } else { "aten::relu" };
                self.emit_tensor(callee, &[x], shape.to_vec(), scope)
            }
            ModuleKind::MaxPool2d {
                kernel,
                stride,
                padding,
            } => {
                let [n, c, h, w] = expect_rank4(&entry.path, shape)?;
                let out_h = pooled_size(&entry.path, shape, h, kernel, stride, padding)?;
                let out_w = pooled_size(&entry.path, shape, w, kernel, stride, padding)?;

                let args = [
                    x,
                    format!("[{}, {}]", kernel, kernel),
                    format!("[{}, {}]", stride, stride),
                    format!("[{}, {}]", padding, padding),
                    "[1, 1]".to_owned(),
                    "False".to_owned(),
                ];
                self.emit_tensor("aten::max_pool2d", &args, vec![n, c, out_h, out_w], scope)
            }
            ModuleKind::AvgPool2d {
                kernel,
                stride,
                padding,
            } => {
                let [n, c, h, w] = expect_rank4(&entry.path, shape)?;
                let out_h = pooled_size(&entry.path, shape, h, kernel, stride, padding)?;
                let out_w = pooled_size(&entry.path, shape, w, kernel, stride, padding)?;

                let args = [
                    x,
                    format!("[{}, {}]", kernel, kernel),
                    format!("[{}, {}]", stride, stride),
                    format!("[{}, {}]", padding, padding),
                    "False".to_owned(),
                    "True".to_owned(),
                    "None".to_owned(),
                ];
                self.emit_tensor("aten::avg_pool2d", &args, vec![n, c, out_h, out_w], scope)
            }
            ModuleKind::AdaptiveAvgPool2d { output } => {
                let [n, c, _, _] = expect_rank4(&entry.path, shape)?;
                let args = [x, format!("[{}, {}]", output, output)];
                self.emit_tensor("aten::adaptive_avg_pool2d", &args, vec![n, c, output, output], scope)
            }
            ModuleKind::Dropout { p } => {
                let args = [x, p.to_string(), "False".to_owned()];
                self.emit_tensor("aten::dropout", &args, shape.to_vec(), scope)
            }
            ModuleKind::Dropout2d { p } => {
                let args = [x, p.to_string(), "False".to_owned()];
                self.emit_tensor("aten::feature_dropout", &args, shape.to_vec(), scope)
            }
            ModuleKind::Sequential => {
                let mut curr = input.clone();
                for (_, child) in module.children() {
                    curr = self.call(child, &curr)?;
                }
                curr
            }
            ModuleKind::ModuleList | ModuleKind::Custom => {
                return Err(TraceError::NotCallable {
                    path: entry.path.clone(),
                    type_name: module.type_name().to_owned(),
                });
            }
        };

        Ok(result)
    }

    /// Elementwise addition, `left + right`.
    pub fn add(&mut self, left: &TracedTensor, right: &TracedTensor) -> TraceResult<TracedTensor> {
        self.add_impl("aten::add", left, right)
    }

    /// In-place elementwise addition, `left += right`.
    pub fn add_inplace(&mut self, left: &TracedTensor, right: &TracedTensor) -> TraceResult<TracedTensor> {
        self.add_impl("aten::add_", left, right)
    }

    fn add_impl(&mut self, callee: &str, left: &TracedTensor, right: &TracedTensor) -> TraceResult<TracedTensor> {
        if left.shape != right.shape {
            return Err(mismatch(
                callee,
                format!("shape {:?} to match", left.shape),
                &right.shape,
            ));
        }

        let args = [left.name.clone(), right.name.clone(), "1".to_owned()];
        let scope = self.root_scope.clone();
        Ok(self.emit_tensor(callee, &args, left.shape.clone(), &scope))
    }

    /// Concatenate `tensors` along `dim`, passing them as a constructed list.
    pub fn cat(&mut self, tensors: &[TracedTensor], dim: usize) -> TraceResult<TracedTensor> {
        let first = tensors
            .first()
            .ok_or_else(|| mismatch("aten::cat", "at least one tensor".to_owned(), &[]))?;
        if dim >= first.shape.len() {
            return Err(mismatch("aten::cat", format!("rank above {}", dim), &first.shape));
        }

        let mut shape = first.shape.clone();
        for tensor in &tensors[1..] {
            let compatible = tensor.shape.len() == shape.len()
                && (0..shape.len()).all(|axis| axis == dim || tensor.shape[axis] == shape[axis]);
            if !compatible {
                return Err(mismatch(
                    "aten::cat",
                    format!("shape compatible with {:?} on axis {}", first.shape, dim),
                    &tensor.shape,
                ));
            }
            shape[dim] += tensor.shape[dim];
        }

        let list = self.fresh_name("_");
        let scope = self.root_scope.clone();
        self.lines.push(format!(
            "{} = prim::ListConstruct({}), scope: {}",
            list,
            tensors.iter().map(|t| &t.name).join(", "),
            scope
        ));

        Ok(self.emit_tensor("aten::cat", &[list, dim.to_string()], shape, &scope))
    }

    /// The size of `input` along `dim`.
    pub fn size(&mut self, input: &TracedTensor, dim: usize) -> TraceResult<TracedInt> {
        let value = *input
            .shape
            .get(dim)
            .ok_or_else(|| mismatch("aten::size", format!("rank above {}", dim), &input.shape))?;

        let name = self.fresh_name("_");
        self.lines.push(format!(
            "{} : int = aten::size({}, {}), scope: {}",
            name, input.name, dim, self.root_scope
        ));
        Ok(TracedInt { name, value })
    }

    /// View `input` with a new shape, at most one dimension can be `-1`.
    pub fn view(&mut self, input: &TracedTensor, dims: &[ViewDim]) -> TraceResult<TracedTensor> {
        if dims.iter().any(|d| matches!(*d, ViewDim::Fixed(size) if size < -1)) {
            let expected = format!("view sizes of at least -1, got {:?}", dims);
            return Err(mismatch("aten::view", expected, &input.shape));
        }

        let total: usize = input.shape.iter().product();
        let known: usize = dims
            .iter()
            .map(|d| match *d {
                ViewDim::Traced(ref size) => size.value,
                ViewDim::Fixed(-1) => 1,
                ViewDim::Fixed(size) => size as usize,
            })
            .product();

        let inferred = dims.iter().filter(|d| **d == ViewDim::Fixed(-1)).count();
        let valid = match inferred {
            0 => known == total,
            1 => known != 0 && total % known == 0,
            _ => false,
        };
        if !valid {
            let expected = format!("a size matching view {:?}", dims);
            return Err(mismatch("aten::view", expected, &input.shape));
        }

        let shape = dims
            .iter()
            .map(|d| match *d {
                ViewDim::Traced(ref size) => size.value,
                ViewDim::Fixed(-1) => total / known,
                ViewDim::Fixed(size) => size as usize,
            })
            .collect_vec();

        let dims_str = dims
            .iter()
            .map(|d| match d {
                ViewDim::Traced(size) => size.name.clone(),
                ViewDim::Fixed(size) => size.to_string(),
            })
            .join(", ");

        let args = [input.name.clone(), format!("[{}]", dims_str)];
        let scope = self.root_scope.clone();
        Ok(self.emit_tensor("aten::view", &args, shape, &scope))
    }
}

fn collect_entries(module: &Arc<Module>, path: String, scope: String, result: &mut Vec<ModuleEntry>) {
    if result.iter().any(|e| Arc::ptr_eq(&e.module, module)) {
        return;
    }
    result.push(ModuleEntry {
        path: path.clone(),
        scope: scope.clone(),
        module: module.clone(),
    });

    for (name, child) in module.children() {
        let child_path = if path.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", path, name)
        };
        let child_scope = format!("{}/{}[{}]", scope, child.type_name(), name);
        collect_entries(child, child_path, child_scope, result);
    }
}

fn param_name(path: &str, param: &str) -> String {
    if path.is_empty() {
        param.to_owned()
    } else {
        format!("{}.{}", path, param)
    }
}

fn float_type(shape: &[usize]) -> String {
    format!("Float({})", shape.iter().join(", "))
}

fn mismatch(what: &str, expected: String, actual: &[usize]) -> TraceError {
    TraceError::ShapeMismatch {
        what: what.to_owned(),
        expected,
        actual: actual.to_vec(),
    }
}

fn expect_rank4(what: &str, shape: &[usize]) -> TraceResult<[usize; 4]> {
    shape
        .try_into()
        .map_err(|_| mismatch(what, "rank 4".to_owned(), shape))
}

fn pooled_size(what: &str, shape: &[usize], size: usize, kernel: usize, stride: usize, padding: usize) -> TraceResult<usize> {
    let padded = size + 2 * padding;
    if padded < kernel || stride == 0 {
        return Err(mismatch(what, format!("spatial size of at least {}", kernel), shape));
    }
    Ok((padded - kernel) / stride + 1)
}
