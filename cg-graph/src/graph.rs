use std::fmt::{Debug, Display, Formatter};
use std::ops::Index;
use std::sync::Arc;

use cg_trace::model::Model;
use cg_trace::module::Module;
use cg_trace::tensor::Tensor;
use indexmap::IndexMap;
use itertools::Itertools;
use rand::random;
use tracing::{debug, trace};

use crate::hierarchy::{scope_to_module_name, ModuleIndex};
use crate::normalize::{normalize_trace, InputRef, NormalizedTrace, TraceRecord};
use crate::result::{GraphError, GraphResult};

/// The connected graph of a traced model.
///
/// Ops are the computation steps of a single forward pass, Products are the tensors flowing between them.
/// After construction every op-produced Product has at most one consumer: tensors used by multiple ops are
/// routed through a synthetic `split` op with one output per consumer.
///
/// The graph is built once and never modified afterwards.
/// It implements `Index<OpId>` and `Index<ProductId>`, so `graph[op]` and `graph[product]` give the details.
///
/// ```
/// # use cg_graph::graph::ConnectedGraph;
/// # use cg_trace::models::ConcatModel;
/// # use cg_trace::tensor::create_rand_tensors_given_shapes;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let model = ConcatModel::new();
/// let inputs = create_rand_tensors_given_shapes(&[&[1, 3, 8, 8], &[1, 3, 8, 8], &[1, 3, 8, 8]]);
/// let graph = ConnectedGraph::build(&model, &inputs)?;
///
/// let cat = &graph.get_all_ops()["cat_3"];
/// assert_eq!(cat.inputs().len(), 3);
/// assert_eq!(cat.output_shape(), &[1, 14, 8, 8]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectedGraph {
    check: u32,
    ops: IndexMap<String, Op>,
    products: IndexMap<String, Product>,
    ordered_ops: Vec<OpId>,
    split_count: usize,
    model_inputs: Vec<ProductId>,
    model_outputs: Vec<ProductId>,
    module_to_op: IndexMap<String, OpId>,
}

/// An op in a [ConnectedGraph].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct OpId {
    index: usize,
    check: u32,
}

/// A product in a [ConnectedGraph].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProductId {
    index: usize,
    check: u32,
}

/// One computation step, or a synthetic split.
#[derive(Debug, Clone)]
pub struct Op {
    id: OpId,
    name: String,
    op_type: String,
    module: Option<Arc<Module>>,
    module_name: Option<String>,
    inputs: Vec<ProductId>,
    outputs: Vec<ProductId>,
    output_shape: Vec<usize>,
    is_split: bool,
    constants: Vec<String>,
}

/// A tensor flowing from its producer to its consumers.
#[derive(Debug, Clone)]
pub struct Product {
    id: ProductId,
    name: String,
    shape: Vec<usize>,
    producer: Producer,
    consumers: Vec<OpId>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Producer {
    Op(OpId),
    /// The model input with the given index.
    ModelInput(usize),
    /// A module parameter, these are never split.
    Parameter,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BuildSettings {
    /// Route every Product with multiple consumers through a split op.
    pub insert_splits: bool,
    /// Also split model inputs that are used multiple times, only relevant if `insert_splits` is set.
    pub split_model_inputs: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            insert_splits: true,
            split_model_inputs: true,
        }
    }
}

impl ConnectedGraph {
    /// Trace `model` once on `inputs` and build the graph with the default settings.
    pub fn build(model: &dyn Model, inputs: &[Tensor]) -> GraphResult<Self> {
        Self::build_with_settings(model, inputs, BuildSettings::default())
    }

    pub fn build_with_settings(model: &dyn Model, inputs: &[Tensor], settings: BuildSettings) -> GraphResult<Self> {
        let raw = cg_trace::tracer::trace(model, inputs)?;
        let hierarchy = ModuleIndex::new(model.root());
        Self::from_trace(raw.text(), Some(&hierarchy), settings)
    }

    /// Build the graph from raw trace text.
    ///
    /// Without a `hierarchy` scopes are only checked for validity and no op carries a module.
    pub fn from_trace(text: &str, hierarchy: Option<&ModuleIndex>, settings: BuildSettings) -> GraphResult<Self> {
        let normalized = normalize_trace(text)?;

        let mut builder = GraphBuilder::new(hierarchy);
        builder.visit_trace(&normalized)?;
        if settings.insert_splits {
            builder.insert_splits(settings.split_model_inputs);
        }

        let graph = builder.graph;
        debug!(
            "Built connected graph with {} ops ({} splits) and {} products",
            graph.ops.len(),
            graph.split_count,
            graph.products.len()
        );
        Ok(graph)
    }

    fn check_op(&self, op: OpId) {
        assert_eq!(op.check, self.check, "{:?} does not belong to this graph", op);
        assert!(op.index < self.ops.len());
    }

    fn check_product(&self, product: ProductId) {
        assert_eq!(
            product.check, self.check,
            "{:?} does not belong to this graph",
            product
        );
        assert!(product.index < self.products.len());
    }

    /// The traced ops in trace order, excluding splits.
    pub fn ordered_ops(&self) -> &[OpId] {
        &self.ordered_ops
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// All ops keyed by name, including splits, in creation order.
    pub fn get_all_ops(&self) -> &IndexMap<String, Op> {
        &self.ops
    }

    /// All products keyed by name, in creation order.
    pub fn products(&self) -> &IndexMap<String, Product> {
        &self.products
    }

    pub fn ops(&self) -> impl Iterator<Item = OpId> + '_ {
        self.ops.values().map(|op| op.id)
    }

    pub fn op(&self, name: &str) -> Option<&Op> {
        self.ops.get(name)
    }

    pub fn product(&self, name: &str) -> Option<&Product> {
        self.products.get(name)
    }

    pub fn model_inputs(&self) -> &[ProductId] {
        &self.model_inputs
    }

    pub fn model_outputs(&self) -> &[ProductId] {
        &self.model_outputs
    }

    /// The op that first invoked the module with the given dotted name, eg. `MultiInput.conv1`.
    pub fn get_op_from_module_name(&self, name: &str) -> GraphResult<&Op> {
        self.module_to_op
            .get(name)
            .map(|&op| &self[op])
            .ok_or_else(|| GraphError::ModuleNotFound(name.to_owned()))
    }

    /// The op producing `product`, if any.
    pub fn producer_op(&self, product: ProductId) -> Option<OpId> {
        match self[product].producer {
            Producer::Op(op) => Some(op),
            Producer::ModelInput(_) | Producer::Parameter => None,
        }
    }

    fn product_names(&self, products: &[ProductId]) -> String {
        products.iter().map(|&p| self[p].name()).join(", ")
    }
}

impl Index<OpId> for ConnectedGraph {
    type Output = Op;

    fn index(&self, op: OpId) -> &Self::Output {
        self.check_op(op);
        &self.ops[op.index]
    }
}

impl Index<ProductId> for ConnectedGraph {
    type Output = Product;

    fn index(&self, product: ProductId) -> &Self::Output {
        self.check_product(product);
        &self.products[product.index]
    }
}

impl Op {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// The module this op is an invocation of, `None` for functional ops and splits.
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Input products, in argument order. Parameters are included.
    pub fn inputs(&self) -> &[ProductId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ProductId] {
        &self.outputs
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn is_split(&self) -> bool {
        self.is_split
    }

    /// The literal arguments of the traced instruction.
    pub fn constants(&self) -> &[String] {
        &self.constants
    }
}

impl Product {
    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn producer(&self) -> Producer {
        self.producer
    }

    /// Consuming ops, once per use.
    pub fn consumers(&self) -> &[OpId] {
        &self.consumers
    }

    pub fn is_model_input(&self) -> bool {
        matches!(self.producer, Producer::ModelInput(_))
    }

    pub fn is_parameter(&self) -> bool {
        self.producer == Producer::Parameter
    }
}

impl OpId {
    pub fn index(self) -> usize {
        self.index
    }
}

impl ProductId {
    pub fn index(self) -> usize {
        self.index
    }
}

impl Debug for OpId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let OpId { index, check } = self;
        if f.alternate() {
            write!(f, "OpId {{ index: {}, check: {} }}", index, check)
        } else {
            write!(f, "OpId({})", index)
        }
    }
}

impl Debug for ProductId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ProductId { index, check } = self;
        if f.alternate() {
            write!(f, "ProductId {{ index: {}, check: {} }}", index, check)
        } else {
            write!(f, "ProductId({})", index)
        }
    }
}

impl Debug for ConnectedGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedGraph")
            .field("ops", &self.ops.len())
            .field("split_count", &self.split_count)
            .field("products", &self.products.len())
            .field("inputs", &self.model_inputs)
            .field("outputs", &self.model_outputs)
            .finish_non_exhaustive()
    }
}

impl Display for ConnectedGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ConnectedGraph {{")?;
        writeln!(f, "  inputs: [{}],", self.product_names(&self.model_inputs))?;
        writeln!(f, "  outputs: [{}],", self.product_names(&self.model_outputs))?;
        writeln!(f, "  split_count: {},", self.split_count)?;

        writeln!(f, "  ops: [")?;
        for op in self.ops.values() {
            write!(
                f,
                "    {} = {}({}) -> [{}] {:?}",
                op.name,
                op.op_type,
                self.product_names(&op.inputs),
                self.product_names(&op.outputs),
                op.output_shape
            )?;
            if let Some(module_name) = &op.module_name {
                write!(f, ", module: {}", module_name)?;
            }
            writeln!(f, ",")?;
        }
        writeln!(f, "  ],")?;

        writeln!(f, "}}")?;
        Ok(())
    }
}

/// Per-build state, the op counter starts at zero for every build.
#[derive(Debug)]
struct GraphBuilder<'a> {
    graph: ConnectedGraph,
    hierarchy: Option<&'a ModuleIndex>,
    next_op: usize,
    next_split: usize,
}

impl<'a> GraphBuilder<'a> {
    fn new(hierarchy: Option<&'a ModuleIndex>) -> Self {
        let graph = ConnectedGraph {
            check: random(),
            ops: IndexMap::new(),
            products: IndexMap::new(),
            ordered_ops: vec![],
            split_count: 0,
            model_inputs: vec![],
            model_outputs: vec![],
            module_to_op: IndexMap::new(),
        };

        GraphBuilder {
            graph,
            hierarchy,
            next_op: 0,
            next_split: 0,
        }
    }

    fn visit_trace(&mut self, normalized: &NormalizedTrace) -> GraphResult<()> {
        for (index, input) in normalized.inputs.iter().enumerate() {
            let product = self.add_product(
                input.line,
                &input.name,
                input.shape.clone(),
                Producer::ModelInput(index),
            )?;
            self.graph.model_inputs.push(product);
        }

        for param in &normalized.params {
            if let Some(scope) = &param.scope {
                // parameters are never resolved to modules, but their scope still has to be valid
                scope_to_module_name(param.line, scope)?;
            }
            self.add_product(param.line, &param.name, param.shape.clone(), Producer::Parameter)?;
        }

        for record in &normalized.records {
            self.visit_record(record)?;
        }

        for name in &normalized.outputs {
            let product = self.lookup(normalized.return_line, name)?;
            self.graph.model_outputs.push(product);
        }

        Ok(())
    }

    fn visit_record(&mut self, record: &TraceRecord) -> GraphResult<()> {
        let id = OpId {
            index: self.graph.ops.len(),
            check: self.graph.check,
        };
        let name = format!("{}_{}", record.op_type, self.next_op);
        self.next_op += 1;

        let module = match (self.hierarchy, &record.scope) {
            (Some(hierarchy), Some(scope)) => hierarchy.resolve_scope(record.line, scope)?,
            (None, Some(scope)) => {
                scope_to_module_name(record.line, scope)?;
                None
            }
            (_, None) => None,
        };
        let (module_name, module) = match module {
            Some((module_name, module)) => (Some(module_name), Some(module)),
            None => (None, None),
        };

        let inputs = record
            .inputs
            .iter()
            .map(|input| match input {
                InputRef::Value(name) | InputRef::Parameter(name) => self.lookup(record.line, name),
            })
            .collect::<GraphResult<Vec<_>>>()?;

        let output = self.add_product(
            record.line,
            &record.output,
            record.output_shape.clone(),
            Producer::Op(id),
        )?;

        for &input in &inputs {
            self.graph.products[input.index].consumers.push(id);
        }

        if let Some(module_name) = &module_name {
            self.graph.module_to_op.entry(module_name.clone()).or_insert(id);
        }

        trace!("Adding op {} for line {} with module {:?}", name, record.line, module_name);
        let op = Op {
            id,
            name: name.clone(),
            op_type: record.op_type.clone(),
            module,
            module_name,
            inputs,
            outputs: vec![output],
            output_shape: record.output_shape.clone(),
            is_split: false,
            constants: record.constants.clone(),
        };
        self.graph.ops.insert(name, op);
        self.graph.ordered_ops.push(id);

        Ok(())
    }

    fn lookup(&self, line: usize, name: &str) -> GraphResult<ProductId> {
        self.graph
            .products
            .get(name)
            .map(|p| p.id)
            .ok_or_else(|| GraphError::UnresolvedReference {
                line,
                name: name.to_owned(),
            })
    }

    fn add_product(&mut self, line: usize, name: &str, shape: Vec<usize>, producer: Producer) -> GraphResult<ProductId> {
        if self.graph.products.contains_key(name) {
            return Err(GraphError::DuplicateName {
                line,
                name: name.to_owned(),
            });
        }

        let id = ProductId {
            index: self.graph.products.len(),
            check: self.graph.check,
        };
        let product = Product {
            id,
            name: name.to_owned(),
            shape,
            producer,
            consumers: vec![],
        };
        self.graph.products.insert(name.to_owned(), product);
        Ok(id)
    }

    fn insert_splits(&mut self, split_model_inputs: bool) {
        let candidates = self
            .graph
            .products
            .values()
            .filter(|p| p.consumers.len() > 1)
            .filter(|p| match p.producer {
                Producer::Op(_) => true,
                Producer::ModelInput(_) => split_model_inputs,
                Producer::Parameter => false,
            })
            .map(|p| p.id)
            .collect_vec();

        for product in candidates {
            self.insert_split(product);
        }
    }

    fn insert_split(&mut self, product: ProductId) {
        let split = OpId {
            index: self.graph.ops.len(),
            check: self.graph.check,
        };
        let name = self.fresh_split_name();

        let original = &mut self.graph.products[product.index];
        let consumers = std::mem::replace(&mut original.consumers, vec![split]);
        let shape = original.shape.clone();
        trace!(
            "Inserting {} after {} with {} consumers",
            name,
            original.name,
            consumers.len()
        );

        let mut outputs = vec![];
        for consumer in consumers {
            let consumer_name = &self.graph.ops[consumer.index].name;
            let output_name = self.fresh_product_name(format!("{}_to_{}", name, consumer_name));

            let output = ProductId {
                index: self.graph.products.len(),
                check: self.graph.check,
            };
            let output_product = Product {
                id: output,
                name: output_name.clone(),
                shape: shape.clone(),
                producer: Producer::Op(split),
                consumers: vec![consumer],
            };
            self.graph.products.insert(output_name, output_product);

            // a consumer using the product multiple times has one slot replaced per use, in order
            let consumer_op = &mut self.graph.ops[consumer.index];
            if let Some(slot) = consumer_op.inputs.iter_mut().find(|p| **p == product) {
                *slot = output;
            }

            outputs.push(output);
        }

        let op = Op {
            id: split,
            name: name.clone(),
            op_type: "split".to_owned(),
            module: None,
            module_name: None,
            inputs: vec![product],
            outputs,
            output_shape: shape,
            is_split: true,
            constants: vec![],
        };
        self.graph.ops.insert(name, op);
        self.graph.split_count += 1;
    }

    fn fresh_split_name(&mut self) -> String {
        loop {
            let name = format!("split_{}", self.next_split);
            self.next_split += 1;
            if !self.graph.ops.contains_key(&name) {
                return name;
            }
        }
    }

    fn fresh_product_name(&self, base: String) -> String {
        let mut name = base.clone();
        let mut next = 1;
        while self.graph.products.contains_key(&name) {
            name = format!("{}_{}", base, next);
            next += 1;
        }
        name
    }
}
