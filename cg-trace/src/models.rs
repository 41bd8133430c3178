//! Small example models, used to exercise tracing and graph construction.

use std::sync::Arc;

use crate::device::Device;
use crate::model::{nth_input, Model};
use crate::module::Module;
use crate::result::TraceResult;
use crate::tracer::{TracedTensor, Tracer, ViewDim};

/// Flatten everything but the batch axis, the way `x.view(x.size(0), -1)` does.
fn flatten_batch(tracer: &mut Tracer, x: &TracedTensor) -> TraceResult<TracedTensor> {
    let batch = tracer.size(x, 0)?;
    tracer.view(x, &[ViewDim::Traced(batch), ViewDim::Fixed(-1)])
}

/// A convolutional network with one residual connection, for `1x3x32x32` inputs.
#[derive(Debug)]
pub struct SingleResidual {
    pub conv1: Arc<Module>,
    pub bn1: Arc<Module>,
    pub relu1: Arc<Module>,
    pub maxpool: Arc<Module>,
    pub conv2: Arc<Module>,
    pub bn2: Arc<Module>,
    pub relu2: Arc<Module>,
    pub conv3: Arc<Module>,
    pub ada: Arc<Module>,
    pub conv4: Arc<Module>,
    pub bn3: Arc<Module>,
    pub relu3: Arc<Module>,
    pub avgpool: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl SingleResidual {
    pub fn new() -> Self {
        let conv1 = Module::conv2d(3, 32, 2, 2, 2, false);
        let bn1 = Module::batch_norm2d(32);
        let relu1 = Module::relu(true);
        let maxpool = Module::max_pool2d(2, 2, 1);
        let conv2 = Module::conv2d(32, 16, 2, 2, 2, false);
        let bn2 = Module::batch_norm2d(16);
        let relu2 = Module::relu(true);
        let conv3 = Module::conv2d(16, 8, 2, 2, 2, true);
        let ada = Module::adaptive_avg_pool2d(5);
        let conv4 = Module::conv2d(32, 8, 2, 2, 0, true);
        let bn3 = Module::batch_norm2d(8);
        let relu3 = Module::relu(true);
        let avgpool = Module::avg_pool2d(3, 1, 0);
        let fc = Module::linear(72, 10);

        let root = Module::custom(
            "SingleResidual",
            vec![
                ("conv1", conv1.clone()),
                ("bn1", bn1.clone()),
                ("relu1", relu1.clone()),
                ("maxpool", maxpool.clone()),
                ("conv2", conv2.clone()),
                ("bn2", bn2.clone()),
                ("relu2", relu2.clone()),
                ("conv3", conv3.clone()),
                ("ada", ada.clone()),
                ("conv4", conv4.clone()),
                ("bn3", bn3.clone()),
                ("relu3", relu3.clone()),
                ("avgpool", avgpool.clone()),
                ("fc", fc.clone()),
            ],
        );

        SingleResidual {
            conv1,
            bn1,
            relu1,
            maxpool,
            conv2,
            bn2,
            relu2,
            conv3,
            ada,
            conv4,
            bn3,
            relu3,
            avgpool,
            fc,
            device: Device::Cpu,
            root,
        }
    }
}

impl Model for SingleResidual {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let x = tracer.call(&self.conv1, nth_input(inputs, 0)?)?;
        let x = tracer.call(&self.bn1, &x)?;
        let x = tracer.call(&self.relu1, &x)?;
        let x = tracer.call(&self.maxpool, &x)?;

        let residual = x.clone();

        let x = tracer.call(&self.conv2, &x)?;
        let x = tracer.call(&self.bn2, &x)?;
        let x = tracer.call(&self.relu2, &x)?;
        let x = tracer.call(&self.conv3, &x)?;
        let x = tracer.call(&self.ada, &x)?;

        let residual = tracer.call(&self.conv4, &residual)?;
        let residual = tracer.call(&self.bn3, &residual)?;

        let x = tracer.add_inplace(&x, &residual)?;
        let x = tracer.call(&self.relu3, &x)?;
        let x = tracer.call(&self.avgpool, &x)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}

/// Two image inputs of different resolution merged into a single classifier,
/// for `1x3x32x32` and `1x3x20x20` inputs.
#[derive(Debug)]
pub struct MultiInput {
    pub conv1: Arc<Module>,
    pub conv2: Arc<Module>,
    pub conv3: Arc<Module>,
    pub relu2: Arc<Module>,
    pub bn1: Arc<Module>,
    pub relu1: Arc<Module>,
    pub maxpool: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl MultiInput {
    pub fn new() -> Self {
        let conv1 = Module::conv2d(3, 16, 2, 2, 3, false);
        let conv2 = Module::conv2d(16, 8, 3, 2, 2, true);
        let conv3 = Module::conv2d(3, 8, 3, 2, 2, true);
        let relu2 = Module::relu(true);
        let bn1 = Module::batch_norm2d(8);
        let relu1 = Module::relu(true);
        let maxpool = Module::max_pool2d(2, 2, 1);
        let fc = Module::linear(288, 3);

        let root = Module::custom(
            "MultiInput",
            vec![
                ("conv1", conv1.clone()),
                ("conv2", conv2.clone()),
                ("conv3", conv3.clone()),
                ("relu2", relu2.clone()),
                ("bn1", bn1.clone()),
                ("relu1", relu1.clone()),
                ("maxpool", maxpool.clone()),
                ("fc", fc.clone()),
            ],
        );

        MultiInput {
            conv1,
            conv2,
            conv3,
            relu2,
            bn1,
            relu1,
            maxpool,
            fc,
            device: Device::Cpu,
            root,
        }
    }
}

impl Model for MultiInput {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let x1 = tracer.call(&self.conv1, nth_input(inputs, 0)?)?;
        let x1 = tracer.call(&self.conv2, &x1)?;

        let x2 = tracer.call(&self.conv3, nth_input(inputs, 1)?)?;
        let x2 = tracer.call(&self.relu2, &x2)?;

        let x = tracer.add(&x1, &x2)?;
        let x = tracer.call(&self.bn1, &x)?;
        let x = tracer.call(&self.relu1, &x)?;
        let x = tracer.call(&self.maxpool, &x)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}

/// Three inputs convolved separately and concatenated along the channel axis, for `1x3x8x8` inputs.
#[derive(Debug)]
pub struct ConcatModel {
    pub conv1: Arc<Module>,
    pub conv2: Arc<Module>,
    pub conv3: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl ConcatModel {
    pub fn new() -> Self {
        let conv1 = Module::conv2d(3, 6, 3, 1, 1, false);
        let conv2 = Module::conv2d(3, 5, 3, 1, 1, false);
        let conv3 = Module::conv2d(3, 3, 3, 1, 1, false);
        let fc = Module::linear(14 * 8 * 8, 3);

        let root = Module::custom(
            "ConcatModel",
            vec![
                ("conv1", conv1.clone()),
                ("conv2", conv2.clone()),
                ("conv3", conv3.clone()),
                ("fc", fc.clone()),
            ],
        );

        ConcatModel {
            conv1,
            conv2,
            conv3,
            fc,
            device: Device::Cpu,
            root,
        }
    }
}

impl Model for ConcatModel {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let c1 = tracer.call(&self.conv1, nth_input(inputs, 0)?)?;
        let c2 = tracer.call(&self.conv2, nth_input(inputs, 1)?)?;
        let c3 = tracer.call(&self.conv3, nth_input(inputs, 2)?)?;

        let x = tracer.cat(&[c1, c2, c3], 1)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}

/// Modules stored in indexed containers and invoked out of order, for `1x3x8x8` inputs.
#[derive(Debug)]
pub struct ModuleListModel {
    pub mod_list: Arc<Module>,
    pub seq_list: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl ModuleListModel {
    pub fn new() -> Self {
        let mod_list = Module::module_list(vec![
            Module::max_pool2d(2, 2, 1),
            Module::relu(true),
            Module::conv2d(16, 8, 2, 2, 2, true),
            Module::relu(false),
            Module::conv2d(3, 16, 2, 2, 2, false),
            Module::batch_norm2d(16),
        ]);
        let seq_list = Module::sequential(vec![
            Module::conv2d(8, 4, 2, 2, 2, true),
            Module::relu(false),
            Module::batch_norm2d(16),
        ]);
        let fc = Module::linear(64, 3);

        let root = Module::custom(
            "ModuleListModel",
            vec![
                ("mod_list", mod_list.clone()),
                ("seq_list", seq_list.clone()),
                ("fc", fc.clone()),
            ],
        );

        ModuleListModel {
            mod_list,
            seq_list,
            fc,
            device: Device::Cpu,
            root,
        }
    }

    pub fn mod_list(&self, index: usize) -> &Arc<Module> {
        &self.mod_list.children()[index].1
    }

    pub fn seq_list(&self, index: usize) -> &Arc<Module> {
        &self.seq_list.children()[index].1
    }
}

impl Model for ModuleListModel {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let x = tracer.call(self.mod_list(4), nth_input(inputs, 0)?)?;
        let x = tracer.call(self.seq_list(2), &x)?;
        let x = tracer.call(self.mod_list(1), &x)?;
        let x = tracer.call(self.mod_list(0), &x)?;
        let x = tracer.call(self.mod_list(2), &x)?;
        let x = tracer.call(self.seq_list(0), &x)?;
        let x = tracer.call(self.mod_list(3), &x)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}

/// A small classifier with both element and channel dropout, for `1x3x32x32` inputs.
#[derive(Debug)]
pub struct ModelWithDropouts {
    pub conv1: Arc<Module>,
    pub bn1: Arc<Module>,
    pub relu1: Arc<Module>,
    pub dropout1: Arc<Module>,
    pub dropout2: Arc<Module>,
    pub maxpool: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl ModelWithDropouts {
    pub fn new() -> Self {
        let conv1 = Module::conv2d(3, 32, 2, 2, 2, false);
        let bn1 = Module::batch_norm2d(32);
        let relu1 = Module::relu(true);
        let dropout1 = Module::dropout(0.4);
        let dropout2 = Module::dropout2d(0.6);
        let maxpool = Module::max_pool2d(2, 2, 1);
        let fc = Module::linear(3200, 10);

        let root = Module::custom(
            "ModelWithDropouts",
            vec![
                ("conv1", conv1.clone()),
                ("bn1", bn1.clone()),
                ("relu1", relu1.clone()),
                ("dropout1", dropout1.clone()),
                ("dropout2", dropout2.clone()),
                ("maxpool", maxpool.clone()),
                ("fc", fc.clone()),
            ],
        );

        ModelWithDropouts {
            conv1,
            bn1,
            relu1,
            dropout1,
            dropout2,
            maxpool,
            fc,
            device: Device::Cpu,
            root,
        }
    }
}

impl Model for ModelWithDropouts {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let x = tracer.call(&self.conv1, nth_input(inputs, 0)?)?;
        let x = tracer.call(&self.bn1, &x)?;
        let x = tracer.call(&self.relu1, &x)?;
        let x = tracer.call(&self.dropout1, &x)?;
        let x = tracer.call(&self.dropout2, &x)?;
        let x = tracer.call(&self.maxpool, &x)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}

/// A model that invokes the same activation module twice, for `1x3x32x32` inputs.
#[derive(Debug)]
pub struct ModelWithReusedNodes {
    pub conv1: Arc<Module>,
    pub bn1: Arc<Module>,
    pub relu1: Arc<Module>,
    pub relu2: Arc<Module>,
    pub fc: Arc<Module>,
    pub device: Device,
    root: Arc<Module>,
}

impl ModelWithReusedNodes {
    pub fn new() -> Self {
        let conv1 = Module::conv2d(3, 8, 2, 2, 2, false);
        let bn1 = Module::batch_norm2d(8);
        let relu1 = Module::relu(true);
        let relu2 = Module::relu(true);
        let fc = Module::linear(2592, 10);

        let root = Module::custom(
            "ModelWithReusedNodes",
            vec![
                ("conv1", conv1.clone()),
                ("bn1", bn1.clone()),
                ("relu1", relu1.clone()),
                ("relu2", relu2.clone()),
                ("fc", fc.clone()),
            ],
        );

        ModelWithReusedNodes {
            conv1,
            bn1,
            relu1,
            relu2,
            fc,
            device: Device::Cpu,
            root,
        }
    }
}

impl Model for ModelWithReusedNodes {
    fn root(&self) -> &Arc<Module> {
        &self.root
    }

    fn device(&self) -> Device {
        self.device
    }

    fn forward(&self, tracer: &mut Tracer, inputs: &[TracedTensor]) -> TraceResult<Vec<TracedTensor>> {
        let x = tracer.call(&self.conv1, nth_input(inputs, 0)?)?;
        let x = tracer.call(&self.relu1, &x)?;
        let x = tracer.call(&self.bn1, &x)?;
        let x = tracer.call(&self.relu1, &x)?;
        let x = flatten_batch(tracer, &x)?;
        let x = tracer.call(&self.fc, &x)?;

        Ok(vec![x])
    }
}
