use std::borrow::Cow;

use super::{PlannedOutput, ReportedShape, TensorMap};
use crate::{
    Error,
    device::{DeviceBuffer, DeviceContext, Tensor},
};

#[derive(Debug)]
struct BoundInput<'a> {
    name: String,
    tensor: Cow<'a, Tensor>,
}

#[derive(Debug)]
struct BoundOutput {
    name: String,
    buffer: DeviceBuffer,
    reported_shape: ReportedShape,
}

/// Inputs and pre-allocated outputs of exactly one bound invocation.
///
/// Inputs already resident on the target device are borrowed and handed to the engine by
/// address. The binding is consumed when the outputs are collected.
pub struct IoBinding<'a> {
    context: &'a dyn DeviceContext,
    inputs: Vec<BoundInput<'a>>,
    outputs: Vec<BoundOutput>,
}

impl<'a> IoBinding<'a> {
    pub fn new(context: &'a dyn DeviceContext) -> Self {
        Self {
            context,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn bind_input(
        &mut self,
        name: &str,
        tensor: Cow<'a, Tensor>,
    ) {
        self.inputs.push(BoundInput {
            name: name.to_string(),
            tensor,
        });
    }

    pub fn bind_output(
        &mut self,
        name: &str,
        planned: PlannedOutput,
    ) {
        self.outputs.push(BoundOutput {
            name: name.to_string(),
            buffer: planned.buffer,
            reported_shape: planned.reported_shape,
        });
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.inputs.iter().map(|input| (input.name.as_str(), input.tensor.as_ref()))
    }

    pub fn input(
        &self,
        name: &str,
    ) -> Option<&Tensor> {
        self.inputs.iter().find(|input| input.name == name).map(|input| input.tensor.as_ref())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|output| output.name.as_str())
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = (&str, &mut DeviceBuffer)> {
        self.outputs.iter_mut().map(|output| (output.name.as_str(), &mut output.buffer))
    }

    pub fn output_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut DeviceBuffer> {
        self.outputs.iter_mut().find(|output| output.name == name).map(|output| &mut output.buffer)
    }

    /// Waits until every input copy queued on the device has landed.
    pub fn synchronize_inputs(&self) {
        self.context.synchronize();
    }

    /// Waits until the engine has finished writing every output.
    pub fn synchronize_outputs(&self) {
        self.context.synchronize();
    }

    /// Turns the written buffers into tensors. Call only after [`Self::synchronize_outputs`].
    pub(crate) fn into_outputs(self) -> Result<TensorMap, Error> {
        let mut outputs = TensorMap::new();
        for output in self.outputs {
            let shape = output.reported_shape.resolve(output.buffer.num_elements())?;
            outputs.insert(output.name, Tensor::from_buffer_with_shape(output.buffer, &shape)?);
        }
        Ok(outputs)
    }
}
