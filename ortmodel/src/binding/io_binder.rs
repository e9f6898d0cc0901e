use std::{borrow::Cow, path::Path, rc::Rc};

use tracing::{debug, warn};

use super::{BufferPlanner, IoBinding, OutputRole, ShapeParams, TensorMap};
use crate::{
    Error,
    config::{NormalizedConfig, RunnerOptions},
    device::{Device, DeviceContext, DeviceContextExt, ExecutionProvider, ProviderOptions, Tensor},
    session::{Engine, InferenceSession, NamedTensorTable, TypeMap, load_session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Inputs and outputs live in device memory and are bound by address.
    Bound,
    /// Inputs are copied to the host and outputs are returned as host tensors.
    Fallback,
}

/// An output the caller wants back, and what it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub role: OutputRole,
}

impl OutputSpec {
    pub fn new(
        name: impl Into<String>,
        role: OutputRole,
    ) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Resolves the binding flag of a runner from the request and the providers it runs on.
///
/// Warns once when a provider that plans its own memory overrides the request.
pub fn resolve_io_binding(
    requested: Option<bool>,
    providers: &[ExecutionProvider],
) -> bool {
    if let Some(provider) = providers.iter().find(|provider| provider.manages_own_memory()) {
        if requested != Some(false) {
            warn!(%provider, "I/O binding is not needed with {provider}, disabling it");
        }
        return false;
    }
    requested.unwrap_or(true)
}

/// Device outputs of a session running on `provider` land on.
///
/// Providers with no known device fall back to the host.
pub fn execution_device(
    provider: ExecutionProvider,
    provider_options: &ProviderOptions,
) -> Device {
    match provider.device() {
        Some(Device::Cuda {
            ordinal,
        }) => Device::Cuda {
            ordinal: provider_options
                .get("device_id")
                .and_then(|device_id| device_id.parse().ok())
                .unwrap_or(ordinal),
        },
        Some(device) => device,
        None => {
            warn!(%provider, "outputs will be sent to the host as the device of {provider} is unknown");
            Device::Cpu
        },
    }
}

/// Providers and device a binder executes on, kept to undo a partial retarget.
pub(crate) struct ExecutionTarget {
    providers: Vec<ExecutionProvider>,
    provider_options: ProviderOptions,
    context: Rc<dyn DeviceContext>,
}

/// Moves tensors in and out of one inference session.
pub struct IoBinder {
    session: Box<dyn InferenceSession>,
    inputs: NamedTensorTable,
    outputs: NamedTensorTable,
    type_map: TypeMap,
    context: Rc<dyn DeviceContext>,
    provider_options: ProviderOptions,
    use_io_binding: bool,
}

impl IoBinder {
    /// Fails with [`Error::UnsupportedType`] when the graph declares a tensor type with no host counterpart,
    /// whether or not I/O binding is used.
    pub fn new(
        session: Box<dyn InferenceSession>,
        context: Rc<dyn DeviceContext>,
        use_io_binding: bool,
    ) -> Result<Self, Error> {
        let inputs = NamedTensorTable::from_signatures(session.inputs())?;
        let outputs = NamedTensorTable::from_signatures(session.outputs())?;
        let type_map = TypeMap::for_session(session.as_ref())?;
        Ok(Self {
            session,
            inputs,
            outputs,
            type_map,
            context,
            provider_options: ProviderOptions::new(),
            use_io_binding,
        })
    }

    /// Loads the graph at `path` and places it on the device of the requested provider.
    pub fn load(
        engine: &dyn Engine,
        path: &Path,
        options: &RunnerOptions,
        use_io_binding: bool,
    ) -> Result<Self, Error> {
        let session = load_session(engine, path, options)?;
        let device = execution_device(options.provider, &options.provider_options);
        let context = engine.device_context(device)?;
        let mut binder = Self::new(session, context, use_io_binding)?;
        binder.provider_options = options.provider_options.clone();
        Ok(binder)
    }

    pub fn session(&self) -> &dyn InferenceSession {
        self.session.as_ref()
    }

    pub fn input_table(&self) -> &NamedTensorTable {
        &self.inputs
    }

    pub fn output_table(&self) -> &NamedTensorTable {
        &self.outputs
    }

    pub fn has_input(
        &self,
        name: &str,
    ) -> bool {
        self.inputs.contains(name)
    }

    pub fn has_output(
        &self,
        name: &str,
    ) -> bool {
        self.outputs.contains(name)
    }

    pub fn context(&self) -> &dyn DeviceContext {
        self.context.as_ref()
    }

    pub fn device(&self) -> Device {
        self.context.device()
    }

    pub fn providers(&self) -> Vec<ExecutionProvider> {
        self.session.providers()
    }

    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    pub fn provider_options(&self) -> &ProviderOptions {
        &self.provider_options
    }

    pub fn use_io_binding(&self) -> bool {
        self.use_io_binding
    }

    pub fn mode(&self) -> InvocationMode {
        let provider_binds = self.session.providers().first().is_none_or(|provider| !provider.manages_own_memory());
        if self.use_io_binding && self.device().is_accelerator() && provider_binds {
            InvocationMode::Bound
        } else {
            InvocationMode::Fallback
        }
    }

    /// Runs the session once, picking the bound or the fallback path.
    ///
    /// `outputs` only matters on the bound path, where it decides which buffers are allocated.
    /// The fallback path returns every output the graph produced.
    pub fn run(
        &self,
        inputs: &[(&str, &Tensor)],
        outputs: &[OutputSpec],
        config: &NormalizedConfig,
        params: &ShapeParams,
    ) -> Result<TensorMap, Error> {
        let mode = self.mode();
        debug!(?mode, device = %self.device(), "running graph");
        match mode {
            InvocationMode::Bound => {
                let planner = BufferPlanner::new(config, self.context.as_ref());
                let binding = self.bind(inputs, outputs, &planner, params)?;
                self.invoke(binding)
            },
            InvocationMode::Fallback => self.run_fallback(inputs),
        }
    }

    /// Binds the declared inputs and allocates every requested declared output.
    ///
    /// Names the graph does not declare are skipped. Inputs on another device are copied over.
    pub fn bind<'t>(
        &'t self,
        inputs: &[(&str, &'t Tensor)],
        outputs: &[OutputSpec],
        planner: &BufferPlanner<'_>,
        params: &ShapeParams,
    ) -> Result<IoBinding<'t>, Error> {
        let type_map = &self.type_map;
        let context = self.context.as_ref();
        let mut binding = IoBinding::new(context);

        for &(name, tensor) in inputs {
            if !self.inputs.contains(name) {
                continue;
            }
            if let Some(expected) = type_map.input_type(name) {
                if expected != tensor.data_type() {
                    return Err(Error::InputTypeMismatch {
                        name: name.to_string(),
                        expected,
                        actual: tensor.data_type(),
                    });
                }
            }
            let bound = if tensor.device() == context.device() {
                Cow::Borrowed(tensor)
            } else {
                Cow::Owned(context.upload(tensor)?)
            };
            binding.bind_input(name, bound);
        }

        for output in outputs {
            if !self.outputs.contains(&output.name) {
                continue;
            }
            let data_type =
                type_map.output_type(&output.name).ok_or_else(|| Error::MissingOutput(output.name.clone()))?;
            binding.bind_output(&output.name, planner.plan(output.role, params, data_type)?);
        }
        Ok(binding)
    }

    /// Runs a bound invocation between the input and output barriers.
    pub fn invoke(
        &self,
        mut binding: IoBinding<'_>,
    ) -> Result<TensorMap, Error> {
        binding.synchronize_inputs();
        self.session.run_with_binding(&mut binding)?;
        binding.synchronize_outputs();
        binding.into_outputs()
    }

    /// Copies the declared inputs to the host and matches outputs to names by position.
    pub fn run_fallback(
        &self,
        inputs: &[(&str, &Tensor)],
    ) -> Result<TensorMap, Error> {
        let host_inputs: Vec<(&str, Tensor)> = inputs
            .iter()
            .filter(|(name, _)| self.inputs.contains(name))
            .map(|&(name, tensor)| (name, tensor.to_host()))
            .collect();
        let feed: Vec<(&str, &Tensor)> = host_inputs.iter().map(|(name, tensor)| (*name, tensor)).collect();
        let produced = self.session.run(&feed)?;

        let mut outputs = TensorMap::new();
        for (position, tensor) in produced.into_iter().enumerate() {
            if let Some(name) = self.outputs.names().get(position) {
                outputs.insert(name.clone(), tensor);
            }
        }
        Ok(outputs)
    }

    /// Moves the session to `device`. The loaded graph and the type map are kept.
    pub fn retarget(
        &mut self,
        device: Device,
        context: Rc<dyn DeviceContext>,
    ) -> Result<(), Error> {
        let provider_options = device.provider_options();
        self.session.set_providers(&[device.provider()], &provider_options)?;
        self.context = context;
        self.provider_options = provider_options;
        debug!(%device, "session retargeted");
        Ok(())
    }

    pub(crate) fn target(&self) -> ExecutionTarget {
        ExecutionTarget {
            providers: self.session.providers(),
            provider_options: self.provider_options.clone(),
            context: self.context.clone(),
        }
    }

    /// Puts the session back on a target taken with [`IoBinder::target`].
    pub(crate) fn restore(
        &mut self,
        target: ExecutionTarget,
    ) -> Result<(), Error> {
        self.session.set_providers(&target.providers, &target.provider_options)?;
        self.context = target.context;
        self.provider_options = target.provider_options;
        debug!(device = %self.device(), "session restored");
        Ok(())
    }
}
