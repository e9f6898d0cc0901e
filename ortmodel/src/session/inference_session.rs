use std::{path::Path, rc::Rc};

use tracing::debug;

use super::TensorSignature;
use crate::{
    EngineError, Error,
    backends::HostContext,
    binding::IoBinding,
    config::{RunnerOptions, SessionOptions},
    device::{Device, DeviceContext, ExecutionProvider, ProviderOptions, Tensor, validate_provider_availability},
};

/// A loaded dataflow graph owned by the inference engine.
pub trait InferenceSession {
    /// Declared inputs in graph order.
    fn inputs(&self) -> &[TensorSignature];

    /// Declared outputs in graph order.
    fn outputs(&self) -> &[TensorSignature];

    /// Active providers, highest priority first.
    fn providers(&self) -> Vec<ExecutionProvider>;

    fn set_providers(
        &mut self,
        providers: &[ExecutionProvider],
        provider_options: &ProviderOptions,
    ) -> Result<(), EngineError>;

    /// Runs the graph on host tensors and returns every declared output in graph order.
    fn run(
        &self,
        inputs: &[(&str, &Tensor)],
    ) -> Result<Vec<Tensor>, EngineError>;

    /// Runs the graph reading inputs from and writing outputs to the bound device memory.
    fn run_with_binding(
        &self,
        binding: &mut IoBinding<'_>,
    ) -> Result<(), EngineError>;
}

pub trait Engine {
    /// Providers compiled into this engine build.
    fn available_providers(&self) -> Vec<ExecutionProvider>;

    fn load(
        &self,
        path: &Path,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>, EngineError>;

    /// Allocation context for `device`. The default serves every device from host memory.
    fn device_context(
        &self,
        device: Device,
    ) -> Result<Rc<dyn DeviceContext>, Error> {
        Ok(HostContext::shared(device))
    }
}

/// Loads the graph at `path` after checking that the requested provider is available.
pub fn load_session(
    engine: &dyn Engine,
    path: &Path,
    options: &RunnerOptions,
) -> Result<Box<dyn InferenceSession>, Error> {
    validate_provider_availability(options.provider, &engine.available_providers())?;
    let session_options = options.session_options();
    debug!(path = %path.display(), providers = ?session_options.providers, "loading graph");
    Ok(engine.load(path, &session_options)?)
}
