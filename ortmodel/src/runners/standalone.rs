use std::{path::Path, rc::Rc};

use tracing::{debug, warn};

use super::{Capabilities, Task, target_context};
use crate::{
    Error,
    binding::{InvocationMode, IoBinder, ShapeParams, TensorMap, resolve_io_binding},
    config::{GraphFile, ModelFiles, NormalizedConfig, RunnerOptions},
    device::{Device, DeviceContext, ExecutionProvider, Tensor},
    session::{Engine, InferenceSession},
};

/// Result of one standalone forward pass.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    BaseModel {
        last_hidden_state: Tensor,
    },
    QuestionAnswering {
        start_logits: Tensor,
        end_logits: Tensor,
    },
    Classification {
        logits: Tensor,
    },
    /// Every output of a custom graph, keyed by its declared name.
    Custom(TensorMap),
}

impl ModelOutput {
    pub fn logits(&self) -> Option<&Tensor> {
        match self {
            ModelOutput::Classification {
                logits,
            } => Some(logits),
            ModelOutput::Custom(outputs) => outputs.get("logits"),
            _ => None,
        }
    }

    pub fn last_hidden_state(&self) -> Option<&Tensor> {
        match self {
            ModelOutput::BaseModel {
                last_hidden_state,
            } => Some(last_hidden_state),
            ModelOutput::Custom(outputs) => outputs.get("last_hidden_state"),
            _ => None,
        }
    }
}

/// Runs a single-graph model for one task.
pub struct StandaloneRunner {
    task: Task,
    config: NormalizedConfig,
    binder: IoBinder,
    /// Set when loaded from a model directory.
    files: Option<ModelFiles>,
}

impl StandaloneRunner {
    pub fn new(
        task: Task,
        session: Box<dyn InferenceSession>,
        context: Rc<dyn DeviceContext>,
        config: NormalizedConfig,
        use_io_binding: Option<bool>,
    ) -> Result<Self, Error> {
        if task.is_encoder_decoder() {
            return Err(Error::UnknownTask(task.name().to_string()));
        }
        let use_io_binding = binding_flag(task, use_io_binding, &session.providers());
        Ok(Self {
            task,
            config,
            binder: IoBinder::new(session, context, use_io_binding)?,
            files: None,
        })
    }

    /// Loads the graph and `config.json` from an exported model directory.
    ///
    /// The graph is `model.onnx` unless `options` names another file or a subfolder.
    pub fn load(
        engine: &dyn Engine,
        model_dir: &Path,
        task: Task,
        options: &RunnerOptions,
    ) -> Result<Self, Error> {
        if task.is_encoder_decoder() {
            return Err(Error::UnknownTask(task.name().to_string()));
        }
        let files = options.model_files(model_dir);
        let config = NormalizedConfig::from_file(&files.config())?;
        let use_io_binding = binding_flag(task, options.use_io_binding, &options.provider.with_fallbacks());
        Ok(Self {
            task,
            config,
            binder: IoBinder::load(engine, &files.model(), options, use_io_binding)?,
            files: Some(files),
        })
    }

    /// Copies the graph and its configuration to `save_dir` under the standard file names.
    pub fn save(
        &self,
        save_dir: &Path,
    ) -> Result<(), Error> {
        let files = self.files.as_ref().ok_or(Error::NoModelFiles)?;
        files.save(save_dir, &[GraphFile::Model])?;
        Ok(())
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn config(&self) -> &NormalizedConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.binder.device()
    }

    pub fn providers(&self) -> Vec<ExecutionProvider> {
        self.binder.providers()
    }

    pub fn mode(&self) -> InvocationMode {
        self.binder.mode()
    }

    pub fn capabilities(&self) -> Capabilities {
        let (input_names, output_names) = match self.task {
            Task::Custom => (self.binder.input_table().names().to_vec(), self.binder.output_table().names().to_vec()),
            task => (
                task.input_names()
                    .iter()
                    .filter(|name| self.binder.has_input(name))
                    .map(ToString::to_string)
                    .collect(),
                task.output_names().iter().map(ToString::to_string).collect(),
            ),
        };
        Capabilities {
            task: self.task,
            input_names,
            output_names,
        }
    }

    /// Moves the graph to `device` without reloading it.
    pub fn set_execution_target(
        &mut self,
        engine: &dyn Engine,
        device: Device,
    ) -> Result<&mut Self, Error> {
        let context = target_context(engine, device)?;
        self.binder.retarget(device, context)?;
        Ok(self)
    }

    pub fn forward(
        &self,
        inputs: &TensorMap,
    ) -> Result<ModelOutput, Error> {
        match self.task {
            Task::Custom => self.forward_custom(inputs),
            Task::ImageClassification => {
                let pixel_values = require(inputs, "pixel_values")?;
                let params = ShapeParams::new(pixel_values.dim(0)?, 0);
                let mut outputs = self.run(&[("pixel_values", pixel_values)], &params)?;
                Ok(ModelOutput::Classification {
                    logits: outputs.take("logits")?,
                })
            },
            _ => self.forward_text(inputs),
        }
    }

    fn forward_text(
        &self,
        inputs: &TensorMap,
    ) -> Result<ModelOutput, Error> {
        let input_ids = require(inputs, "input_ids")?;
        let mut feed = vec![("input_ids", input_ids)];
        if self.binder.has_input("attention_mask") {
            feed.push(("attention_mask", require(inputs, "attention_mask")?));
        }
        if let Some(token_type_ids) = inputs.get("token_type_ids") {
            feed.push(("token_type_ids", token_type_ids));
        }

        let params = ShapeParams::new(input_ids.dim(0)?, input_ids.dim(1)?);
        let mut outputs = self.run(&feed, &params)?;
        let output = match self.task {
            Task::FeatureExtraction => ModelOutput::BaseModel {
                last_hidden_state: outputs.take("last_hidden_state")?,
            },
            Task::QuestionAnswering => ModelOutput::QuestionAnswering {
                start_logits: outputs.take("start_logits")?,
                end_logits: outputs.take("end_logits")?,
            },
            _ => ModelOutput::Classification {
                logits: outputs.take("logits")?,
            },
        };
        Ok(output)
    }

    fn forward_custom(
        &self,
        inputs: &TensorMap,
    ) -> Result<ModelOutput, Error> {
        let mut feed = Vec::with_capacity(self.binder.input_table().len());
        for name in self.binder.input_table().names() {
            feed.push((name.as_str(), require(inputs, name)?));
        }
        Ok(ModelOutput::Custom(self.binder.run_fallback(&feed)?))
    }

    fn run(
        &self,
        feed: &[(&str, &Tensor)],
        params: &ShapeParams,
    ) -> Result<TensorMap, Error> {
        let outputs = self.task.output_specs(self.config.num_labels, params);
        debug!(task = %self.task, batch_size = params.batch_size, "forward");
        self.binder.run(feed, &outputs, &self.config, params)
    }
}

fn binding_flag(
    task: Task,
    requested: Option<bool>,
    providers: &[ExecutionProvider],
) -> bool {
    if task == Task::Custom {
        if requested == Some(true) {
            warn!("custom tasks do not support I/O binding, inputs and outputs will be copied through the host");
        }
        return false;
    }
    resolve_io_binding(requested, providers)
}

fn require<'t>(
    inputs: &'t TensorMap,
    name: &str,
) -> Result<&'t Tensor, Error> {
    inputs.get(name).ok_or_else(|| Error::MissingInput(name.to_string()))
}
