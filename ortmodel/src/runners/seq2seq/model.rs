use std::{path::Path, rc::Rc};

use tracing::{debug, warn};

use super::{Cache, Decoder, DecoderInput, Encoder, EncoderInput, EncoderKind, EncoderRegistry};
use crate::{
    Error,
    binding::{InvocationMode, IoBinder, resolve_io_binding},
    config::{GraphFile, ModelFiles, NormalizedConfig, RunnerOptions},
    device::{Device, DeviceContext, ExecutionProvider, Tensor},
    runners::{Capabilities, Task, target_context},
    session::{Engine, InferenceSession},
};

/// The graphs an encoder-decoder model is split into.
pub struct Seq2SeqSessions {
    pub encoder: Box<dyn InferenceSession>,
    pub decoder: Box<dyn InferenceSession>,
    pub decoder_with_past: Option<Box<dyn InferenceSession>>,
}

/// Inputs of one generation step.
///
/// The first step of an episode carries the encoder input. Later steps pass back the encoder
/// output and the cache returned by the previous step.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub decoder_input_ids: Tensor,
    pub encoder_input: Option<EncoderInput>,
    pub encoder_output: Option<Tensor>,
    pub attention_mask: Option<Tensor>,
    pub past: Option<Cache>,
    pub labels: Option<Tensor>,
}

impl StepInput {
    pub fn new(decoder_input_ids: Tensor) -> Self {
        Self {
            decoder_input_ids,
            encoder_input: None,
            encoder_output: None,
            attention_mask: None,
            past: None,
            labels: None,
        }
    }

    /// Input of a step inside a generation loop, once the encoder has run.
    pub fn for_generation(
        decoder_input_ids: Tensor,
        encoder_output: Tensor,
        attention_mask: Option<Tensor>,
        past: Option<Cache>,
    ) -> Self {
        Self {
            encoder_output: Some(encoder_output),
            attention_mask,
            past,
            ..Self::new(decoder_input_ids)
        }
    }

    pub fn with_encoder_input(
        mut self,
        encoder_input: EncoderInput,
    ) -> Self {
        if self.attention_mask.is_none() {
            self.attention_mask = encoder_input.attention_mask().cloned();
        }
        self.encoder_input = Some(encoder_input);
        self
    }

    pub fn with_encoder_output(
        mut self,
        encoder_output: Tensor,
    ) -> Self {
        self.encoder_output = Some(encoder_output);
        self
    }

    pub fn with_attention_mask(
        mut self,
        attention_mask: Tensor,
    ) -> Self {
        self.attention_mask = Some(attention_mask);
        self
    }

    pub fn with_past(
        mut self,
        past: Cache,
    ) -> Self {
        self.past = Some(past);
        self
    }

    pub fn with_labels(
        mut self,
        labels: Tensor,
    ) -> Self {
        self.labels = Some(labels);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Seq2SeqOutput {
    pub logits: Tensor,
    pub cache: Option<Cache>,
    pub loss: Option<Tensor>,
    /// Encoder `last_hidden_state`, to be passed back on the following steps.
    pub encoder_output: Tensor,
}

/// Encoder, decoder and optional cached decoder run together as one conditional generation step.
pub struct EncoderDecoderModel {
    task: Task,
    config: NormalizedConfig,
    encoder: Encoder,
    decoder: Decoder,
    decoder_with_past: Option<Decoder>,
    /// Set when loaded from a model directory.
    files: Option<ModelFiles>,
}

impl EncoderDecoderModel {
    /// Builds a model from already loaded graphs sharing one device context.
    pub fn new(
        task: Task,
        sessions: Seq2SeqSessions,
        context: Rc<dyn DeviceContext>,
        config: NormalizedConfig,
        use_io_binding: Option<bool>,
        registry: &EncoderRegistry,
    ) -> Result<Self, Error> {
        let kind = encoder_kind(task, &config, registry)?;
        let use_io_binding = resolve_io_binding(use_io_binding, &sessions.encoder.providers());
        let encoder = Encoder::new(IoBinder::new(sessions.encoder, context.clone(), use_io_binding)?, kind);
        let decoder = Decoder::new(IoBinder::new(sessions.decoder, context.clone(), use_io_binding)?);
        let decoder_with_past = sessions
            .decoder_with_past
            .map(|session| IoBinder::new(session, context, use_io_binding).map(Decoder::new))
            .transpose()?;
        if decoder_with_past.is_none() {
            warn_no_cache(&config);
        }
        Ok(Self::assemble(task, config, encoder, decoder, decoder_with_past, None))
    }

    /// Loads the encoder, decoder and, when present, the cached decoder from a model directory.
    ///
    /// The cached decoder is skipped when `options.use_cache` is off.
    pub fn load(
        engine: &dyn Engine,
        model_dir: &Path,
        task: Task,
        options: &RunnerOptions,
    ) -> Result<Self, Error> {
        Self::load_with_registry(engine, model_dir, task, options, &EncoderRegistry::default())
    }

    pub fn load_with_registry(
        engine: &dyn Engine,
        model_dir: &Path,
        task: Task,
        options: &RunnerOptions,
        registry: &EncoderRegistry,
    ) -> Result<Self, Error> {
        let files = options.model_files(model_dir);
        let config = NormalizedConfig::from_file(&files.config())?;
        let kind = encoder_kind(task, &config, registry)?;
        let use_io_binding = resolve_io_binding(options.use_io_binding, &options.provider.with_fallbacks());

        let encoder = Encoder::new(IoBinder::load(engine, &files.encoder(), options, use_io_binding)?, kind);
        let decoder = Decoder::new(IoBinder::load(engine, &files.decoder(), options, use_io_binding)?);
        let decoder_with_past = if options.use_cache {
            let decoder_with_past = files
                .decoder_with_past()
                .map(|path| IoBinder::load(engine, &path, options, use_io_binding).map(Decoder::new))
                .transpose()?;
            if decoder_with_past.is_none() {
                warn_no_cache(&config);
            }
            decoder_with_past
        } else {
            debug!("cache disabled, not loading the decoder with past key values");
            None
        };
        Ok(Self::assemble(task, config, encoder, decoder, decoder_with_past, Some(files)))
    }

    fn assemble(
        task: Task,
        config: NormalizedConfig,
        encoder: Encoder,
        decoder: Decoder,
        decoder_with_past: Option<Decoder>,
        files: Option<ModelFiles>,
    ) -> Self {
        Self {
            task,
            config,
            encoder,
            decoder,
            decoder_with_past,
            files,
        }
    }

    /// Copies the loaded graphs and the configuration to `save_dir` under the standard file names.
    ///
    /// The cached decoder is only written when it was loaded.
    pub fn save(
        &self,
        save_dir: &Path,
    ) -> Result<(), Error> {
        let files = self.files.as_ref().ok_or(Error::NoModelFiles)?;
        let mut graphs = vec![GraphFile::Encoder, GraphFile::Decoder];
        if self.decoder_with_past.is_some() {
            graphs.push(GraphFile::DecoderWithPast);
        }
        files.save(save_dir, &graphs)?;
        Ok(())
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn config(&self) -> &NormalizedConfig {
        &self.config
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn decoder_with_past(&self) -> Option<&Decoder> {
        self.decoder_with_past.as_ref()
    }

    pub fn use_cache(&self) -> bool {
        self.decoder_with_past.is_some()
    }

    pub fn device(&self) -> Device {
        self.encoder.binder().device()
    }

    pub fn providers(&self) -> Vec<ExecutionProvider> {
        self.encoder.binder().providers()
    }

    pub fn mode(&self) -> InvocationMode {
        self.encoder.binder().mode()
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut input_names: Vec<String> = self.encoder.binder().input_table().names().to_vec();
        input_names.push("decoder_input_ids".to_string());
        if self.decoder.binder().has_input("labels") {
            input_names.push("labels".to_string());
        }
        let output_names = self
            .decoder
            .binder()
            .output_table()
            .names()
            .iter()
            .filter(|name| !name.contains(".key") && !name.contains(".value"))
            .cloned()
            .collect();
        Capabilities {
            task: self.task,
            input_names,
            output_names,
        }
    }

    /// Runs one decoding step.
    ///
    /// The encoder runs only when no encoder output is supplied. Without a cache the full
    /// decoder sequence goes through the cache-less decoder. With a cache and a cached decoder
    /// only the last decoder token is fed.
    pub fn step(
        &self,
        input: &StepInput,
    ) -> Result<Seq2SeqOutput, Error> {
        let encoder_output = match (&input.encoder_output, &input.encoder_input) {
            (Some(encoder_output), _) => encoder_output.clone(),
            (None, Some(encoder_input)) => self.encoder.forward(encoder_input, &self.config)?,
            (None, None) => return Err(Error::MissingInput(self.encoder.kind().main_input_name().to_string())),
        };
        let encoder_attention_mask =
            input.attention_mask.as_ref().or_else(|| input.encoder_input.as_ref().and_then(EncoderInput::attention_mask));

        let output = match (&input.past, &self.decoder_with_past) {
            (Some(past), Some(decoder_with_past)) => {
                let length = input.decoder_input_ids.dim(1)?;
                if length == 0 {
                    return Err(Error::MissingInput("decoder_input_ids".to_string()));
                }
                let last_token =
                    input.decoder_input_ids.narrow(1, length - 1, 1, decoder_with_past.binder().context())?;
                debug!(past_sequence_length = past.past_sequence_length()?, "warm decoder step");
                decoder_with_past.forward(
                    DecoderInput {
                        input_ids: &last_token,
                        encoder_hidden_states: &encoder_output,
                        encoder_attention_mask,
                        past: Some(past),
                        labels: input.labels.as_ref(),
                    },
                    &self.config,
                )?
            },
            _ => {
                debug!("cold decoder step");
                self.decoder.forward(
                    DecoderInput {
                        input_ids: &input.decoder_input_ids,
                        encoder_hidden_states: &encoder_output,
                        encoder_attention_mask,
                        past: None,
                        labels: input.labels.as_ref(),
                    },
                    &self.config,
                )?
            },
        };

        Ok(Seq2SeqOutput {
            logits: output.logits,
            cache: output.cache,
            loss: output.loss,
            encoder_output,
        })
    }

    /// Reorders the cache to follow the beams selected by the search.
    pub fn reorder_cache(
        &self,
        cache: &Cache,
        beam_idx: &[usize],
    ) -> Result<Cache, Error> {
        cache.reorder(beam_idx, self.decoder.binder().context())
    }

    /// Moves every graph to `device`.
    ///
    /// Either every graph moves or none does. When one session rejects the new provider,
    /// the graphs already moved are put back on their previous providers and device.
    pub fn set_execution_target(
        &mut self,
        engine: &dyn Engine,
        device: Device,
    ) -> Result<&mut Self, Error> {
        let context = target_context(engine, device)?;
        let mut binders = vec![self.encoder.binder_mut(), self.decoder.binder_mut()];
        binders.extend(self.decoder_with_past.as_mut().map(Decoder::binder_mut));
        let targets: Vec<_> = binders.iter().map(|binder| binder.target()).collect();

        for moved in 0..binders.len() {
            if let Err(error) = binders[moved].retarget(device, context.clone()) {
                warn!(%device, %error, "retarget failed, restoring {moved} graphs");
                for (binder, target) in binders.iter_mut().zip(targets).take(moved) {
                    if let Err(restore_error) = binder.restore(target) {
                        warn!(error = %restore_error, "failed to restore graph after a failed retarget");
                    }
                }
                return Err(error);
            }
        }
        Ok(self)
    }
}

fn warn_no_cache(config: &NormalizedConfig) {
    warn!(
        model_type = %config.model_type,
        "no decoder with past key values, every step will recompute the whole decoder sequence"
    );
}

fn encoder_kind(
    task: Task,
    config: &NormalizedConfig,
    registry: &EncoderRegistry,
) -> Result<EncoderKind, Error> {
    match task {
        Task::Seq2SeqLm => Ok(EncoderKind::Token),
        Task::SpeechSeq2SeqLm => registry.resolve(&config.model_type),
        task => Err(Error::UnknownTask(task.name().to_string())),
    }
}
