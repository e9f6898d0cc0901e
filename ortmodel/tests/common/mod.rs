#![allow(dead_code)]
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fs,
    path::Path,
    rc::Rc,
};

use ortmodel::{
    EngineError, Error,
    backends::HostContext,
    binding::{IoBinding, TensorMap},
    config::{NormalizedConfig, SessionOptions},
    device::{AllocError, Device, DeviceContext, ElementType, ExecutionProvider, NativeBuffer, ProviderOptions, Tensor},
    session::{Dimension, Engine, InferenceSession, TensorSignature},
};

pub const HIDDEN_SIZE: usize = 8;
pub const NUM_HEADS: usize = 2;
pub const HEAD_DIM: usize = HIDDEN_SIZE / NUM_HEADS;
pub const NUM_LAYERS: usize = 2;
pub const VOCAB_SIZE: usize = 11;

pub type Compute = Rc<dyn Fn(&TensorMap) -> Vec<Tensor>>;

/// A scripted graph: declared signatures plus a function producing every output in order.
#[derive(Clone)]
pub struct Graph {
    pub inputs: Vec<TensorSignature>,
    pub outputs: Vec<TensorSignature>,
    pub compute: Compute,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub graph: String,
    pub bound: bool,
    pub inputs: TensorMap,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub invocations: RefCell<Vec<Invocation>>,
    pub synchronizations: Cell<usize>,
}

impl Recorder {
    pub fn count(
        &self,
        graph: &str,
    ) -> usize {
        self.invocations.borrow().iter().filter(|invocation| invocation.graph == graph).count()
    }

    pub fn last(
        &self,
        graph: &str,
    ) -> Invocation {
        self.invocations
            .borrow()
            .iter()
            .rev()
            .find(|invocation| invocation.graph == graph)
            .cloned()
            .unwrap_or_else(|| panic!("{graph} was never invoked"))
    }

    pub fn total(&self) -> usize {
        self.invocations.borrow().len()
    }
}

pub struct MockSession {
    name: String,
    graph: Graph,
    providers: Vec<ExecutionProvider>,
    /// Provider `set_providers` refuses to switch to.
    rejected_provider: Option<ExecutionProvider>,
    recorder: Rc<Recorder>,
}

impl MockSession {
    pub fn new(
        name: &str,
        graph: Graph,
        providers: Vec<ExecutionProvider>,
        recorder: Rc<Recorder>,
    ) -> Self {
        Self {
            name: name.to_string(),
            graph,
            providers,
            rejected_provider: None,
            recorder,
        }
    }

    pub fn rejecting(
        mut self,
        provider: Option<ExecutionProvider>,
    ) -> Self {
        self.rejected_provider = provider;
        self
    }

    fn record(
        &self,
        inputs: TensorMap,
        bound: bool,
    ) -> Vec<Tensor> {
        let outputs = (self.graph.compute)(&inputs);
        self.recorder.invocations.borrow_mut().push(Invocation {
            graph: self.name.clone(),
            bound,
            inputs,
        });
        outputs
    }
}

impl InferenceSession for MockSession {
    fn inputs(&self) -> &[TensorSignature] {
        &self.graph.inputs
    }

    fn outputs(&self) -> &[TensorSignature] {
        &self.graph.outputs
    }

    fn providers(&self) -> Vec<ExecutionProvider> {
        self.providers.clone()
    }

    fn set_providers(
        &mut self,
        providers: &[ExecutionProvider],
        _provider_options: &ProviderOptions,
    ) -> Result<(), EngineError> {
        if let Some(rejected) = self.rejected_provider.filter(|rejected| providers.contains(rejected)) {
            return Err(format!("{} cannot run on {rejected}", self.name).into());
        }
        self.providers = providers.to_vec();
        Ok(())
    }

    fn run(
        &self,
        inputs: &[(&str, &Tensor)],
    ) -> Result<Vec<Tensor>, EngineError> {
        let mut feed = TensorMap::new();
        for (name, tensor) in inputs {
            if tensor.device() != Device::Cpu {
                return Err(format!("unbound input {name} is not on the host").into());
            }
            feed.insert(*name, (*tensor).clone());
        }
        Ok(self.record(feed, false))
    }

    fn run_with_binding(
        &self,
        binding: &mut IoBinding<'_>,
    ) -> Result<(), EngineError> {
        let mut feed = TensorMap::new();
        for (name, tensor) in binding.inputs() {
            feed.insert(name, tensor.clone());
        }
        let produced = self.record(feed, true);
        for (signature, tensor) in self.graph.outputs.iter().zip(produced) {
            let Some(buffer) = binding.output_mut(&signature.name) else {
                continue;
            };
            if buffer.size_in_bytes() != tensor.size_in_bytes() {
                return Err(format!(
                    "{} buffer holds {} bytes, graph produced {}",
                    signature.name,
                    buffer.size_in_bytes(),
                    tensor.size_in_bytes()
                )
                .into());
            }
            buffer.native_mut().write(0, &tensor.to_bytes());
        }
        Ok(())
    }
}

/// Host memory context that counts barriers.
pub struct CountingContext {
    inner: HostContext,
    recorder: Rc<Recorder>,
}

impl DeviceContext for CountingContext {
    fn device(&self) -> Device {
        self.inner.device()
    }

    fn create_buffer(
        &self,
        size: usize,
    ) -> Result<Box<dyn NativeBuffer>, AllocError> {
        self.inner.create_buffer(size)
    }

    fn synchronize(&self) {
        self.recorder.synchronizations.set(self.recorder.synchronizations.get() + 1);
    }
}

pub struct MockEngine {
    graphs: HashMap<String, Graph>,
    rejections: HashMap<String, ExecutionProvider>,
    available: Vec<ExecutionProvider>,
    pub recorder: Rc<Recorder>,
}

impl MockEngine {
    pub fn new(available: &[ExecutionProvider]) -> Self {
        Self {
            graphs: HashMap::new(),
            rejections: HashMap::new(),
            available: available.to_vec(),
            recorder: Rc::new(Recorder::default()),
        }
    }

    pub fn with_graph(
        mut self,
        file_name: &str,
        graph: Graph,
    ) -> Self {
        self.graphs.insert(file_name.to_string(), graph);
        self
    }

    /// Sessions of `file_name` fail to move onto `provider`.
    pub fn rejecting_provider(
        mut self,
        file_name: &str,
        provider: ExecutionProvider,
    ) -> Self {
        self.rejections.insert(file_name.to_string(), provider);
        self
    }

    pub fn session(
        &self,
        file_name: &str,
        provider: ExecutionProvider,
    ) -> Box<dyn InferenceSession> {
        let graph = self.graphs[file_name].clone();
        Box::new(
            MockSession::new(file_name, graph, provider.with_fallbacks(), self.recorder.clone())
                .rejecting(self.rejections.get(file_name).copied()),
        )
    }

    pub fn context(
        &self,
        device: Device,
    ) -> Rc<dyn DeviceContext> {
        Rc::new(CountingContext {
            inner: HostContext::new(device),
            recorder: self.recorder.clone(),
        })
    }
}

impl Engine for MockEngine {
    fn available_providers(&self) -> Vec<ExecutionProvider> {
        self.available.clone()
    }

    fn load(
        &self,
        path: &Path,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>, EngineError> {
        let file_name = path.file_name().and_then(|name| name.to_str()).ok_or("graph path has no file name")?;
        let graph = self.graphs.get(file_name).ok_or_else(|| format!("no graph named {file_name}"))?.clone();
        if !path.is_file() {
            return Err(format!("{} does not exist", path.display()).into());
        }
        Ok(Box::new(
            MockSession::new(file_name, graph, options.providers.clone(), self.recorder.clone())
                .rejecting(self.rejections.get(file_name).copied()),
        ))
    }

    fn device_context(
        &self,
        device: Device,
    ) -> Result<Rc<dyn DeviceContext>, Error> {
        Ok(self.context(device))
    }
}

pub fn cuda() -> Device {
    Device::Cuda {
        ordinal: 0,
    }
}

pub fn symbolic(names: &[&str]) -> Vec<Dimension> {
    names.iter().map(|name| Dimension::Symbolic(name.to_string())).collect()
}

pub fn signature(
    name: &str,
    element_type: ElementType,
    dims: &[&str],
) -> TensorSignature {
    TensorSignature::new(name, element_type, symbolic(dims))
}

/// Deterministic `f32` tensor whose values depend on `seed`.
pub fn filled(
    shape: &[usize],
    seed: f32,
) -> Tensor {
    let count: usize = shape.iter().product();
    let values: Vec<f32> = (0..count).map(|index| seed + index as f32 * 0.5).collect();
    Tensor::from_slice(shape, &values).unwrap()
}

pub fn ids(
    shape: &[usize],
    start: i64,
) -> Tensor {
    let count: usize = shape.iter().product();
    let values: Vec<i64> = (0..count as i64).map(|index| start + index).collect();
    Tensor::from_slice(shape, &values).unwrap()
}

pub fn ones(shape: &[usize]) -> Tensor {
    let count: usize = shape.iter().product();
    Tensor::from_slice(shape, &vec![1i64; count]).unwrap()
}

pub fn seed_of(tensor: &Tensor) -> f32 {
    match tensor.data_type() {
        ortmodel::DataType::I64 => tensor.to_vec::<i64>().unwrap().iter().sum::<i64>() as f32,
        _ => tensor.to_vec::<f32>().unwrap().iter().sum(),
    }
}

pub fn text_inputs(
    batch_size: usize,
    sequence_length: usize,
) -> TensorMap {
    let mut inputs = TensorMap::new();
    inputs.insert("input_ids", ids(&[batch_size, sequence_length], 3));
    inputs.insert("attention_mask", ones(&[batch_size, sequence_length]));
    inputs
}

fn text_signatures(with_token_type_ids: bool) -> Vec<TensorSignature> {
    let mut inputs = vec![
        signature("input_ids", ElementType::Int64, &["batch_size", "sequence_length"]),
        signature("attention_mask", ElementType::Int64, &["batch_size", "sequence_length"]),
    ];
    if with_token_type_ids {
        inputs.push(signature("token_type_ids", ElementType::Int64, &["batch_size", "sequence_length"]));
    }
    inputs
}

/// Text graph declaring `outputs` as `f32` tensors, computed by `compute`.
pub fn text_graph(
    outputs: &[&str],
    compute: Compute,
) -> Graph {
    Graph {
        inputs: text_signatures(true),
        outputs: outputs.iter().map(|name| signature(name, ElementType::Float, &["batch_size", "n"])).collect(),
        compute,
    }
}

pub fn sequence_classification_graph(num_labels: usize) -> Graph {
    text_graph(
        &["logits"],
        Rc::new(move |inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            vec![filled(&[input_ids.shape()[0], num_labels], seed_of(input_ids))]
        }),
    )
}

pub fn token_classification_graph(num_labels: usize) -> Graph {
    text_graph(
        &["logits"],
        Rc::new(move |inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let shape = input_ids.shape();
            vec![filled(&[shape[0], shape[1], num_labels], seed_of(input_ids))]
        }),
    )
}

/// Multiple choice graph over `(batch, num_choices, seq_len)` inputs.
pub fn multiple_choice_graph() -> Graph {
    text_graph(
        &["logits"],
        Rc::new(|inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let shape = input_ids.shape();
            vec![filled(&[shape[0], shape[1]], seed_of(input_ids))]
        }),
    )
}

pub fn feature_extraction_graph() -> Graph {
    text_graph(
        &["last_hidden_state"],
        Rc::new(|inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let shape = input_ids.shape();
            vec![filled(&[shape[0], shape[1], HIDDEN_SIZE], seed_of(input_ids))]
        }),
    )
}

pub fn question_answering_graph() -> Graph {
    text_graph(
        &["start_logits", "end_logits"],
        Rc::new(|inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let shape = input_ids.shape();
            let seed = seed_of(input_ids);
            vec![filled(&shape[..2], seed), filled(&shape[..2], -seed)]
        }),
    )
}

pub fn image_classification_graph(num_labels: usize) -> Graph {
    Graph {
        inputs: vec![signature("pixel_values", ElementType::Float, &["batch_size", "channels", "height", "width"])],
        outputs: vec![signature("logits", ElementType::Float, &["batch_size", "num_labels"])],
        compute: Rc::new(move |inputs: &TensorMap| {
            let pixel_values = inputs.get("pixel_values").unwrap();
            vec![filled(&[pixel_values.shape()[0], num_labels], seed_of(pixel_values))]
        }),
    }
}

pub fn classifier_config(num_labels: usize) -> NormalizedConfig {
    NormalizedConfig {
        model_type: "bert".to_string(),
        hidden_size: HIDDEN_SIZE,
        num_attention_heads: NUM_HEADS,
        num_layers: Some(NUM_LAYERS),
        vocab_size: Some(VOCAB_SIZE),
        num_labels,
    }
}

pub fn seq2seq_config(model_type: &str) -> NormalizedConfig {
    NormalizedConfig {
        model_type: model_type.to_string(),
        hidden_size: HIDDEN_SIZE,
        num_attention_heads: NUM_HEADS,
        num_layers: Some(NUM_LAYERS),
        vocab_size: Some(VOCAB_SIZE),
        num_labels: 2,
    }
}

pub fn write_config(
    dir: &Path,
    json: &str,
) {
    fs::write(dir.join("config.json"), json).unwrap();
}

pub fn touch(
    dir: &Path,
    file_name: &str,
) {
    fs::write(dir.join(file_name), b"").unwrap();
}

pub fn token_encoder_graph() -> Graph {
    Graph {
        inputs: vec![
            signature("input_ids", ElementType::Int64, &["batch_size", "encoder_sequence_length"]),
            signature("attention_mask", ElementType::Int64, &["batch_size", "encoder_sequence_length"]),
        ],
        outputs: vec![signature("last_hidden_state", ElementType::Float, &[
            "batch_size",
            "encoder_sequence_length",
            "hidden_size",
        ])],
        compute: Rc::new(|inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let shape = input_ids.shape();
            vec![filled(&[shape[0], shape[1], HIDDEN_SIZE], seed_of(input_ids))]
        }),
    }
}

pub fn spectrogram_encoder_graph() -> Graph {
    Graph {
        inputs: vec![signature("input_features", ElementType::Float, &["batch_size", "feature_size", "frames"])],
        outputs: vec![signature("last_hidden_state", ElementType::Float, &[
            "batch_size",
            "encoder_sequence_length",
            "hidden_size",
        ])],
        compute: Rc::new(|inputs: &TensorMap| {
            let features = inputs.get("input_features").unwrap();
            let shape = features.shape();
            vec![filled(&[shape[0], shape[2] / 2, HIDDEN_SIZE], 1.0)]
        }),
    }
}

fn cache_names(prefix: &str) -> Vec<String> {
    let mut names = Vec::new();
    for layer in 0..NUM_LAYERS {
        for part in ["decoder.key", "decoder.value", "encoder.key", "encoder.value"] {
            names.push(format!("{prefix}.{layer}.{part}"));
        }
    }
    names
}

/// Decoder graph. With `with_past` it also takes the previous cache and expects one new token.
///
/// Self-attention cache values encode the step: `present = past + 1` element-wise on cached
/// positions, new positions hold the token id.
pub fn decoder_graph(
    with_past: bool,
    with_encoder_attention_mask: bool,
) -> Graph {
    let mut inputs = vec![signature("input_ids", ElementType::Int64, &["batch_size", "decoder_sequence_length"])];
    if with_encoder_attention_mask {
        inputs.push(signature("encoder_attention_mask", ElementType::Int64, &[
            "batch_size",
            "encoder_sequence_length",
        ]));
    }
    inputs.push(signature("encoder_hidden_states", ElementType::Float, &[
        "batch_size",
        "encoder_sequence_length",
        "hidden_size",
    ]));
    if with_past {
        for name in cache_names("past_key_values") {
            inputs.push(signature(&name, ElementType::Float, &["batch_size", "heads", "past_length", "head_dim"]));
        }
    }

    let mut outputs =
        vec![signature("logits", ElementType::Float, &["batch_size", "decoder_sequence_length", "vocab_size"])];
    for name in cache_names("present") {
        outputs.push(signature(&name, ElementType::Float, &["batch_size", "heads", "length", "head_dim"]));
    }

    let past_names = cache_names("past_key_values");
    Graph {
        inputs,
        outputs,
        compute: Rc::new(move |inputs: &TensorMap| {
            let input_ids = inputs.get("input_ids").unwrap();
            let encoder_hidden_states = inputs.get("encoder_hidden_states").unwrap();
            let batch_size = input_ids.shape()[0];
            let sequence_length = input_ids.shape()[1];
            let encoder_sequence_length = encoder_hidden_states.shape()[1];
            let past_length = if with_past {
                inputs.get(&past_names[0]).unwrap().shape()[2]
            } else {
                0
            };

            let mut produced = vec![filled(&[batch_size, sequence_length, VOCAB_SIZE], seed_of(input_ids))];
            for (index, past_name) in past_names.iter().enumerate() {
                let is_self_attention = index % 4 < 2;
                if is_self_attention {
                    let total = past_length + sequence_length;
                    let shape = [batch_size, NUM_HEADS, total, HEAD_DIM];
                    let past = inputs.get(past_name).map(|tensor| tensor.to_vec::<f32>().unwrap());
                    let mut values = vec![0.0f32; shape.iter().product()];
                    for (flat, value) in values.iter_mut().enumerate() {
                        let position = (flat / HEAD_DIM) % total;
                        let row = flat / (HEAD_DIM * total);
                        let column = flat % HEAD_DIM;
                        *value = match &past {
                            Some(past) if position < past_length => {
                                past[(row * past_length + position) * HEAD_DIM + column] + 1.0
                            },
                            _ => (index * 100 + position) as f32,
                        };
                    }
                    produced.push(Tensor::from_slice(&shape, &values).unwrap());
                } else {
                    produced.push(filled(&[batch_size, NUM_HEADS, encoder_sequence_length, HEAD_DIM], index as f32));
                }
            }
            produced
        }),
    }
}

/// Cold decoder graph that also takes `labels` and reports a `[1]` loss right after the logits.
///
/// The loss holds the sum of the label ids.
pub fn decoder_with_loss_graph() -> Graph {
    let mut graph = decoder_graph(false, false);
    graph.inputs.push(signature("labels", ElementType::Int64, &["batch_size", "decoder_sequence_length"]));
    graph.outputs.insert(1, signature("loss", ElementType::Float, &["loss"]));
    let compute = graph.compute.clone();
    graph.compute = Rc::new(move |inputs: &TensorMap| {
        let mut produced = compute(inputs);
        produced.insert(1, filled(&[1], seed_of(inputs.get("labels").unwrap())));
        produced
    });
    graph
}

/// Graph declaring a string input, which has no host tensor type.
pub fn string_input_graph() -> Graph {
    Graph {
        inputs: vec![signature("text", ElementType::String, &["batch_size"])],
        outputs: vec![signature("logits", ElementType::Float, &["batch_size", "num_labels"])],
        compute: Rc::new(|_: &TensorMap| vec![filled(&[1, 2], 0.0)]),
    }
}
