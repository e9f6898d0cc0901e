use crate::{
    config::ConfigError,
    device::{AllocError, DataType, ElementType, ExecutionProvider, TensorError},
};

/// Error raised by the inference engine behind a session.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Element type {0} has no host counterpart")]
    UnsupportedType(ElementType),
    #[error("Unknown element type `{0}`")]
    UnknownElementType(String),
    #[error("Execution provider {provider} is not available, available providers: {available:?}")]
    UnavailableProvider {
        provider: ExecutionProvider,
        available: Vec<ExecutionProvider>,
    },
    #[error("Unknown execution provider `{0}`")]
    UnknownProvider(String),
    #[error("Invalid device `{0}`")]
    InvalidDevice(String),
    #[error("Missing required input `{0}`")]
    MissingInput(String),
    #[error("Input `{name}` is declared as {expected}, got {actual}")]
    InputTypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[error("Model type `{model_type}` is not supported, supported types: {supported:?}")]
    UnsupportedArchitecture {
        model_type: String,
        supported: Vec<String>,
    },
    #[error("Spectrogram encoders need a downsampling factor of at least 1")]
    ZeroDownsampling,
    #[error("Unknown task `{0}`")]
    UnknownTask(String),
    #[error("Planning {role} requires `{parameter}`")]
    MissingShapeParameter {
        role: &'static str,
        parameter: &'static str,
    },
    #[error("Malformed key/value cache: {0}")]
    MalformedCache(String),
    #[error("Tensor name `{0}` is declared twice")]
    DuplicateTensorName(String),
    #[error("Graph did not produce output `{0}`")]
    MissingOutput(String),
    #[error("Runner was built from sessions, not from model files, and cannot be saved")]
    NoModelFiles,
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
