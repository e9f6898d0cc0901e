mod model_files;
mod normalized_config;
mod runner_options;

pub use model_files::{
    CONFIG_FILE_NAME, DECODER_FILE_NAME, DECODER_WITH_PAST_FILE_NAME, ENCODER_FILE_NAME, FileNames, GraphFile, MODEL_FILE_NAME,
    ModelFiles,
};
pub use normalized_config::{ConfigError, NormalizedConfig};
pub use runner_options::{RunnerOptions, SessionOptions};
