use std::{fs::File, io::BufReader, path::Path};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read model configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse model configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Model configuration for `{model_type}` has no `{field}`")]
    MissingField {
        model_type: String,
        field: &'static str,
    },
    #[error("`{field}` must be a non-negative integer")]
    InvalidField {
        field: &'static str,
    },
    #[error("Hidden size {hidden_size} is not divisible by {num_attention_heads} attention heads")]
    IndivisibleHeads {
        hidden_size: usize,
        num_attention_heads: usize,
    },
}

/// Config keys holding the shape parameters for one model family.
struct FieldNames {
    hidden_size: &'static str,
    num_attention_heads: &'static str,
    num_layers: &'static [&'static str],
}

fn field_names(model_type: &str) -> FieldNames {
    match model_type {
        "t5" | "mt5" | "longt5" => FieldNames {
            hidden_size: "d_model",
            num_attention_heads: "num_heads",
            num_layers: &["num_decoder_layers", "num_layers"],
        },
        "bart" | "mbart" | "marian" | "m2m_100" | "pegasus" | "blenderbot" | "blenderbot-small" | "whisper" => {
            FieldNames {
                hidden_size: "d_model",
                num_attention_heads: "decoder_attention_heads",
                num_layers: &["decoder_layers"],
            }
        },
        "gpt2" | "gpt_neo" => FieldNames {
            hidden_size: "n_embd",
            num_attention_heads: "n_head",
            num_layers: &["n_layer", "num_layers"],
        },
        "distilbert" => FieldNames {
            hidden_size: "dim",
            num_attention_heads: "n_heads",
            num_layers: &["n_layers"],
        },
        _ => FieldNames {
            hidden_size: "hidden_size",
            num_attention_heads: "num_attention_heads",
            num_layers: &["num_hidden_layers"],
        },
    }
}

const DEFAULT_NUM_LABELS: usize = 2;

/// Shape-relevant model parameters under one naming scheme, whatever the model family calls them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedConfig {
    pub model_type: String,
    pub hidden_size: usize,
    pub num_attention_heads: usize,
    pub num_layers: Option<usize>,
    pub vocab_size: Option<usize>,
    pub num_labels: usize,
}

impl NormalizedConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_value(&value)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_value(&serde_json::from_str(json)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let model_type = value.get("model_type").and_then(Value::as_str).unwrap_or_default().to_string();
        let names = field_names(&model_type);
        let required = |field: &'static str| -> Result<usize, ConfigError> {
            read_usize(value, field)?.ok_or_else(|| ConfigError::MissingField {
                model_type: model_type.clone(),
                field,
            })
        };

        let hidden_size = required(names.hidden_size)?;
        let num_attention_heads = required(names.num_attention_heads)?;
        if num_attention_heads == 0 || hidden_size % num_attention_heads != 0 {
            return Err(ConfigError::IndivisibleHeads {
                hidden_size,
                num_attention_heads,
            });
        }

        let mut num_layers = None;
        for field in names.num_layers {
            if let Some(layers) = read_usize(value, field)? {
                num_layers = Some(layers);
                break;
            }
        }

        let num_labels = match read_usize(value, "num_labels")? {
            Some(num_labels) => num_labels,
            None => value
                .get("id2label")
                .and_then(Value::as_object)
                .map(|labels| labels.len())
                .unwrap_or(DEFAULT_NUM_LABELS),
        };

        Ok(Self {
            model_type,
            hidden_size,
            num_attention_heads,
            num_layers,
            vocab_size: read_usize(value, "vocab_size")?,
            num_labels,
        })
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

fn read_usize(
    value: &Value,
    field: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(number) => number
            .as_u64()
            .and_then(|number| usize::try_from(number).ok())
            .map(Some)
            .ok_or(ConfigError::InvalidField {
                field,
            }),
    }
}
