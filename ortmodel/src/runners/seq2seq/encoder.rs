use std::{collections::BTreeMap, num::NonZeroUsize};

use crate::{
    Error,
    binding::{IoBinder, OutputRole, OutputSpec, ShapeParams},
    config::NormalizedConfig,
    device::Tensor,
};

/// How an encoder graph consumes its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    /// Token ids, with an attention mask when the graph declares one.
    Token,
    /// Spectrogram features `(batch, feature_size, frames)`. The encoder output has
    /// `frames / downsampling` positions.
    Spectrogram {
        downsampling: NonZeroUsize,
    },
}

const WHISPER_DOWNSAMPLING: NonZeroUsize = match NonZeroUsize::new(2) {
    Some(factor) => factor,
    None => unreachable!(),
};

impl EncoderKind {
    /// Spectrogram variant, failing with [`Error::ZeroDownsampling`] for a zero factor.
    pub fn spectrogram(downsampling: usize) -> Result<Self, Error> {
        NonZeroUsize::new(downsampling)
            .map(|downsampling| EncoderKind::Spectrogram {
                downsampling,
            })
            .ok_or(Error::ZeroDownsampling)
    }

    pub const fn main_input_name(&self) -> &'static str {
        match self {
            EncoderKind::Token => "input_ids",
            EncoderKind::Spectrogram {
                ..
            } => "input_features",
        }
    }
}

/// Encoder variants of the speech models, keyed by model type.
#[derive(Debug, Clone)]
pub struct EncoderRegistry {
    kinds: BTreeMap<String, EncoderKind>,
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "whisper",
            EncoderKind::Spectrogram {
                downsampling: WHISPER_DOWNSAMPLING,
            },
        );
        registry
    }
}

impl EncoderRegistry {
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        model_type: impl Into<String>,
        kind: EncoderKind,
    ) -> &mut Self {
        self.kinds.insert(model_type.into(), kind);
        self
    }

    pub fn supported(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }

    /// Fails with [`Error::UnsupportedArchitecture`] for model types nobody registered.
    pub fn resolve(
        &self,
        model_type: &str,
    ) -> Result<EncoderKind, Error> {
        self.kinds.get(model_type).copied().ok_or_else(|| Error::UnsupportedArchitecture {
            model_type: model_type.to_string(),
            supported: self.supported(),
        })
    }
}

/// What the encoder of one episode is fed.
#[derive(Debug, Clone)]
pub enum EncoderInput {
    Tokens {
        input_ids: Tensor,
        attention_mask: Option<Tensor>,
    },
    Features {
        input_features: Tensor,
    },
}

impl EncoderInput {
    pub fn tokens(
        input_ids: Tensor,
        attention_mask: Option<Tensor>,
    ) -> Self {
        EncoderInput::Tokens {
            input_ids,
            attention_mask,
        }
    }

    pub fn features(input_features: Tensor) -> Self {
        EncoderInput::Features {
            input_features,
        }
    }

    pub fn attention_mask(&self) -> Option<&Tensor> {
        match self {
            EncoderInput::Tokens {
                attention_mask,
                ..
            } => attention_mask.as_ref(),
            EncoderInput::Features {
                ..
            } => None,
        }
    }
}

pub struct Encoder {
    binder: IoBinder,
    kind: EncoderKind,
}

impl Encoder {
    pub fn new(
        binder: IoBinder,
        kind: EncoderKind,
    ) -> Self {
        Self {
            binder,
            kind,
        }
    }

    pub fn kind(&self) -> EncoderKind {
        self.kind
    }

    pub fn binder(&self) -> &IoBinder {
        &self.binder
    }

    pub(crate) fn binder_mut(&mut self) -> &mut IoBinder {
        &mut self.binder
    }

    /// Runs the encoder and returns its `last_hidden_state`.
    pub fn forward(
        &self,
        input: &EncoderInput,
        config: &NormalizedConfig,
    ) -> Result<Tensor, Error> {
        let (feed, params) = match (self.kind, input) {
            (
                EncoderKind::Token,
                EncoderInput::Tokens {
                    input_ids,
                    attention_mask,
                },
            ) => {
                let mut feed = vec![("input_ids", input_ids)];
                if self.binder.has_input("attention_mask") {
                    let attention_mask =
                        attention_mask.as_ref().ok_or_else(|| Error::MissingInput("attention_mask".to_string()))?;
                    feed.push(("attention_mask", attention_mask));
                }
                (feed, ShapeParams::new(input_ids.dim(0)?, input_ids.dim(1)?))
            },
            (
                EncoderKind::Spectrogram {
                    downsampling,
                },
                EncoderInput::Features {
                    input_features,
                },
            ) => {
                let frames = input_features.dim(2)?;
                (vec![("input_features", input_features)], ShapeParams::new(input_features.dim(0)?, frames / downsampling.get()))
            },
            (kind, _) => return Err(Error::MissingInput(kind.main_input_name().to_string())),
        };
        let outputs = [OutputSpec::new("last_hidden_state", OutputRole::HiddenState)];
        self.binder.run(&feed, &outputs, config, &params)?.take("last_hidden_state")
    }
}
