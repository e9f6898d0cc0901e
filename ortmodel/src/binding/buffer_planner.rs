use crate::{
    Error,
    config::NormalizedConfig,
    device::{DataType, DeviceBuffer, DeviceContext, DeviceContextExt, TensorError, element_count},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogitsLayout {
    /// `(batch, num_labels)`: sequence and image classification, multiple choice.
    PerSequence {
        num_labels: usize,
    },
    /// `(batch, seq_len, num_labels)`: token classification.
    PerToken {
        num_labels: usize,
    },
    /// `(batch, seq_len, vocab_size)`: language modelling heads.
    Vocabulary,
    /// `(batch, seq_len)`: span start or end scores.
    Span,
}

/// What a graph output holds, which determines its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    HiddenState,
    Logits(LogitsLayout),
    Loss,
    SelfAttentionCache,
    CrossAttentionCache,
}

impl OutputRole {
    pub const fn name(&self) -> &'static str {
        match self {
            OutputRole::HiddenState => "hidden state",
            OutputRole::Logits(LogitsLayout::Vocabulary) => "vocabulary logits",
            OutputRole::Logits(_) => "logits",
            OutputRole::Loss => "loss",
            OutputRole::SelfAttentionCache => "self-attention cache",
            OutputRole::CrossAttentionCache => "cross-attention cache",
        }
    }

    pub const fn is_cache(&self) -> bool {
        matches!(self, OutputRole::SelfAttentionCache | OutputRole::CrossAttentionCache)
    }
}

/// Sizes known before an invocation that outputs are shaped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapeParams {
    pub batch_size: usize,
    pub sequence_length: usize,
    pub past_sequence_length: Option<usize>,
    pub encoder_sequence_length: Option<usize>,
}

impl ShapeParams {
    pub fn new(
        batch_size: usize,
        sequence_length: usize,
    ) -> Self {
        Self {
            batch_size,
            sequence_length,
            ..Default::default()
        }
    }

    pub fn with_past_sequence_length(
        mut self,
        past_sequence_length: usize,
    ) -> Self {
        self.past_sequence_length = Some(past_sequence_length);
        self
    }

    pub fn with_encoder_sequence_length(
        mut self,
        encoder_sequence_length: usize,
    ) -> Self {
        self.encoder_sequence_length = Some(encoder_sequence_length);
        self
    }
}

/// Axis of the `(batch, heads, seq, head_dim)` cache layout that grows between steps.
pub const CACHE_SEQUENCE_AXIS: usize = 2;

/// Exact shape of the output with `role`.
pub fn output_shape(
    config: &NormalizedConfig,
    role: OutputRole,
    params: &ShapeParams,
) -> Result<Vec<usize>, Error> {
    let ShapeParams {
        batch_size,
        sequence_length,
        ..
    } = *params;
    let shape = match role {
        OutputRole::HiddenState => vec![batch_size, sequence_length, config.hidden_size],
        OutputRole::Logits(LogitsLayout::PerSequence {
            num_labels,
        }) => vec![batch_size, num_labels],
        OutputRole::Logits(LogitsLayout::PerToken {
            num_labels,
        }) => vec![batch_size, sequence_length, num_labels],
        OutputRole::Logits(LogitsLayout::Vocabulary) => {
            let vocab_size = config.vocab_size.ok_or(Error::MissingShapeParameter {
                role: role.name(),
                parameter: "vocab_size",
            })?;
            vec![batch_size, sequence_length, vocab_size]
        },
        OutputRole::Logits(LogitsLayout::Span) => vec![batch_size, sequence_length],
        OutputRole::Loss => vec![1],
        OutputRole::SelfAttentionCache => vec![
            batch_size,
            config.num_attention_heads,
            sequence_length + params.past_sequence_length.unwrap_or(0),
            config.head_dim(),
        ],
        OutputRole::CrossAttentionCache => {
            let encoder_sequence_length = params.encoder_sequence_length.ok_or(Error::MissingShapeParameter {
                role: role.name(),
                parameter: "encoder_sequence_length",
            })?;
            vec![batch_size, config.num_attention_heads, encoder_sequence_length, config.head_dim()]
        },
    };
    Ok(shape)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    /// Taken from the buffer when the result is read.
    Dynamic,
}

/// Shape an output is exposed under once the invocation completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedShape(Vec<Dim>);

impl ReportedShape {
    pub fn fixed(shape: &[usize]) -> Self {
        Self(shape.iter().copied().map(Dim::Fixed).collect())
    }

    /// Cache outputs leave their sequence axis open, every other output is fully fixed.
    pub fn for_role(
        role: OutputRole,
        shape: &[usize],
    ) -> Self {
        let mut reported = Self::fixed(shape);
        if role.is_cache() {
            reported.0[CACHE_SEQUENCE_AXIS] = Dim::Dynamic;
        }
        reported
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Concrete shape holding exactly `num_elements`.
    pub fn resolve(
        &self,
        num_elements: usize,
    ) -> Result<Vec<usize>, TensorError> {
        let known: usize = self
            .0
            .iter()
            .map(|dim| match dim {
                Dim::Fixed(size) => *size,
                Dim::Dynamic => 1,
            })
            .product();
        let dynamic = num_elements.checked_div(known).unwrap_or(0);
        let shape: Vec<usize> = self
            .0
            .iter()
            .map(|dim| match dim {
                Dim::Fixed(size) => *size,
                Dim::Dynamic => dynamic,
            })
            .collect();
        let expected = element_count(&shape);
        if expected != num_elements {
            return Err(TensorError::ElementCountMismatch {
                shape: shape.into(),
                expected,
                actual: num_elements,
            });
        }
        Ok(shape)
    }
}

/// A freshly allocated output buffer together with the shape it is exposed under.
#[derive(Debug)]
pub struct PlannedOutput {
    pub shape: Vec<usize>,
    pub reported_shape: ReportedShape,
    pub buffer: DeviceBuffer,
}

/// Derives output shapes from the model configuration and allocates their buffers.
pub struct BufferPlanner<'a> {
    config: &'a NormalizedConfig,
    context: &'a dyn DeviceContext,
}

impl<'a> BufferPlanner<'a> {
    pub fn new(
        config: &'a NormalizedConfig,
        context: &'a dyn DeviceContext,
    ) -> Self {
        Self {
            config,
            context,
        }
    }

    pub fn config(&self) -> &NormalizedConfig {
        self.config
    }

    pub fn plan(
        &self,
        role: OutputRole,
        params: &ShapeParams,
        data_type: DataType,
    ) -> Result<PlannedOutput, Error> {
        let shape = output_shape(self.config, role, params)?;
        let reported_shape = ReportedShape::for_role(role, &shape);
        let buffer = self.context.buffer(&shape, data_type)?;
        Ok(PlannedOutput {
            shape,
            reported_shape,
            buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{backends::HostContext, device::Device};

    fn config() -> NormalizedConfig {
        NormalizedConfig {
            model_type: "bart".to_string(),
            hidden_size: 16,
            num_attention_heads: 4,
            num_layers: Some(2),
            vocab_size: Some(50),
            num_labels: 3,
        }
    }

    #[test]
    fn test_shapes_per_role() {
        let config = config();
        let params = ShapeParams::new(2, 5);
        let shape = |role| output_shape(&config, role, &params).unwrap();
        assert_eq!(shape(OutputRole::HiddenState), vec![2, 5, 16]);
        assert_eq!(
            shape(OutputRole::Logits(LogitsLayout::PerSequence {
                num_labels: 3
            })),
            vec![2, 3]
        );
        assert_eq!(
            shape(OutputRole::Logits(LogitsLayout::PerToken {
                num_labels: 9
            })),
            vec![2, 5, 9]
        );
        assert_eq!(shape(OutputRole::Logits(LogitsLayout::Vocabulary)), vec![2, 5, 50]);
        assert_eq!(shape(OutputRole::Logits(LogitsLayout::Span)), vec![2, 5]);
        assert_eq!(shape(OutputRole::Loss), vec![1]);
        assert_eq!(shape(OutputRole::SelfAttentionCache), vec![2, 4, 5, 4]);
    }

    #[test]
    fn test_self_attention_cache_grows_with_past() {
        let params = ShapeParams::new(3, 1).with_past_sequence_length(7);
        assert_eq!(output_shape(&config(), OutputRole::SelfAttentionCache, &params).unwrap(), vec![3, 4, 8, 4]);
    }

    #[test]
    fn test_cross_attention_needs_encoder_length() {
        let config = config();
        let params = ShapeParams::new(1, 1);
        assert!(matches!(
            output_shape(&config, OutputRole::CrossAttentionCache, &params),
            Err(Error::MissingShapeParameter {
                parameter: "encoder_sequence_length",
                ..
            })
        ));
        let params = params.with_encoder_sequence_length(11);
        assert_eq!(output_shape(&config, OutputRole::CrossAttentionCache, &params).unwrap(), vec![1, 4, 11, 4]);
    }

    #[test]
    fn test_vocabulary_logits_need_vocab_size() {
        let config = NormalizedConfig {
            vocab_size: None,
            ..config()
        };
        assert!(matches!(
            output_shape(&config, OutputRole::Logits(LogitsLayout::Vocabulary), &ShapeParams::new(1, 1)),
            Err(Error::MissingShapeParameter {
                parameter: "vocab_size",
                ..
            })
        ));
    }

    #[test]
    fn test_plan_allocates_exact_size() {
        let config = config();
        let context = HostContext::new(Device::Cuda {
            ordinal: 0,
        });
        let planner = BufferPlanner::new(&config, &context);
        let planned = planner.plan(OutputRole::SelfAttentionCache, &ShapeParams::new(2, 3), DataType::F16).unwrap();
        assert_eq!(planned.shape, vec![2, 4, 3, 4]);
        assert_eq!(planned.buffer.size_in_bytes(), 2 * 4 * 3 * 4 * 2);
        assert_eq!(planned.buffer.device(), context.device());
        assert_eq!(planned.reported_shape.dims()[CACHE_SEQUENCE_AXIS], Dim::Dynamic);
    }

    #[test]
    fn test_dynamic_axis_resolves_from_element_count() {
        let reported = ReportedShape::for_role(OutputRole::CrossAttentionCache, &[1, 2, 3, 4]);
        assert_eq!(reported.resolve(48).unwrap(), vec![1, 2, 6, 4]);
        assert!(reported.resolve(7).is_err());
        let fixed = ReportedShape::for_role(OutputRole::HiddenState, &[1, 2, 3]);
        assert_eq!(fixed.resolve(6).unwrap(), vec![1, 2, 3]);
        assert!(fixed.resolve(12).is_err());
    }

    proptest! {
        #[test]
        fn hidden_state_follows_batch_and_sequence(batch_size in 1usize..16, sequence_length in 1usize..64) {
            let params = ShapeParams::new(batch_size, sequence_length);
            let shape = output_shape(&config(), OutputRole::HiddenState, &params).unwrap();
            prop_assert_eq!(shape, vec![batch_size, sequence_length, 16]);
        }
    }
}
