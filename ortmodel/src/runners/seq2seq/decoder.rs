use super::{Cache, TENSORS_PER_LAYER};
use crate::{
    Error,
    binding::{IoBinder, LogitsLayout, OutputRole, OutputSpec, ShapeParams},
    config::NormalizedConfig,
    device::Tensor,
};

/// Inputs of one decoder invocation.
#[derive(Debug, Clone, Copy)]
pub struct DecoderInput<'a> {
    pub input_ids: &'a Tensor,
    pub encoder_hidden_states: &'a Tensor,
    pub encoder_attention_mask: Option<&'a Tensor>,
    pub past: Option<&'a Cache>,
    pub labels: Option<&'a Tensor>,
}

#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// `(batch, seq_len, vocab_size)`.
    pub logits: Tensor,
    /// `None` when the graph exposes no key/value outputs.
    pub cache: Option<Cache>,
    pub loss: Option<Tensor>,
}

/// Decoder graph with a language modelling head, with or without cache inputs.
pub struct Decoder {
    binder: IoBinder,
    key_value_inputs: Vec<String>,
    key_value_outputs: Vec<String>,
}

impl Decoder {
    pub fn new(binder: IoBinder) -> Self {
        let key_value_inputs = binder.input_table().key_value_names().into_iter().map(String::from).collect();
        let key_value_outputs = binder.output_table().key_value_names().into_iter().map(String::from).collect();
        Self {
            binder,
            key_value_inputs,
            key_value_outputs,
        }
    }

    pub fn binder(&self) -> &IoBinder {
        &self.binder
    }

    pub(crate) fn binder_mut(&mut self) -> &mut IoBinder {
        &mut self.binder
    }

    /// Whether the graph takes the previous step's cache as input.
    pub fn accepts_cache(&self) -> bool {
        !self.key_value_inputs.is_empty()
    }

    pub fn forward(
        &self,
        input: DecoderInput<'_>,
        config: &NormalizedConfig,
    ) -> Result<DecoderOutput, Error> {
        let mut feed = vec![("input_ids", input.input_ids)];
        if self.binder.has_input("encoder_attention_mask") {
            let mask =
                input.encoder_attention_mask.ok_or_else(|| Error::MissingInput("encoder_attention_mask".to_string()))?;
            feed.push(("encoder_attention_mask", mask));
        }
        if self.binder.has_input("encoder_hidden_states") {
            feed.push(("encoder_hidden_states", input.encoder_hidden_states));
        }
        if let Some(past) = input.past {
            let flat = past.flatten();
            if flat.len() != self.key_value_inputs.len() {
                return Err(Error::MalformedCache(format!(
                    "graph expects {} cache tensors, got {}",
                    self.key_value_inputs.len(),
                    flat.len()
                )));
            }
            feed.extend(self.key_value_inputs.iter().map(String::as_str).zip(flat));
        }
        if self.binder.has_input("labels") {
            feed.push(("labels", input.labels.ok_or_else(|| Error::MissingInput("labels".to_string()))?));
        }

        let mut params = ShapeParams::new(input.input_ids.dim(0)?, input.input_ids.dim(1)?)
            .with_encoder_sequence_length(input.encoder_hidden_states.dim(1)?);
        if let Some(past) = input.past {
            params = params.with_past_sequence_length(past.past_sequence_length()?);
        }

        let mut outputs = self.binder.run(&feed, &self.output_specs(), config, &params)?;
        let logits = outputs.take("logits")?;
        let loss = if self.binder.has_output("loss") {
            Some(outputs.take("loss")?)
        } else {
            None
        };
        let cache = if self.key_value_outputs.is_empty() {
            None
        } else {
            let flat = self.key_value_outputs.iter().map(|name| outputs.take(name)).collect::<Result<Vec<_>, _>>()?;
            Some(Cache::from_flat(flat)?)
        };
        Ok(DecoderOutput {
            logits,
            cache,
            loss,
        })
    }

    fn output_specs(&self) -> Vec<OutputSpec> {
        let mut outputs = vec![OutputSpec::new("logits", OutputRole::Logits(LogitsLayout::Vocabulary))];
        if self.binder.has_output("loss") {
            outputs.push(OutputSpec::new("loss", OutputRole::Loss));
        }
        // Within each layer the self-attention pair comes before the cross-attention pair.
        for (index, name) in self.key_value_outputs.iter().enumerate() {
            let role = if index % TENSORS_PER_LAYER < 2 {
                OutputRole::SelfAttentionCache
            } else {
                OutputRole::CrossAttentionCache
            };
            outputs.push(OutputSpec::new(name.clone(), role));
        }
        outputs
    }
}
