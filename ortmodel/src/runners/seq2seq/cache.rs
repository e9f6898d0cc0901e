use crate::{
    Error,
    binding::CACHE_SEQUENCE_AXIS,
    device::{DeviceContext, Tensor},
};

/// Number of cache tensors each decoder layer produces.
pub const TENSORS_PER_LAYER: usize = 4;

/// Attention key/value tensors of one decoder layer, each `(batch, heads, seq, head_dim)`.
///
/// The cross-attention pair depends only on the encoder output and does not change between steps.
#[derive(Debug, Clone)]
pub struct LayerCache {
    pub self_key: Tensor,
    pub self_value: Tensor,
    pub cross_key: Tensor,
    pub cross_value: Tensor,
}

impl LayerCache {
    /// Builds a layer from tensors in graph order: self key, self value, cross key, cross value.
    pub fn from_array(tensors: [Tensor; TENSORS_PER_LAYER]) -> Self {
        let [self_key, self_value, cross_key, cross_value] = tensors;
        Self {
            self_key,
            self_value,
            cross_key,
            cross_value,
        }
    }

    pub fn into_array(self) -> [Tensor; TENSORS_PER_LAYER] {
        [self.self_key, self.self_value, self.cross_key, self.cross_value]
    }

    pub fn tensors(&self) -> [&Tensor; TENSORS_PER_LAYER] {
        [&self.self_key, &self.self_value, &self.cross_key, &self.cross_value]
    }
}

/// Key/value cache of every decoder layer, rebuilt from the decoder outputs on each step.
#[derive(Debug, Clone)]
pub struct Cache {
    layers: Vec<LayerCache>,
}

impl Cache {
    pub fn new(layers: Vec<LayerCache>) -> Result<Self, Error> {
        if layers.is_empty() {
            return Err(Error::MalformedCache("cache has no layers".to_string()));
        }
        Ok(Self {
            layers,
        })
    }

    /// Regroups a flat, graph-ordered list of cache tensors into layers.
    pub fn from_flat(tensors: Vec<Tensor>) -> Result<Self, Error> {
        if tensors.len() % TENSORS_PER_LAYER != 0 {
            return Err(Error::MalformedCache(format!(
                "{} tensors do not split into layers of {TENSORS_PER_LAYER}",
                tensors.len()
            )));
        }
        let mut layers = Vec::with_capacity(tensors.len() / TENSORS_PER_LAYER);
        let mut tensors = tensors.into_iter();
        while let (Some(self_key), Some(self_value), Some(cross_key), Some(cross_value)) =
            (tensors.next(), tensors.next(), tensors.next(), tensors.next())
        {
            layers.push(LayerCache {
                self_key,
                self_value,
                cross_key,
                cross_value,
            });
        }
        Self::new(layers)
    }

    /// Flat view in the order the graph declares its cache inputs.
    pub fn flatten(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(LayerCache::tensors).collect()
    }

    pub fn into_flat(self) -> Vec<Tensor> {
        self.layers.into_iter().flat_map(LayerCache::into_array).collect()
    }

    pub fn layers(&self) -> &[LayerCache] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn batch_size(&self) -> Result<usize, Error> {
        Ok(self.layers[0].self_key.dim(0)?)
    }

    /// Number of decoder positions already held by the self-attention cache.
    pub fn past_sequence_length(&self) -> Result<usize, Error> {
        Ok(self.layers[0].self_key.dim(CACHE_SEQUENCE_AXIS)?)
    }

    /// Reorders the self-attention tensors along the batch axis to follow the surviving beams.
    ///
    /// Cross-attention tensors are carried over untouched.
    pub fn reorder(
        &self,
        beam_idx: &[usize],
        context: &dyn DeviceContext,
    ) -> Result<Cache, Error> {
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                Ok(LayerCache {
                    self_key: layer.self_key.index_select(beam_idx, context)?,
                    self_value: layer.self_value.index_select(beam_idx, context)?,
                    cross_key: layer.cross_key.clone(),
                    cross_value: layer.cross_value.clone(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self {
            layers,
        })
    }
}
