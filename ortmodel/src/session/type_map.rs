use std::collections::HashMap;

use super::{InferenceSession, TensorSignature};
use crate::{Error, device::DataType};

/// Host element type of every declared input and output of one session.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    inputs: HashMap<String, DataType>,
    outputs: HashMap<String, DataType>,
}

impl TypeMap {
    /// Fails with [`Error::UnsupportedType`] when a declared tensor has no host counterpart.
    pub fn for_session(session: &dyn InferenceSession) -> Result<Self, Error> {
        Ok(Self {
            inputs: map_signatures(session.inputs())?,
            outputs: map_signatures(session.outputs())?,
        })
    }

    pub fn input_type(
        &self,
        name: &str,
    ) -> Option<DataType> {
        self.inputs.get(name).copied()
    }

    pub fn output_type(
        &self,
        name: &str,
    ) -> Option<DataType> {
        self.outputs.get(name).copied()
    }
}

fn map_signatures(signatures: &[TensorSignature]) -> Result<HashMap<String, DataType>, Error> {
    signatures
        .iter()
        .map(|signature| Ok((signature.name.clone(), DataType::try_from(signature.element_type)?)))
        .collect()
}
