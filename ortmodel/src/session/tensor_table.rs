use std::collections::HashMap;

use super::TensorSignature;
use crate::Error;

/// Name to ordinal lookup over a session's declared inputs or outputs.
#[derive(Debug, Clone, Default)]
pub struct NamedTensorTable {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl NamedTensorTable {
    pub fn from_signatures(signatures: &[TensorSignature]) -> Result<Self, Error> {
        let mut table = Self::default();
        for signature in signatures {
            if table.positions.insert(signature.name.clone(), table.names.len()).is_some() {
                return Err(Error::DuplicateTensorName(signature.name.clone()));
            }
            table.names.push(signature.name.clone());
        }
        Ok(table)
    }

    pub fn position(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.positions.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names of the key/value cache tensors, in declaration order.
    pub fn key_value_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|name| name.contains(".key") || name.contains(".value"))
            .collect()
    }
}
