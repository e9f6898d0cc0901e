use crate::{Error, device::Tensor};

/// Named outputs of one invocation, in the order they were produced.
#[derive(Debug, Clone, Default)]
pub struct TensorMap {
    entries: Vec<(String, Tensor)>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        tensor: Tensor,
    ) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Tensor> {
        self.entries.iter().find(|(existing, _)| existing == name).map(|(_, tensor)| tensor)
    }

    /// Removes and returns `name`, failing with [`Error::MissingOutput`] when it was not produced.
    pub fn take(
        &mut self,
        name: &str,
    ) -> Result<Tensor, Error> {
        self.take_optional(name).ok_or_else(|| Error::MissingOutput(name.to_string()))
    }

    pub fn take_optional(
        &mut self,
        name: &str,
    ) -> Option<Tensor> {
        let index = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for TensorMap {
    type Item = (String, Tensor);
    type IntoIter = std::vec::IntoIter<(String, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Tensor)> for TensorMap {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, tensor) in iter {
            map.insert(name, tensor);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_order() {
        let mut map = TensorMap::new();
        map.insert("logits", Tensor::from_slice(&[1], &[1.0f32]).unwrap());
        map.insert("loss", Tensor::from_slice(&[1], &[2.0f32]).unwrap());
        map.insert("logits", Tensor::from_slice(&[1], &[3.0f32]).unwrap());
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["logits", "loss"]);
        assert_eq!(map.take("logits").unwrap().to_vec::<f32>().unwrap(), vec![3.0]);
        assert!(matches!(map.take("logits"), Err(Error::MissingOutput(name)) if name == "logits"));
        assert_eq!(map.len(), 1);
    }
}
