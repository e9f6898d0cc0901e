use std::fmt;

use crate::device::ElementType;

/// One axis of a declared graph input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Fixed(usize),
    /// Resolved per invocation, e.g. `batch_size` or `past_sequence_length + 1`.
    Symbolic(String),
}

impl fmt::Display for Dimension {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Dimension::Fixed(size) => write!(f, "{size}"),
            Dimension::Symbolic(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorSignature {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Vec<Dimension>,
}

impl TensorSignature {
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<Dimension>,
    ) -> Self {
        Self {
            name: name.into(),
            element_type,
            shape,
        }
    }
}

impl fmt::Display for TensorSignature {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let shape: Vec<String> = self.shape.iter().map(ToString::to_string).collect();
        write!(f, "{}: {} [{}]", self.name, self.element_type, shape.join(", "))
    }
}
