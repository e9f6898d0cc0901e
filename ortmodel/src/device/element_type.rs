use std::{fmt, str::FromStr};

use super::DataType;
use crate::Error;

/// Tensor element tag as reported by the inference engine.
///
/// Discriminants follow the ONNX `TensorProto.DataType` numbering.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
#[repr(i32)]
pub enum ElementType {
    Undefined = 0,
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    BFloat16 = 16,
}

const ALL: [ElementType; 17] = [
    ElementType::Undefined,
    ElementType::Float,
    ElementType::Uint8,
    ElementType::Int8,
    ElementType::Uint16,
    ElementType::Int16,
    ElementType::Int32,
    ElementType::Int64,
    ElementType::String,
    ElementType::Bool,
    ElementType::Float16,
    ElementType::Double,
    ElementType::Uint32,
    ElementType::Uint64,
    ElementType::Complex64,
    ElementType::Complex128,
    ElementType::BFloat16,
];

impl ElementType {
    /// Name used inside the engine's `tensor(...)` type strings.
    pub const fn name(&self) -> &'static str {
        match self {
            ElementType::Undefined => "undefined",
            ElementType::Float => "float",
            ElementType::Uint8 => "uint8",
            ElementType::Int8 => "int8",
            ElementType::Uint16 => "uint16",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::Float16 => "float16",
            ElementType::Double => "double",
            ElementType::Uint32 => "uint32",
            ElementType::Uint64 => "uint64",
            ElementType::Complex64 => "complex64",
            ElementType::Complex128 => "complex128",
            ElementType::BFloat16 => "bfloat16",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        ALL.iter().copied().find(|element_type| *element_type as i32 == code)
    }
}

impl fmt::Display for ElementType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "tensor({})", self.name())
    }
}

impl FromStr for ElementType {
    type Err = Error;

    /// Accepts both the bare name (`float16`) and the engine form (`tensor(float16)`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let name = trimmed
            .strip_prefix("tensor(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        ALL.iter()
            .copied()
            .find(|element_type| element_type.name() == name)
            .ok_or_else(|| Error::UnknownElementType(value.to_string()))
    }
}

impl TryFrom<ElementType> for DataType {
    type Error = Error;

    fn try_from(element_type: ElementType) -> Result<Self, Self::Error> {
        match element_type {
            ElementType::Float => Ok(DataType::F32),
            ElementType::Double => Ok(DataType::F64),
            ElementType::Float16 => Ok(DataType::F16),
            ElementType::BFloat16 => Ok(DataType::BF16),
            ElementType::Int8 => Ok(DataType::I8),
            ElementType::Uint8 => Ok(DataType::U8),
            ElementType::Int16 => Ok(DataType::I16),
            ElementType::Uint16 => Ok(DataType::U16),
            ElementType::Int32 => Ok(DataType::I32),
            ElementType::Uint32 => Ok(DataType::U32),
            ElementType::Int64 => Ok(DataType::I64),
            ElementType::Uint64 => Ok(DataType::U64),
            ElementType::Bool => Ok(DataType::Bool),
            ElementType::Undefined | ElementType::String | ElementType::Complex64 | ElementType::Complex128 => {
                Err(Error::UnsupportedType(element_type))
            },
        }
    }
}

impl From<DataType> for ElementType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::F32 => ElementType::Float,
            DataType::F64 => ElementType::Double,
            DataType::F16 => ElementType::Float16,
            DataType::BF16 => ElementType::BFloat16,
            DataType::I8 => ElementType::Int8,
            DataType::U8 => ElementType::Uint8,
            DataType::I16 => ElementType::Int16,
            DataType::U16 => ElementType::Uint16,
            DataType::I32 => ElementType::Int32,
            DataType::U32 => ElementType::Uint32,
            DataType::I64 => ElementType::Int64,
            DataType::U64 => ElementType::Uint64,
            DataType::Bool => ElementType::Bool,
        }
    }
}
