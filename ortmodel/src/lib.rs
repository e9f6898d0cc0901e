pub mod backends;
pub mod binding;
pub mod config;
pub mod device;
pub mod error;
pub mod runners;
pub mod session;

pub use device::{ArrayElement, DataType, Device, ElementType, ExecutionProvider, Tensor};
pub use error::{EngineError, Error};
