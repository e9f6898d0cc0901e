mod buffer;
mod context;
mod data_type;
#[allow(clippy::module_inception)]
mod device;
mod element_type;
mod tensor;

pub use buffer::{AllocError, DeviceBuffer, NativeBuffer, element_count, size_for_shape};
pub use context::{DeviceContext, DeviceContextExt};
pub use data_type::{ArrayElement, DataType};
pub use device::{Device, ExecutionProvider, ProviderOptions, validate_provider_availability};
pub use element_type::ElementType;
pub use tensor::{Tensor, TensorError};
