mod inference_session;
mod signature;
mod tensor_table;
mod type_map;

pub use inference_session::{Engine, InferenceSession, load_session};
pub use signature::{Dimension, TensorSignature};
pub use tensor_table::NamedTensorTable;
pub use type_map::TypeMap;
