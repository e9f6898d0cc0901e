pub mod host;

pub use host::{HostBuffer, HostContext};
