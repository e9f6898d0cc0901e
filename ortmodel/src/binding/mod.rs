mod buffer_planner;
mod io_binder;
mod io_binding;
mod tensor_map;

pub use buffer_planner::{
    BufferPlanner, CACHE_SEQUENCE_AXIS, Dim, LogitsLayout, OutputRole, PlannedOutput, ReportedShape, ShapeParams,
    output_shape,
};
pub use io_binder::{InvocationMode, IoBinder, OutputSpec, execution_device, resolve_io_binding};
pub use io_binding::IoBinding;
pub use tensor_map::TensorMap;
