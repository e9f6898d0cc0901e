mod inspect;
mod plan;

pub use inspect::handle_inspect;
pub use plan::handle_plan;
