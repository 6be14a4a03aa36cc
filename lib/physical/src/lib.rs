//! The executable side of the compiler: merging sibling workflows, the
//! crushing pass that lowers a workflow into a task tree, and the passes
//! that run between them.

mod crusher;
mod finalizer;
mod merger;
mod task;
mod unused_fields;

pub use crusher::crush;
pub use finalizer::finalize;
pub use merger::merge;
pub use task::{nop_reduce, Crushed, MapReduceSpec, OutAction, PipelineOp, Task};
pub use unused_fields::{delete_unused_fields, finish};
