//! `dbflow` compiles a logical relational/aggregation workflow — a tree of
//! pipelineable, JS map/reduce, fold-left, and parallel-join operators —
//! into an optimized, executable task tree for a document database whose
//! primitives are aggregation pipelines and map/reduce jobs.
//!
//! This facade re-exports the crate family's public surface so a downstream
//! user depends on one crate. Build a [`Workflow`] with the smart
//! constructors in [`logical`] (or the flattened re-exports at the crate
//! root), combine two of them with [`physical::merge`], and compile the
//! result with [`engine::task`].
//!
//! ```
//! use dbflow::{limit, match_, read, task};
//! use dbflow::model::{Bson, BsonField, Selector};
//!
//! let workflow = limit(10, match_(Selector::Doc(BsonField::name("active"), Bson::Boolean(true)), read("users")));
//! let compiled = task(&workflow).expect("well-typed workflow");
//! println!("{compiled}");
//! ```

pub mod model {
    pub use dbflow_model::*;
}

pub mod logical {
    pub use dbflow_logical::*;
}

pub mod physical {
    pub use dbflow_physical::*;
}

pub mod engine {
    pub use dbflow_engine::*;
}

pub use dbflow_common::{WorkflowError, WorkflowResult};
pub use dbflow_engine::{
    chain, crush, finalize, finish, flat_map, fold_left, fold_left_from_tail, geo_near, group, join, limit, map,
    match_, merge, out, project, pure, read, redact, reduce, skip, sort, task, unwind, Task, Workflow,
};

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_model::{Bson, BsonField, Selector};

    #[test]
    fn facade_reexports_compile_a_workflow_end_to_end() {
        let workflow = limit(10, match_(Selector::Doc(BsonField::name("active"), Bson::Boolean(true)), read("users")));
        let compiled = task(&workflow).unwrap();
        assert!(matches!(compiled, Task::Pipeline(_, _)));
    }

    #[test]
    fn facade_display_renders_an_indented_tree() {
        let workflow = limit(10, read("users"));
        let rendered = format!("{workflow}");
        assert!(rendered.contains("Limit(10)"));
        assert!(rendered.contains("Read(users)"));
    }
}
