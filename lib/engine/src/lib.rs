//! The composed, public entry points of the dbflow workflow compiler:
//! everything needed to build a [`Workflow`] with the smart constructors,
//! merge two of them, and compile the result down to an executable
//! [`Task`] tree.
//!
//! This crate adds no algorithm of its own — it is a thin facade over
//! `dbflow-logical` and `dbflow-physical`, composing them into the handful
//! of calls an embedder actually needs.

pub use dbflow_common::{WorkflowError, WorkflowResult};
pub use dbflow_logical::{
    chain, coalesce, flat_map, fold_left, fold_left_from_tail, geo_near, group, join, limit, map, match_, out,
    project, pure, read, redact, reduce, skip, sort, unwind, GeoNearSpec, Node, NodeKind, Rhs, SortDir, SortKey,
    Workflow,
};
pub use dbflow_physical::{
    crush, delete_unused_fields, finalize, finish, merge, nop_reduce, Crushed, MapReduceSpec, OutAction, PipelineOp,
    Task,
};

/// Compiles a workflow end to end: deletes unused fields, finalizes the
/// tree so no JS operator sits behind a shape-changing pipeline stage,
/// crushes the result, and returns only the task — the `DocVar` `crush`
/// also returns is discarded deliberately.
///
/// That discard is safe, not lossy: by the time `task` calls `crush`, every
/// rebasing a caller could need has already been folded into the task tree
/// itself by the merge/finalize passes that ran to produce `op`. This
/// intentionally discards the final base because the returned task already
/// includes the required base adjustment. A caller that still needs the
/// base — e.g. to keep compiling on top of `op` instead of treating it as a
/// finished program — should call [`crush`] directly.
pub fn task(op: &Workflow) -> WorkflowResult<Task> {
    let finished = finish(op);
    let finalized = finalize(&finished)?;
    let (_base, task) = crush(&finalized)?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_model::{Bson, BsonField, Selector};

    #[test]
    fn task_compiles_a_plain_read_to_a_read_task() {
        let wf = read("c");
        let compiled = task(&wf).unwrap();
        assert_eq!(compiled, Task::Read("c".into()));
    }

    #[test]
    fn task_compiles_match_match_to_a_single_fused_pipeline_match() {
        let a = Selector::Doc(BsonField::name("a"), Bson::Int32(1));
        let b = Selector::Doc(BsonField::name("b"), Bson::Int32(2));
        let wf = match_(b.clone(), match_(a.clone(), read("c")));

        let compiled = task(&wf).unwrap();
        match compiled {
            Task::Pipeline(upstream, ops) => {
                assert_eq!(*upstream, Task::Read("c".into()));
                assert_eq!(ops, vec![PipelineOp::Match(a.and(b))]);
            }
            other => panic!("expected Pipeline, got {other:?}"),
        }
    }

    #[test]
    fn task_compiles_a_where_clause_match_to_a_map_reduce() {
        let wf = match_(Selector::Where(dbflow_model::JsFn::new(["d"], "true")), read("c"));
        let compiled = task(&wf).unwrap();
        assert!(matches!(compiled, Task::MapReduce(_, _)));
    }
}
