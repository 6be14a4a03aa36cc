use dbflow_common::{WorkflowError, WorkflowResult};
use dbflow_logical::{rewrite_node, Node, Rhs, Workflow};
use dbflow_model::{Conventions, DocVar, JsFn, Selector};

use crate::task::{nop_reduce, Crushed, MapReduceSpec, OutAction, PipelineOp, Task};

/// Lowers a (finalized, finished) workflow to its executable task tree: a
/// paramorphism producing, at every node, both the accumulated [`Task`] and
/// the [`DocVar`] at which that task's logical document root now lives.
pub fn crush(wf: &Workflow) -> WorkflowResult<Crushed> {
    crush_node(wf.node())
}

fn crush_node(node: &Node) -> WorkflowResult<Crushed> {
    match node {
        Node::Pure(v) => Ok((DocVar::Root, Task::Pure(v.clone()))),
        Node::Read(c) => Ok((DocVar::Root, Task::Read(c.clone()))),
        Node::Match(src, sel) => crush_match(src, sel),
        Node::Map(src, f) => crush_js(src, f, JsOpKind::Map),
        Node::FlatMap(src, f) => crush_js(src, f, JsOpKind::FlatMap),
        Node::Reduce(src, f) => crush_js(src, f, JsOpKind::Reduce),
        Node::FoldLeft(head, tail) => crush_fold_left(head, tail),
        Node::Join(srcs) => crush_join(srcs),
        other if other.is_pipelineable() => crush_pipeline(other),
        other => Err(WorkflowError::Internal(format!("crush has no rule for {other:?}"))),
    }
}

/// `Match`: extends the accumulated pipeline when both the selector and the
/// source are pipeline-eligible; otherwise opens a `MapReduceTask` whose map
/// corrects for a non-root base and whose selection is the rebased selector.
fn crush_match(src: &Workflow, sel: &Selector) -> WorkflowResult<Crushed> {
    let (base, child_task) = crush_node(src.node())?;
    if sel.is_pipelineable() {
        let rebased = rebase_rhs(Rhs::Match(sel.clone()), &base)?;
        let op = rhs_to_pipeline_op(rebased);
        return Ok((base, extend_pipeline(child_task, op)));
    }

    let rewritten_sel = sel.map_up_fields(&mut |v| base.compose(v));
    let map_fn = base_projection_js(&base);
    let mut spec = MapReduceSpec::identity(map_fn);
    spec.selection = Some(rewritten_sel);
    Ok((DocVar::field(Conventions::expr_var()), Task::MapReduce(Box::new(child_task), spec)))
}

/// Every other pipelineable stage: extends the accumulated pipeline,
/// rebasing its own field references first, and resets the base to `ROOT`
/// for `Project`/`Group` (the merger's `rewrite` helper, reused here).
fn crush_pipeline(node: &Node) -> WorkflowResult<Crushed> {
    let src = node
        .src()
        .ok_or_else(|| WorkflowError::Internal("pipelineable node without a single source".into()))?;
    let (base, child_task) = crush_node(src.node())?;
    let rhs = node
        .rhs()
        .ok_or_else(|| WorkflowError::Internal("pipelineable node without an rhs".into()))?;
    let rebased = rebase_rhs(rhs, &base)?;
    let op = rhs_to_pipeline_op(rebased);
    let new_base = match node {
        Node::Project(_, _, _) | Node::Group(_, _, _) => DocVar::Root,
        _ => base,
    };
    Ok((new_base, extend_pipeline(child_task, op)))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum JsOpKind {
    Map,
    FlatMap,
    Reduce,
}

/// `Map`/`FlatMap`/`Reduce`: absorbs into an existing `MapReduceTask` where
/// possible, absorbs a `[Match?, Sort?, Limit?]` pipeline prefix where
/// possible, or opens a fresh `MapReduceTask` otherwise.
fn crush_js(src: &Workflow, f: &JsFn, kind: JsOpKind) -> WorkflowResult<Crushed> {
    let (base, child_task) = crush_node(src.node())?;
    let base_proj = base_projection_js(&base);

    match child_task {
        Task::MapReduce(upstream, mut spec) if kind == JsOpKind::Map && spec.finalizer.is_none() => {
            spec.finalizer = Some(f.clone());
            Ok((base, Task::MapReduce(upstream, spec)))
        }
        Task::MapReduce(upstream, mut spec) if kind == JsOpKind::Reduce && is_nop_reduce(&spec) => {
            spec.reduce = Some(f.clone());
            Ok((base, Task::MapReduce(upstream, spec)))
        }
        Task::Pipeline(upstream, ops) => match match_sort_limit_prefix(&ops) {
            Some(prefix) => {
                let mut spec = MapReduceSpec::default();
                apply_js(&mut spec, kind, f.clone(), &base_proj);
                prefix.apply_to(&mut spec);
                Ok((DocVar::field(Conventions::expr_var()), Task::MapReduce(upstream, spec)))
            }
            None => fresh_map_reduce(Task::Pipeline(upstream, ops), kind, f, &base_proj),
        },
        other => fresh_map_reduce(other, kind, f, &base_proj),
    }
}

fn fresh_map_reduce(upstream: Task, kind: JsOpKind, f: &JsFn, base_proj: &JsFn) -> WorkflowResult<Crushed> {
    let mut spec = MapReduceSpec::default();
    apply_js(&mut spec, kind, f.clone(), base_proj);
    Ok((DocVar::field(Conventions::expr_var()), Task::MapReduce(Box::new(upstream), spec)))
}

fn apply_js(spec: &mut MapReduceSpec, kind: JsOpKind, f: JsFn, base_proj: &JsFn) {
    match kind {
        JsOpKind::Map | JsOpKind::FlatMap => {
            spec.map = Some(JsFn::compose(&f, base_proj));
            spec.reduce = Some(nop_reduce());
        }
        JsOpKind::Reduce => {
            spec.map = Some(base_proj.clone());
            spec.reduce = Some(f);
        }
    }
}

fn is_nop_reduce(spec: &MapReduceSpec) -> bool {
    spec.reduce.as_ref() == Some(&nop_reduce())
}

struct AbsorbedPrefix {
    selection: Option<Selector>,
    input_sort: Option<Vec<dbflow_logical::SortKey>>,
    limit: Option<i64>,
}

impl AbsorbedPrefix {
    fn apply_to(self, spec: &mut MapReduceSpec) {
        spec.selection = self.selection;
        spec.input_sort = self.input_sort;
        spec.limit = self.limit;
    }
}

/// Recognizes an ops list that is exactly `[Match?, Sort?, Limit?]` in that
/// order and nothing else.
fn match_sort_limit_prefix(ops: &[PipelineOp]) -> Option<AbsorbedPrefix> {
    let mut idx = 0;
    let selection = match ops.get(idx) {
        Some(PipelineOp::Match(sel)) => {
            idx += 1;
            Some(sel.clone())
        }
        _ => None,
    };
    let input_sort = match ops.get(idx) {
        Some(PipelineOp::Sort(keys)) => {
            idx += 1;
            Some(keys.clone())
        }
        _ => None,
    };
    let limit = match ops.get(idx) {
        Some(PipelineOp::Limit(n)) => {
            idx += 1;
            Some(*n)
        }
        _ => None,
    };
    if idx == ops.len() {
        Some(AbsorbedPrefix { selection, input_sort, limit })
    } else {
        None
    }
}

/// `FoldLeft(head, tail)`: every tail arm must already be a `MapReduceTask`
/// (an invariant `finalize` establishes); each gets its `out` action set to
/// `Reduce`. The head passes through unchanged.
fn crush_fold_left(head: &Workflow, tail: &[Workflow]) -> WorkflowResult<Crushed> {
    let (head_base, head_task) = crush_node(head.node())?;
    let mut tail_tasks = Vec::with_capacity(tail.len());
    for arm in tail {
        let (_, arm_task) = crush_node(arm.node())?;
        let Task::MapReduce(upstream, mut spec) = arm_task else {
            return Err(WorkflowError::FoldLeftArmNotReduced);
        };
        spec.out = Some(OutAction::Reduce);
        tail_tasks.push(Task::MapReduce(upstream, spec));
    }
    Ok((head_base, Task::FoldLeft(Box::new(head_task), tail_tasks)))
}

fn crush_join(srcs: &[Workflow]) -> WorkflowResult<Crushed> {
    let mut tasks = Vec::with_capacity(srcs.len());
    for s in srcs {
        let (_, task) = crush_node(s.node())?;
        tasks.push(task);
    }
    Ok((DocVar::Root, Task::Join(tasks)))
}

fn extend_pipeline(task: Task, op: PipelineOp) -> Task {
    match task {
        Task::Pipeline(upstream, mut ops) => {
            ops.push(op);
            Task::Pipeline(upstream, ops)
        }
        other => Task::Pipeline(Box::new(other), vec![op]),
    }
}

/// Rebases every field reference in a detached `Rhs` payload, by
/// reattaching it to a placeholder child, running it through the reference
/// rewriter, and stripping the child back off. A no-op when `base` is
/// `ROOT`.
fn rebase_rhs(rhs: Rhs, base: &DocVar) -> WorkflowResult<Rhs> {
    if base.is_root() {
        return Ok(rhs);
    }
    let placeholder = Workflow::new(Node::Read(String::new()));
    let node = rhs_with_src(rhs, placeholder);
    let rewritten = rewrite_node(&node, &mut |v| base.compose(v))?;
    rewritten
        .rhs()
        .ok_or_else(|| WorkflowError::Internal("rebase_rhs lost its variant".into()))
}

fn rhs_with_src(rhs: Rhs, src: Workflow) -> Node {
    match rhs {
        Rhs::Match(sel) => Node::Match(src, sel),
        Rhs::Limit(n) => Node::Limit(src, n),
        Rhs::Skip(n) => Node::Skip(src, n),
        Rhs::Sort(keys) => Node::Sort(src, keys),
        Rhs::Out(coll) => Node::Out(src, coll),
        Rhs::Project(shape, id) => Node::Project(src, shape, id),
        Rhs::Redact(e) => Node::Redact(src, e),
        Rhs::Unwind(f) => Node::Unwind(src, f),
        Rhs::Group(g, by) => Node::Group(src, g, by),
        Rhs::GeoNear(spec) => Node::GeoNear(src, spec),
        Rhs::Map(f) => Node::Map(src, f),
        Rhs::FlatMap(f) => Node::FlatMap(src, f),
        Rhs::Reduce(f) => Node::Reduce(src, f),
    }
}

fn rhs_to_pipeline_op(rhs: Rhs) -> PipelineOp {
    match rhs {
        Rhs::Match(sel) => PipelineOp::Match(sel),
        Rhs::Limit(n) => PipelineOp::Limit(n),
        Rhs::Skip(n) => PipelineOp::Skip(n),
        Rhs::Sort(keys) => PipelineOp::Sort(keys),
        Rhs::Out(coll) => PipelineOp::Out(coll),
        Rhs::Project(shape, id) => PipelineOp::Project(shape, id),
        Rhs::Redact(e) => PipelineOp::Redact(e),
        Rhs::Unwind(f) => PipelineOp::Unwind(f),
        Rhs::Group(g, by) => PipelineOp::Group(g, by),
        Rhs::GeoNear(spec) => PipelineOp::GeoNear(spec),
        Rhs::Map(_) | Rhs::FlatMap(_) | Rhs::Reduce(_) => {
            unreachable!("JS operators are never pipelineable")
        }
    }
}

/// `value => value.<path>`, or the identity when `base` is `ROOT`: the
/// correction a `MapReduceTask`'s map must apply when its upstream's
/// logical root has drifted away from the document root.
fn base_projection_js(base: &DocVar) -> JsFn {
    match base {
        DocVar::Root => JsFn::identity(Conventions::EXPR_VAR),
        DocVar::Field(path) => JsFn::new([Conventions::EXPR_VAR], format!("{}.{}", Conventions::EXPR_VAR, path.to_dotted())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_logical::{limit, match_, read, sort, SortDir};
    use dbflow_model::{Bson, BsonField, Selector};

    #[test]
    fn read_match_match_crushes_to_one_pipeline_match() {
        let a = Selector::Doc(BsonField::name("a"), Bson::Int32(1));
        let b = Selector::Doc(BsonField::name("b"), Bson::Int32(2));
        let wf = match_(b.clone(), match_(a.clone(), read("c")));

        let (base, task) = crush(&wf).unwrap();
        assert_eq!(base, DocVar::Root);
        match task {
            Task::Pipeline(upstream, ops) => {
                assert_eq!(*upstream, Task::Read("c".into()));
                assert_eq!(ops, vec![PipelineOp::Match(a.and(b))]);
            }
            other => panic!("expected Pipeline, got {other:?}"),
        }
    }

    #[test]
    fn where_clause_match_crushes_to_a_map_reduce_with_selection() {
        let wf = match_(Selector::Where(JsFn::new(["d"], "true")), read("c"));
        let (base, task) = crush(&wf).unwrap();
        assert_eq!(base, DocVar::field(Conventions::expr_var()));
        match task {
            Task::MapReduce(upstream, spec) => {
                assert_eq!(*upstream, Task::Read("c".into()));
                assert!(spec.selection.is_some());
            }
            other => panic!("expected MapReduce, got {other:?}"),
        }
    }

    #[test]
    fn match_sort_limit_prefix_absorbs_into_the_map_reduce_options() {
        let wf = dbflow_logical::map(
            JsFn::new(["v"], "v"),
            limit(5, sort(vec![(BsonField::name("a"), SortDir::Asc)], match_(Selector::Doc(BsonField::name("x"), Bson::Int32(1)), read("c")))),
        );
        let (_, task) = crush(&wf).unwrap();
        match task {
            Task::MapReduce(upstream, spec) => {
                assert_eq!(*upstream, Task::Read("c".into()));
                assert!(spec.selection.is_some());
                assert!(spec.input_sort.is_some());
                assert_eq!(spec.limit, Some(5));
            }
            other => panic!("expected MapReduce, got {other:?}"),
        }
    }

    #[test]
    fn fold_left_sets_reduce_out_action_on_every_tail_arm() {
        let tail_arm = Workflow::new(Node::Reduce(read("d"), JsFn::new(["k", "v"], "v[0]")));
        let wf = Workflow::new(Node::FoldLeft(read("c"), vec![tail_arm]));
        let (_, task) = crush(&wf).unwrap();
        match task {
            Task::FoldLeft(head, tail) => {
                assert_eq!(*head, Task::Read("c".into()));
                assert_eq!(tail.len(), 1);
                match &tail[0] {
                    Task::MapReduce(_, spec) => assert_eq!(spec.out, Some(OutAction::Reduce)),
                    other => panic!("expected MapReduce, got {other:?}"),
                }
            }
            other => panic!("expected FoldLeft, got {other:?}"),
        }
    }

    #[test]
    fn fold_left_rejects_a_tail_arm_that_never_became_a_map_reduce() {
        let wf = Workflow::new(Node::FoldLeft(read("c"), vec![read("d")]));
        assert!(matches!(crush(&wf), Err(WorkflowError::FoldLeftArmNotReduced)));
    }
}
