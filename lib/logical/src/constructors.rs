use dbflow_common::{WorkflowError, WorkflowResult};
use dbflow_model::{Bson, DocVar, Expr, Grouped, IdHandling, JsFn, Reshape, Selector};

use crate::coalesce::coalesce;
use crate::node::{GeoNearSpec, Node, SortKey, Workflow};

/// The smart-constructor API surface. Every function builds
/// the obvious node and runs it through [`coalesce`] exactly once; callers
/// never construct a [`Node`] directly.
fn build(node: Node) -> Workflow {
    Workflow::new(coalesce(node))
}

pub fn pure(value: Bson) -> Workflow {
    build(Node::Pure(value))
}

pub fn read(collection: impl Into<String>) -> Workflow {
    build(Node::Read(collection.into()))
}

pub fn match_(selector: Selector, src: Workflow) -> Workflow {
    build(Node::Match(src, selector))
}

pub fn project(shape: Reshape, id: IdHandling, src: Workflow) -> Workflow {
    build(Node::Project(src, shape, id))
}

pub fn redact(expr: Expr, src: Workflow) -> Workflow {
    build(Node::Redact(src, expr))
}

pub fn limit(n: i64, src: Workflow) -> Workflow {
    build(Node::Limit(src, n))
}

pub fn skip(n: i64, src: Workflow) -> Workflow {
    build(Node::Skip(src, n))
}

pub fn unwind(field: DocVar, src: Workflow) -> Workflow {
    build(Node::Unwind(src, field))
}

pub fn group(grouped: Grouped, by: Vec<DocVar>, src: Workflow) -> Workflow {
    build(Node::Group(src, grouped, by))
}

pub fn sort(keys: Vec<SortKey>, src: Workflow) -> Workflow {
    build(Node::Sort(src, keys))
}

pub fn out(collection: impl Into<String>, src: Workflow) -> Workflow {
    build(Node::Out(src, collection.into()))
}

pub fn geo_near(spec: GeoNearSpec, src: Workflow) -> Workflow {
    build(Node::GeoNear(src, spec))
}

pub fn map(f: JsFn, src: Workflow) -> Workflow {
    build(Node::Map(src, f))
}

pub fn flat_map(f: JsFn, src: Workflow) -> Workflow {
    build(Node::FlatMap(src, f))
}

pub fn reduce(f: JsFn, src: Workflow) -> Workflow {
    build(Node::Reduce(src, f))
}

/// Builds a `FoldLeft` from a head plus a nonempty tail (`first`, `second`,
/// and any further arms).
pub fn fold_left(head: Workflow, first: Workflow, rest: Vec<Workflow>) -> Workflow {
    let mut tail = vec![first];
    tail.extend(rest);
    build(Node::FoldLeft(head, tail))
}

/// Builds a `FoldLeft` from an already-assembled tail. Fails if `tail` is
/// empty: the tail must be nonempty.
pub fn fold_left_from_tail(head: Workflow, tail: Vec<Workflow>) -> WorkflowResult<Workflow> {
    if tail.is_empty() {
        return Err(WorkflowError::EmptyFoldLeftTail);
    }
    Ok(build(Node::FoldLeft(head, tail)))
}

/// Builds a `Join` over a nonempty set of sources.
pub fn join(sources: Vec<Workflow>) -> WorkflowResult<Workflow> {
    if sources.is_empty() {
        return Err(WorkflowError::EmptyJoinSet);
    }
    Ok(build(Node::Join(sources)))
}

/// Left-to-right composition: `chain(src, op1, op2, ...)` applies each
/// `Workflow -> Workflow` operator in turn, starting from `src`. Each
/// operator already runs through `coalesce` internally (they're smart
/// constructors partially applied to everything but their source), so
/// `chain` itself performs no additional fusion.
pub fn chain(src: Workflow, ops: impl IntoIterator<Item = impl FnOnce(Workflow) -> Workflow>) -> Workflow {
    ops.into_iter().fold(src, |acc, op| op(acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_applies_operators_left_to_right() {
        let wf = chain(read("c"), [|w| limit(10, w), |w| skip(2, w)]);
        assert_eq!(wf.node_count(), 3);
    }

    #[test]
    fn join_rejects_an_empty_source_set() {
        assert!(matches!(join(vec![]), Err(WorkflowError::EmptyJoinSet)));
    }

    #[test]
    fn fold_left_from_tail_rejects_empty_tail() {
        let head = read("c");
        assert!(matches!(
            fold_left_from_tail(head, vec![]),
            Err(WorkflowError::EmptyFoldLeftTail)
        ));
    }

    #[test]
    fn coalesce_idempotence_on_limit() {
        let once = limit(5, read("c"));
        let twice = limit(5, once.clone());
        // limit(5) ∘ limit(5) ∘ src coalesces to limit(5) ∘ src: applying
        // the constructor again to an already-coalesced tree is a no-op
        // beyond the expected min-fusion.
        assert_eq!(twice.node(), &crate::node::Node::Limit(read("c"), 5));
    }
}
