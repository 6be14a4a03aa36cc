use dbflow_model::{DocVar, Expr, Grouped, IdHandling, JsFn, Reshape, ReshapeNode};

use crate::node::{Node, Workflow};

/// Runs exactly one round of local fusion on `parent`, whose single child
/// (if any) has already passed through `coalesce` itself — so the
/// coalescer never needs to recurse. Every smart constructor in
/// [`crate::constructors`] calls this once.
///
/// Combinations with no rule in the table are returned unchanged; the
/// coalescer never invents semantics for a pairing it doesn't recognize.
pub fn coalesce(parent: Node) -> Node {
    let Some(src) = parent.src().cloned() else {
        return fold_left_rule(parent);
    };
    let precedent = src.node().clone();

    match (&parent, &precedent) {
        (Node::Match(_, sel), Node::Sort(inner, keys)) => {
            Node::Sort(Workflow::new(Node::Match(inner.clone(), sel.clone())), keys.clone())
        }
        (Node::Match(_, sel1), Node::Match(inner, sel0)) => {
            Node::Match(inner.clone(), sel0.clone().and(sel1.clone()))
        }
        (Node::Project(_, shape1, id1), Node::Project(inner, shape0, id0)) => {
            match inline_project(shape0, shape1) {
                Some(fused) => Node::Project(inner.clone(), fused, id0.chain(*id1)),
                None => parent,
            }
        }
        (Node::Project(_, shape, id), Node::Group(inner, grouped, by)) if *id != IdHandling::ExcludeId => {
            match inline_project_group(shape, grouped) {
                Some(fused) => Node::Group(inner.clone(), fused, by.clone()),
                None => parent,
            }
        }
        (Node::Project(_, shape, id), Node::Unwind(unwind_src, field)) if *id != IdHandling::ExcludeId => {
            match unwind_src.node() {
                Node::Group(inner, grouped, by) => match inline_project_group(shape, grouped) {
                    Some(fused) => Node::Unwind(
                        Workflow::new(Node::Group(inner.clone(), fused, by.clone())),
                        field.clone(),
                    ),
                    None => parent,
                },
                _ => parent,
            }
        }
        (Node::Limit(_, n), Node::Limit(inner, m)) => Node::Limit(inner.clone(), (*m).min(*n)),
        (Node::Limit(_, n), Node::Skip(inner, m)) => {
            Node::Skip(Workflow::new(Node::Limit(inner.clone(), m + n)), *m)
        }
        (Node::Skip(_, n), Node::Skip(inner, m)) => Node::Skip(inner.clone(), m + n),
        (Node::Map(_, g), Node::Map(inner, f)) => Node::Map(inner.clone(), JsFn::compose(g, f)),
        (Node::Map(_, g), Node::FlatMap(inner, f)) => Node::FlatMap(inner.clone(), map_compose(g, f)),
        (Node::FlatMap(_, g), Node::Map(inner, f)) => Node::FlatMap(inner.clone(), JsFn::compose(g, f)),
        (Node::FlatMap(_, g), Node::FlatMap(inner, f)) => Node::FlatMap(inner.clone(), kleisli_compose(g, f)),
        (Node::Out(_, _), Node::Read(coll)) => Node::Read(coll.clone()),
        (Node::GeoNear(_, _), Node::GeoNear(_, _)) => {
            // TODO: parameter merge for two GeoNears in a row is
            // unspecified upstream; preserve as a no-op.
            parent
        }
        (Node::Group(_, grouped, by), Node::Project(inner, shape, _)) => {
            match inline_group_projects(grouped, by, shape) {
                Some((grouped2, by2)) => Node::Group(inner.clone(), grouped2, by2),
                None => parent,
            }
        }
        _ => parent,
    }
}

fn fold_left_rule(parent: Node) -> Node {
    if let Node::FoldLeft(head, tail) = &parent {
        if let Node::FoldLeft(head0, tail0) = head.node() {
            let mut merged_tail = tail0.clone();
            merged_tail.extend(tail.iter().cloned());
            return Node::FoldLeft(head0.clone(), merged_tail);
        }
    }
    parent
}

/// Tries to compose two chained projects into one: every `Field` leaf of
/// `shape1` that names a path `shape0` also defines is substituted with
/// `shape0`'s definition; leaves `shape0` is silent on pass through
/// unchanged (MongoDB's `$project` keeps unlisted fields). Fails only when
/// `shape1` references something $project couldn't express after
/// substitution — in this model, never, so the `Option` always succeeds;
/// kept as `Option` to match the external contract and leave room for a
/// stricter definition later.
fn inline_project(shape0: &Reshape, shape1: &Reshape) -> Option<Reshape> {
    let mut fused = Reshape::new();
    for (field, node) in shape1.entries() {
        fused.set(field.clone(), substitute_node(node, shape0));
    }
    Some(fused)
}

fn substitute_node(node: &ReshapeNode, shape0: &Reshape) -> ReshapeNode {
    match node {
        ReshapeNode::Leaf(expr) => ReshapeNode::Leaf(substitute_expr(expr, shape0)),
        ReshapeNode::Nested(inner) => {
            let mut fused = Reshape::new();
            for (field, child) in inner.entries() {
                fused.set(field.clone(), substitute_node(child, shape0));
            }
            ReshapeNode::Nested(fused)
        }
    }
}

fn substitute_expr(expr: &Expr, shape0: &Reshape) -> Expr {
    expr.map_up(&mut |var| match var.as_field() {
        Some(path) => match shape0.get(path) {
            Some(ReshapeNode::Leaf(Expr::Field(replacement))) => replacement.clone(),
            _ => var.clone(),
        },
        None => var.clone(),
    })
}

/// Tries to push a pure field-renaming `Project` down through a `Group`:
/// succeeds only if every leaf of `shape` is a plain field reference to one
/// of `grouped`'s keys, in which case the grouped map is re-keyed under the
/// project's output names.
fn inline_project_group(shape: &Reshape, grouped: &Grouped) -> Option<Grouped> {
    let mut renamed = Vec::with_capacity(shape.get_all().len());
    for (out_field, expr) in shape.get_all() {
        let Expr::Field(var) = expr else { return None };
        let source_field = var.as_field()?;
        let value = grouped.get(source_field)?;
        renamed.push((out_field, value.clone()));
    }
    Some(Grouped::from_entries(renamed))
}

/// Tries to push a `Project` sitting below a `Group` into the group's `by`
/// keys and grouped expressions, for the case `Group(...) ∘ Project(...)`:
/// succeeds only if every `DocVar` the group references resolves to a plain
/// field reference under `shape`.
fn inline_group_projects(grouped: &Grouped, by: &[DocVar], shape: &Reshape) -> Option<(Grouped, Vec<DocVar>)> {
    let resolve = |var: &DocVar| -> Option<DocVar> {
        match var {
            DocVar::Root => Some(DocVar::Root),
            DocVar::Field(path) => match shape.get(path) {
                Some(ReshapeNode::Leaf(Expr::Field(replacement))) => Some(replacement.clone()),
                None => Some(var.clone()),
                _ => None,
            },
        }
    };

    let mut new_entries = Vec::with_capacity(grouped.entries().len());
    for (field, expr) in grouped.entries() {
        let rewritten = expr.map_up(&mut |var| resolve(var).unwrap_or_else(|| var.clone()));
        new_entries.push((field.clone(), rewritten));
    }
    let mut new_by = Vec::with_capacity(by.len());
    for var in by {
        new_by.push(resolve(var)?);
    }
    Some((Grouped::from_entries(new_entries), new_by))
}

/// `g` applied to every element produced by `f`: the fusion of a `Map`
/// feeding a `FlatMap`.
fn map_compose(g: &JsFn, f: &JsFn) -> JsFn {
    let x = "__x";
    let list = f.call(&[x]);
    JsFn::new([x], format!("({list}).map({})", g.render()))
}

/// Kleisli composition of two list-returning functions: `f`'s output list,
/// flat-mapped through `g`.
fn kleisli_compose(g: &JsFn, f: &JsFn) -> JsFn {
    let x = "__x";
    let list = f.call(&[x]);
    JsFn::new([x], format!("({list}).flatMap({})", g.render()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::{limit, match_, read, skip};
    use dbflow_model::{Bson, BsonField, Selector};

    #[test]
    fn limit_limit_takes_the_minimum() {
        let wf = limit(10, limit(3, read("c")));
        assert_eq!(wf.node(), &Node::Limit(Workflow::new(Node::Read("c".into())), 3));
    }

    #[test]
    fn limit_then_skip_swaps_and_adjusts() {
        let wf = limit(7, skip(2, read("c")));
        match wf.node() {
            Node::Skip(inner, m) => {
                assert_eq!(*m, 2);
                assert_eq!(inner.node(), &Node::Limit(Workflow::new(Node::Read("c".into())), 9));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn skip_skip_adds() {
        let wf = skip(5, skip(2, read("c")));
        assert_eq!(wf.node(), &Node::Skip(Workflow::new(Node::Read("c".into())), 7));
    }

    #[test]
    fn match_match_fuses_with_earlier_selector_first() {
        let a = Selector::Doc(BsonField::name("a"), Bson::Int32(1));
        let b = Selector::Doc(BsonField::name("b"), Bson::Int32(2));
        let wf = match_(b.clone(), match_(a.clone(), read("c")));
        match wf.node() {
            Node::Match(_, Selector::And(clauses)) => assert_eq!(clauses, &vec![a, b]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_after_read_collapses_to_read() {
        use crate::constructors::out;
        let wf = out("archive", read("c"));
        assert_eq!(wf.node(), &Node::Read("c".into()));
    }
}
