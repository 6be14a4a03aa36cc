use dbflow_logical::{Node, NodeKind, Workflow};
use dbflow_model::{BsonField, DocVar, Grouped, Reshape};

/// Top-level entry point: strips every field a `Project` or
/// `Group` computes but nothing downstream ever reads, starting from "no
/// demand" at the workflow's own output (its final shape is never pruned).
pub fn finish(wf: &Workflow) -> Workflow {
    delete_unused_fields(wf, &[])
}

/// Recomputes `wf` with every `Project`/`Group` entry not reachable from
/// `demand` removed. An empty `demand` means "no information, don't prune
/// this node's own shape" rather than "nothing is used" — the sentinel
/// [`finish`] starts with, and the one every fan-in arm restarts from, since
/// none of them can be pruned from a demand set computed for a sibling.
pub fn delete_unused_fields(wf: &Workflow, demand: &[DocVar]) -> Workflow {
    Workflow::new(prune(wf.node(), demand))
}

fn prune(node: &Node, demand: &[DocVar]) -> Node {
    match node {
        Node::Pure(v) => Node::Pure(v.clone()),
        Node::Read(c) => Node::Read(c.clone()),
        Node::Project(src, shape, id) => {
            let pruned_shape = if demand.is_empty() { shape.clone() } else { prune_reshape(shape, demand) };
            let child_demand = refs_of_reshape(&pruned_shape);
            Node::Project(recurse(src, &child_demand), pruned_shape, *id)
        }
        Node::Group(src, grouped, by) => {
            let pruned_grouped = if demand.is_empty() { grouped.clone() } else { prune_grouped(grouped, demand) };
            let mut child_demand = refs_of_grouped(&pruned_grouped);
            child_demand.extend(by.iter().cloned());
            Node::Group(recurse(src, &child_demand), pruned_grouped, by.clone())
        }
        Node::FoldLeft(head, tail) => {
            Node::FoldLeft(recurse(head, &[]), tail.iter().map(|arm| recurse(arm, &[])).collect())
        }
        Node::Join(srcs) => Node::Join(srcs.iter().map(|s| recurse(s, &[])).collect()),
        other => {
            let child_demand = match other.kind() {
                // An opaque JS body may touch any field; propagating the
                // caller's demand past it would let an upstream Project
                // drop something this function actually reads.
                NodeKind::Js => Vec::new(),
                _ => union_demand(demand, &other.refs()),
            };
            other.map_children(|child| recurse(child, &child_demand))
        }
    }
}

fn recurse(src: &Workflow, demand: &[DocVar]) -> Workflow {
    delete_unused_fields(src, demand)
}

fn union_demand(a: &[DocVar], b: &[DocVar]) -> Vec<DocVar> {
    let mut out = a.to_vec();
    for v in b {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

/// `true` if some entry in `demand` could resolve through `field`: either
/// `field` names (a prefix of) a demanded path, or a demanded path names (a
/// prefix of) `field` — either direction means the subtree under `field`
/// still matters.
fn is_relevant(field: &BsonField, demand: &[DocVar]) -> bool {
    demand.iter().any(|v| match v {
        DocVar::Root => true,
        DocVar::Field(d) => is_path_prefix(field, d) || is_path_prefix(d, field),
    })
}

fn is_path_prefix(prefix: &BsonField, path: &BsonField) -> bool {
    let prefix_parts = prefix.parts();
    prefix_parts.len() <= path.parts().len() && prefix_parts == &path.parts()[..prefix_parts.len()]
}

/// Drops every top-level `Reshape` entry `demand` doesn't reach. Never
/// prunes down to an empty reshape — a `$project` emitting no fields at all
/// isn't the same operator as the one it replaced.
fn prune_reshape(shape: &Reshape, demand: &[DocVar]) -> Reshape {
    let kept: Vec<_> = shape.entries().iter().filter(|(field, _)| is_relevant(field, demand)).cloned().collect();
    if kept.is_empty() {
        shape.clone()
    } else {
        Reshape::from_entries(kept)
    }
}

fn prune_grouped(grouped: &Grouped, demand: &[DocVar]) -> Grouped {
    let kept: Vec<_> = grouped.entries().iter().filter(|(field, _)| is_relevant(field, demand)).cloned().collect();
    if kept.is_empty() {
        grouped.clone()
    } else {
        Grouped::from_entries(kept)
    }
}

fn refs_of_reshape(shape: &Reshape) -> Vec<DocVar> {
    let mut out = Vec::new();
    for (_, expr) in shape.get_all() {
        collect_expr_refs(expr, &mut out);
    }
    out
}

fn refs_of_grouped(grouped: &Grouped) -> Vec<DocVar> {
    let mut out = Vec::new();
    for (_, expr) in grouped.entries() {
        collect_expr_refs(expr, &mut out);
    }
    out
}

fn collect_expr_refs(expr: &dbflow_model::Expr, out: &mut Vec<DocVar>) {
    use dbflow_model::Expr;
    match expr {
        Expr::Literal(_) => {}
        Expr::Field(var) => out.push(var.clone()),
        Expr::Call(_, args) => args.iter().for_each(|a| collect_expr_refs(a, out)),
        Expr::Group(_, inner) => collect_expr_refs(inner, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_logical::{limit, project, read};
    use dbflow_model::{Expr, IdHandling, ReshapeNode};

    fn two_field_project(src: Workflow) -> Workflow {
        let mut shape = Reshape::new();
        shape.set(BsonField::name("kept"), ReshapeNode::Leaf(Expr::Field(DocVar::field(BsonField::name("a")))));
        shape.set(BsonField::name("dropped"), ReshapeNode::Leaf(Expr::Field(DocVar::field(BsonField::name("b")))));
        project(shape, IdHandling::IgnoreId, src)
    }

    #[test]
    fn top_level_project_keeps_every_entry() {
        let wf = two_field_project(read("c"));
        let finished = finish(&wf);
        match finished.node() {
            Node::Project(_, shape, _) => assert_eq!(shape.entries().len(), 2),
            other => panic!("expected Project, got {other:?}"),
        }
    }

    #[test]
    fn project_feeding_a_narrower_project_drops_the_unread_field() {
        let mut outer_shape = Reshape::new();
        outer_shape.set(
            BsonField::name("kept"),
            ReshapeNode::Leaf(Expr::Field(DocVar::field(BsonField::name("kept")))),
        );
        // A `limit` sits between the two projects so the coalescer's
        // adjacent-project fusion rule doesn't already collapse them before
        // `finish` gets a chance to prune by demand.
        let wf = project(outer_shape, IdHandling::IgnoreId, limit(5, two_field_project(read("c"))));

        let finished = finish(&wf);
        match finished.node() {
            Node::Project(inner, _, _) => match inner.node() {
                Node::Limit(inner, _) => match inner.node() {
                    Node::Project(_, shape, _) => {
                        assert_eq!(shape.entries().len(), 1);
                        assert_eq!(shape.entries()[0].0, BsonField::name("kept"));
                    }
                    other => panic!("expected the inner Project, got {other:?}"),
                },
                other => panic!("expected Limit, got {other:?}"),
            },
            other => panic!("expected Project, got {other:?}"),
        }
    }

    #[test]
    fn shape_preserving_nodes_pass_demand_through_untouched() {
        let wf = limit(5, two_field_project(read("c")));
        let finished = finish(&wf);
        match finished.node() {
            Node::Limit(inner, _) => match inner.node() {
                Node::Project(_, shape, _) => assert_eq!(shape.entries().len(), 2),
                other => panic!("expected Project, got {other:?}"),
            },
            other => panic!("expected Limit, got {other:?}"),
        }
    }
}
