use std::collections::HashSet;

use itertools::Itertools;

use dbflow_common::{WorkflowError, WorkflowResult};
use dbflow_logical::{rewrite_node, Node, Workflow};
use dbflow_model::{Bson, BsonField, Conventions, DocVar, Document, Expr, Grouped, IdHandling, Reshape, ReshapeNode};

/// `merge(left, right) -> ((baseL, baseR), merged)`.
///
/// `merged` is a single workflow combining both operands' data; `baseL`
/// and `baseR` are paths into `merged` at which the original roots of
/// `left` and `right` respectively are now found.
pub fn merge(left: &Workflow, right: &Workflow) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    // Rule 1: identity.
    if left == right {
        return Ok(((DocVar::Root, DocVar::Root), left.clone()));
    }

    match (left.node(), right.node()) {
        // Rule 2: both pure.
        (Node::Pure(l), Node::Pure(r)) => {
            let mut doc = Document::new();
            doc.insert(Conventions::L_EFT, l.clone());
            doc.insert(Conventions::R_IGHT, r.clone());
            Ok((
                (DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())),
                Workflow::new(Node::Pure(Bson::Document(doc))),
            ))
        }

        // Rule 3: one pure.
        (Node::Pure(l), _) => Ok(inject_pure_beside(l.clone(), right.clone())),
        (_, Node::Pure(r)) => {
            let (bases, merged) = inject_pure_beside(r.clone(), left.clone());
            Ok((swap(bases), merged))
        }

        // Rule 9: two groups sharing the same `by`.
        (Node::Group(lsrc, lg, lby), Node::Group(rsrc, rg, rby)) if lby == rby => {
            merge_two_groups(lsrc, lg, lby, rsrc, rg)
        }

        // Rule 8: Unwind vs Group (delegated the other way around too).
        (Node::Unwind(lsrc, field), Node::Group(_, _, _)) => merge_unwind_vs_other(lsrc, field, right),
        (Node::Group(_, _, _), Node::Unwind(rsrc, field)) => {
            let (bases, merged) = merge_unwind_vs_other(rsrc, field, left)?;
            Ok((swap(bases), merged))
        }

        // Rule 13: two redacts.
        (Node::Redact(lsrc, le), Node::Redact(rsrc, re)) => {
            let ((base_l, base_r), common) = merge(lsrc, rsrc)?;
            let re2 = rebase_expr(re, &base_r);
            let le2 = rebase_expr(le, &base_l);
            let inner = Workflow::new(Node::Redact(common, re2));
            let outer = Workflow::new(Node::Redact(inner, le2));
            Ok(((base_l, base_r), outer))
        }

        // Rule 14: two unwinds.
        (Node::Unwind(lsrc, lfield), Node::Unwind(rsrc, rfield)) => {
            let ((base_l, base_r), common) = merge(lsrc, rsrc)?;
            let lfield2 = base_l.compose(lfield);
            let rfield2 = base_r.compose(rfield);
            let merged = if lfield2 == rfield2 {
                Workflow::new(Node::Unwind(common, lfield2))
            } else {
                let inner = Workflow::new(Node::Unwind(common, rfield2));
                Workflow::new(Node::Unwind(inner, lfield2))
            };
            Ok(((base_l, base_r), merged))
        }

        // Rule 16: Read vs Map (and the reversed Map vs Read, by delegate).
        (Node::Read(_), Node::Map(rsrc, f)) if *rsrc == *left => merge_read_vs_map(left, f),
        (Node::Map(lsrc, f), Node::Read(_)) if *lsrc == *right => {
            let (bases, merged) = merge_read_vs_map(right, f)?;
            Ok((swap(bases), merged))
        }

        // Rule 5 / 7: Project sharing the other side, or Project vs source.
        (Node::Project(lsrc, shape, id), _) if *lsrc == *right => Ok(project_beside(shape, *id, right.clone(), true)),
        (_, Node::Project(rsrc, shape, id)) if *rsrc == *left => {
            let (bases, merged) = project_beside(shape, *id, left.clone(), true);
            Ok((swap(bases), merged))
        }

        // Rule 11: two projects.
        (Node::Project(lsrc, lshape, lid), Node::Project(rsrc, rshape, rid)) => {
            merge_two_projects(lsrc, lshape, *lid, rsrc, rshape, *rid)
        }

        // Rule 17: Map vs Project.
        (Node::Map(_, _), Node::Project(rsrc, shape, _)) => merge_map_vs_project(left, rsrc, shape, false),
        (Node::Project(lsrc, shape, _), Node::Map(_, _)) => merge_map_vs_project(right, lsrc, shape, true),

        // Rule 12: Project vs pipeline (any other pipeline op).
        (Node::Project(lsrc, shape, _), _) if right.node().is_pipelineable() || right.node().is_source() => {
            merge_project_vs_pipeline(lsrc, shape, right, false)
        }
        (_, Node::Project(rsrc, shape, _)) if left.node().is_pipelineable() || left.node().is_source() => {
            merge_project_vs_pipeline(rsrc, shape, left, true)
        }

        // Rule 15: Unwind vs Redact.
        (Node::Unwind(_, _), Node::Redact(_, _)) | (Node::Redact(_, _), Node::Unwind(_, _)) => {
            merge_reparent_right(left, right)
        }

        // Rule 10: Group vs arbitrary pipeline.
        (Node::Group(_, _, _), _) if right.node().is_pipelineable() => merge_group_vs_pipeline(left, right, false),
        (_, Node::Group(_, _, _)) if left.node().is_pipelineable() => merge_group_vs_pipeline(right, left, true),

        // Rule 4: GeoNear vs pipeline.
        (Node::GeoNear(_, _), _) if right.node().is_single_source() => merge_reparent_right(left, right),
        (_, Node::GeoNear(_, _)) if left.node().is_single_source() => {
            let (bases, merged) = merge_reparent_right(right, left)?;
            Ok((swap(bases), merged))
        }

        // Rule 6 / 18: shape-preserving (or any other pipeline op) vs pipeline.
        (_, _) if right.node().is_single_source() => merge_reparent_right(left, right),
        (_, _) if left.node().is_single_source() => {
            let (bases, merged) = merge_reparent_right(right, left)?;
            Ok((swap(bases), merged))
        }

        // Rule 19: fallback.
        _ => Ok(fold_left_fallback(left, right)),
    }
}

fn swap<T>((a, b): (T, T)) -> (T, T) {
    (b, a)
}

/// `rewrite(op, base) -> (op', base')`: rebases every field
/// reference in `op` by composing it with `base`, returning `ROOT` as the
/// new base exactly when `op` is a `Group` or `Project`.
fn rewrite(op: &Node, base: &DocVar) -> WorkflowResult<(Node, DocVar)> {
    let rewritten = rewrite_node(op, &mut |v| base.compose(v))?;
    let new_base = match &rewritten {
        Node::Group(_, _, _) | Node::Project(_, _, _) => DocVar::Root,
        _ => base.clone(),
    };
    Ok((rewritten, new_base))
}

fn rebase_expr(expr: &Expr, base: &DocVar) -> Expr {
    expr.map_up(&mut |v| base.compose(v))
}

/// Recurses on `(left, right.src)`, rebases `right`'s own payload against
/// the recursive merge's right-hand base, and reparents it onto the merged
/// common source. Used directly by rules 6/18 and as the core of rules
/// 4/15.
fn merge_reparent_right(left: &Workflow, right: &Workflow) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let right_src = right
        .node()
        .src()
        .ok_or_else(|| WorkflowError::Internal("merge_reparent_right requires a single-source node".into()))?;
    let ((base_l, base_r), common) = merge(left, right_src)?;
    let (rewritten, new_base_r) = rewrite(right.node(), &base_r)?;
    let reparented = rewritten
        .reparent(common)
        .ok_or_else(|| WorkflowError::Internal("expected a single-source node to reparent".into()))?;
    Ok(((base_l, new_base_r), Workflow::new(reparented)))
}

fn inject_pure_beside(literal: Bson, other: Workflow) -> ((DocVar, DocVar), Workflow) {
    let mut shape = Reshape::new();
    shape.set(Conventions::left_field(), ReshapeNode::Leaf(Expr::Literal(literal)));
    shape.set(Conventions::right_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
    let merged = Workflow::new(Node::Project(other, shape, IdHandling::IncludeId));
    (
        (DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())),
        merged,
    )
}

fn project_beside(shape: &Reshape, id: IdHandling, other: Workflow, _left_has_shape: bool) -> ((DocVar, DocVar), Workflow) {
    let mut wrapped = Reshape::new();
    wrapped.set(Conventions::left_field(), ReshapeNode::Nested(shape.clone()));
    wrapped.set(Conventions::right_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
    let merged = Workflow::new(Node::Project(other, wrapped, id.chain(IdHandling::IncludeId)));
    (
        (DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())),
        merged,
    )
}

fn merge_two_projects(
    lsrc: &Workflow,
    lshape: &Reshape,
    lid: IdHandling,
    rsrc: &Workflow,
    rshape: &Reshape,
    rid: IdHandling,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let ((base_l, base_r), common) = merge(lsrc, rsrc)?;
    let (l_node, base_l) = rewrite(&Node::Project(common.clone(), lshape.clone(), lid), &base_l)?;
    let (r_node, base_r) = rewrite(&Node::Project(common.clone(), rshape.clone(), rid), &base_r)?;
    let (Node::Project(_, lshape, lid), Node::Project(_, rshape, rid)) = (&l_node, &r_node) else {
        unreachable!("rewrite preserves variant");
    };

    if let Some(combined_shape) = lshape.merge(rshape) {
        let merged = Workflow::new(Node::Project(common, combined_shape, lid.combine(*rid)));
        return Ok(((base_l, base_r), merged));
    }

    let mut wrapped = Reshape::new();
    wrapped.set(Conventions::left_field(), ReshapeNode::Nested(lshape.clone()));
    wrapped.set(Conventions::right_field(), ReshapeNode::Nested(rshape.clone()));
    let merged = Workflow::new(Node::Project(common, wrapped, lid.combine(*rid)));
    Ok((
        (Conventions::left_field_var().compose(&base_l), Conventions::right_field_var().compose(&base_r)),
        merged,
    ))
}

fn merge_project_vs_pipeline(
    lsrc: &Workflow,
    shape: &Reshape,
    other: &Workflow,
    swapped: bool,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let ((base_l, base_r), common) = merge(lsrc, other)?;
    let mut wrapped = Reshape::new();
    wrapped.set(Conventions::left_field(), ReshapeNode::Nested(shape.clone()));
    wrapped.set(Conventions::right_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
    let merged = Workflow::new(Node::Project(common, wrapped, IdHandling::IncludeId));
    let bases = (Conventions::left_field_var().compose(&base_l), Conventions::right_field_var().compose(&base_r));
    Ok((if swapped { swap(bases) } else { bases }, merged))
}

fn merge_map_vs_project(
    map_side: &Workflow,
    project_src: &Workflow,
    shape: &Reshape,
    swapped: bool,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let ((base_l, base_r), common) = merge(map_side, project_src)?;
    let mut wrapped = Reshape::new();
    wrapped.set(Conventions::left_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
    wrapped.set(Conventions::right_field(), ReshapeNode::Nested(shape.clone()));
    let merged = Workflow::new(Node::Project(common, wrapped, IdHandling::IncludeId));
    let bases = (Conventions::left_field_var().compose(&base_l), Conventions::right_field_var().compose(&base_r));
    Ok((if swapped { swap(bases) } else { bases }, merged))
}

fn merge_two_groups(
    lsrc: &Workflow,
    lg: &Grouped,
    by: &[DocVar],
    rsrc: &Workflow,
    rg: &Grouped,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let ((base_l, base_r), common) = merge(lsrc, rsrc)?;
    let lg = lg.map_up_fields(&mut |v| base_l.compose(v));
    let rg = rg.map_up_fields(&mut |v| base_r.compose(v));
    let by: Vec<DocVar> = by.iter().map(|v| base_l.compose(v)).collect();

    let existing: HashSet<BsonField> = lg.entries().iter().chain(rg.entries()).map(|(f, _)| f.clone()).collect();
    let l_temps = BsonField::gen_uniq_names(lg.entries().len(), &existing);
    let mut existing_plus_l = existing;
    existing_plus_l.extend(l_temps.iter().cloned());
    let r_temps = BsonField::gen_uniq_names(rg.entries().len(), &existing_plus_l);

    // `zip_eq` over `.zip()`: `l_temps`/`r_temps` are generated with exactly
    // `lg`/`rg`'s entry count above, so a length mismatch here would mean
    // `gen_uniq_names` broke that invariant, not a legitimate short merge.
    let mut merged_entries = Vec::new();
    let mut project_shape = Reshape::new();
    for ((orig_field, expr), temp) in lg.entries().iter().zip_eq(l_temps.iter()) {
        merged_entries.push((temp.clone(), expr.clone()));
        project_shape.set(
            Conventions::left_field().append(orig_field),
            ReshapeNode::Leaf(Expr::Field(DocVar::field(temp.clone()))),
        );
    }
    for ((orig_field, expr), temp) in rg.entries().iter().zip_eq(r_temps.iter()) {
        merged_entries.push((temp.clone(), expr.clone()));
        project_shape.set(
            Conventions::right_field().append(orig_field),
            ReshapeNode::Leaf(Expr::Field(DocVar::field(temp.clone()))),
        );
    }

    let group = Workflow::new(Node::Group(common, Grouped::from_entries(merged_entries), by));
    let merged = Workflow::new(Node::Project(group, project_shape, IdHandling::IncludeId));
    Ok(((DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())), merged))
}

fn merge_unwind_vs_other(
    lsrc: &Workflow,
    field: &DocVar,
    other: &Workflow,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let ((base_l, base_r), common) = merge(lsrc, other)?;
    let unwind_field = base_l.compose(field);
    let merged = Workflow::new(Node::Unwind(common, unwind_field));
    Ok(((base_l, base_r), merged))
}

fn merge_group_vs_pipeline(
    group_side: &Workflow,
    pipeline_side: &Workflow,
    swapped: bool,
) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let Node::Group(gsrc, grouped, by) = group_side.node() else {
        return Err(WorkflowError::Internal("merge_group_vs_pipeline requires a Group".into()));
    };
    let ((base_g, base_p), common) = merge(gsrc, pipeline_side)?;
    let existing: HashSet<BsonField> = grouped.entries().iter().map(|(f, _)| f.clone()).collect();
    let u = BsonField::gen_uniq_name(&existing);

    let mut pushed = grouped.map_up_fields(&mut |v| base_g.compose(v));
    let mut entries = pushed.entries().to_vec();
    entries.push((
        u.clone(),
        Expr::Group(
            dbflow_model::GroupOp::Push,
            Box::new(Expr::Field(base_p.compose(&DocVar::Root))),
        ),
    ));
    pushed = Grouped::from_entries(entries);

    let by: Vec<DocVar> = by.iter().map(|v| base_g.compose(v)).collect();
    let group = Workflow::new(Node::Group(common, pushed, by));
    let merged = Workflow::new(Node::Unwind(group, DocVar::field(u.clone())));
    let bases = (base_g, DocVar::field(u));
    Ok((if swapped { swap(bases) } else { bases }, merged))
}

/// Rule 16, canonical `(Read, Map)` order: the left arm renames the read's
/// root to `lEft`; the right arm projects the field the map reads (here, the
/// whole document under the `value` convention) to `value`, runs the map,
/// then renames its output to `rIght`.
fn merge_read_vs_map(read: &Workflow, map_fn: &dbflow_model::JsFn) -> WorkflowResult<((DocVar, DocVar), Workflow)> {
    let left_arm = Workflow::new(Node::Project(
        read.clone(),
        {
            let mut s = Reshape::new();
            s.set(Conventions::left_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
            s
        },
        IdHandling::IncludeId,
    ));

    let mapped_input = Workflow::new(Node::Project(
        read.clone(),
        {
            let mut s = Reshape::new();
            s.set(Conventions::expr_var(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
            s
        },
        IdHandling::IncludeId,
    ));
    let mapped = Workflow::new(Node::Map(mapped_input, map_fn.clone()));
    let right_arm = Workflow::new(Node::Project(
        mapped,
        {
            let mut s = Reshape::new();
            s.set(Conventions::right_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
            s
        },
        IdHandling::IncludeId,
    ));

    let merged = Workflow::new(Node::FoldLeft(read.clone(), vec![left_arm, right_arm]));
    Ok(((DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())), merged))
}

fn fold_left_fallback(left: &Workflow, right: &Workflow) -> ((DocVar, DocVar), Workflow) {
    let left_arm = Workflow::new(Node::Project(
        left.clone(),
        {
            let mut s = Reshape::new();
            s.set(Conventions::left_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
            s
        },
        IdHandling::IncludeId,
    ));
    let right_arm = Workflow::new(Node::Project(
        right.clone(),
        {
            let mut s = Reshape::new();
            s.set(Conventions::right_field(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
            s
        },
        IdHandling::IncludeId,
    ));
    let merged = Workflow::new(Node::FoldLeft(left.clone(), vec![left_arm, right_arm]));
    (
        (DocVar::field(Conventions::left_field()), DocVar::field(Conventions::right_field())),
        merged,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_logical::read;

    #[test]
    fn merge_identity_returns_root_root() {
        let wf = read("c");
        let ((base_l, base_r), merged) = merge(&wf, &wf).unwrap();
        assert_eq!(base_l, DocVar::Root);
        assert_eq!(base_r, DocVar::Root);
        assert_eq!(merged, wf);
    }

    #[test]
    fn merge_is_symmetric_with_swapped_bases() {
        let l = read("c");
        let r = read("d");
        let (bases_lr, merged_lr) = merge(&l, &r).unwrap();
        let (bases_rl, merged_rl) = merge(&r, &l).unwrap();
        assert_eq!(bases_rl, swap(bases_lr));
        assert_eq!(merged_lr, merged_rl);
    }

    #[test]
    fn merge_two_pures_wraps_both_under_reserved_names() {
        let l = dbflow_logical::pure(Bson::Int32(1));
        let r = dbflow_logical::pure(Bson::Int32(2));
        let ((base_l, base_r), _merged) = merge(&l, &r).unwrap();
        assert_eq!(base_l, DocVar::field(Conventions::left_field()));
        assert_eq!(base_r, DocVar::field(Conventions::right_field()));
    }
}

#[cfg(test)]
mod merge_properties {
    use proptest::prelude::*;

    use super::merge;
    use dbflow_logical::{limit, read, skip};
    use dbflow_model::Bson;

    /// A handful of small, cheaply-comparable workflows — enough shapes to
    /// exercise several merge rules (identity, source-vs-source, and the
    /// shape-preserving-vs-pipeline rules) without building a full
    /// recursive `Arbitrary` impl for `Workflow`.
    fn small_workflow() -> impl Strategy<Value = dbflow_logical::Workflow> {
        prop_oneof![
            Just(read("c")),
            Just(read("d")),
            Just(dbflow_logical::pure(Bson::Int32(1))),
            (1i64..50).prop_map(|n| limit(n, read("c"))),
            (1i64..50).prop_map(|n| skip(n, read("d"))),
        ]
    }

    proptest! {
        /// `merge` is symmetric: swapping the operands
        /// swaps the returned base pair and leaves the merged tree itself
        /// unchanged, for any pair of workflows the merger can combine.
        #[test]
        fn merge_is_symmetric(l in small_workflow(), r in small_workflow()) {
            let lr = merge(&l, &r);
            let rl = merge(&r, &l);
            match (lr, rl) {
                (Ok(((bl, br), merged_lr)), Ok(((bl2, br2), merged_rl))) => {
                    prop_assert_eq!(bl, br2);
                    prop_assert_eq!(br, bl2);
                    prop_assert_eq!(merged_lr, merged_rl);
                }
                (Err(_), Err(_)) => {}
                other => prop_assert!(false, "merge(l,r) and merge(r,l) disagreed on success: {:?}", other.0),
            }
        }

        /// `merge(w, w)` is always the identity rule:
        /// both bases come back as `ROOT` and the merged tree equals `w`.
        #[test]
        fn merge_with_self_is_identity(w in small_workflow()) {
            let ((base_l, base_r), merged) = merge(&w, &w).unwrap();
            prop_assert_eq!(base_l, dbflow_model::DocVar::Root);
            prop_assert_eq!(base_r, dbflow_model::DocVar::Root);
            prop_assert_eq!(merged, w);
        }
    }
}
