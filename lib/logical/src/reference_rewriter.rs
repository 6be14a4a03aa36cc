use dbflow_common::{WorkflowError, WorkflowResult};
use dbflow_model::{BsonField, DocVar};

use crate::node::{Node, SortKey};

/// Applies `f` to every field-valued subterm of `node` — expressions,
/// selectors, reshapes, grouped values, sort keys — without recursing into
/// children. `f` is treated as a partial function: callers that only want
/// to rewrite specific paths pass a closure that returns its argument
/// unchanged on everything else.
///
/// Returns an error if rewriting a [`Node::Group`] would change the
/// structural shape of its grouped value (a rewrite is only ever supposed
/// to move leaf paths, never turn a group accumulator into something
/// else).
pub fn rewrite_node(node: &Node, f: &mut impl FnMut(&DocVar) -> DocVar) -> WorkflowResult<Node> {
    let rewritten = match node {
        Node::Pure(_) | Node::Read(_) | Node::Limit(_, _) | Node::Skip(_, _) | Node::Out(_, _) => node.clone(),
        Node::Match(src, sel) => Node::Match(src.clone(), sel.map_up_fields(f)),
        Node::Sort(src, keys) => Node::Sort(src.clone(), rewrite_sort_keys(keys, f)),
        Node::Project(src, shape, id) => Node::Project(src.clone(), shape.map_up_fields(f), *id),
        Node::Redact(src, e) => Node::Redact(src.clone(), e.map_up(f)),
        Node::Unwind(src, field) => Node::Unwind(src.clone(), f(field)),
        Node::Group(src, grouped, by) => {
            let rewritten_grouped = grouped.map_up_fields(f);
            if grouped.is_well_formed() && !rewritten_grouped.is_well_formed() {
                let field = grouped
                    .entries()
                    .iter()
                    .zip(rewritten_grouped.entries())
                    .find(|((_, before), (_, after))| before.is_group_op() && !after.is_group_op())
                    .map(|((field, _), _)| field.clone())
                    .unwrap_or_else(|| BsonField::name("<unknown>"));
                return Err(WorkflowError::RewriteChangedGroupShape { field });
            }
            Node::Group(src.clone(), rewritten_grouped, by.iter().map(|v| f(v)).collect())
        }
        Node::GeoNear(_, _) | Node::Map(_, _) | Node::FlatMap(_, _) | Node::Reduce(_, _) => node.clone(),
        Node::FoldLeft(_, _) | Node::Join(_) => node.clone(),
    };
    Ok(rewritten)
}

fn rewrite_sort_keys(keys: &[SortKey], f: &mut impl FnMut(&DocVar) -> DocVar) -> Vec<SortKey> {
    keys.iter()
        .map(|(field, dir)| {
            let rewritten = f(&DocVar::field(field.clone()));
            let new_field = rewritten.as_field().cloned().unwrap_or_else(|| field.clone());
            (new_field, *dir)
        })
        .collect()
}
