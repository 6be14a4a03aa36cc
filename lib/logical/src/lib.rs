//! The workflow tree and its local rewrites: the operator model, the
//! reference rewriter, and the coalescing smart constructors.

mod coalesce;
mod constructors;
mod node;
mod reference_rewriter;

pub use coalesce::coalesce;
pub use constructors::{
    chain, flat_map, fold_left, fold_left_from_tail, geo_near, group, join, limit, map, match_, out, project,
    pure, read, redact, reduce, skip, sort, unwind,
};
pub use node::{GeoNearSpec, Node, NodeKind, Rhs, SortDir, SortKey, Workflow};
pub use reference_rewriter::rewrite_node;
