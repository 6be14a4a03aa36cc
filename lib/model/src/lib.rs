//! Opaque sublanguages used by the dbflow workflow compiler.
//!
//! This crate gives bodies to the types spec'd as external collaborators in
//! the compiler core: field paths (`BsonField`), the rebase path type
//! (`DocVar`), the `_id` discipline (`IdHandling`), the expression,
//! selector, reshape, and grouping sublanguages, and the embedded scripting
//! AST used by map/reduce bodies. None of these model a real query language
//! end to end — they carry exactly the operations the workflow compiler
//! needs and no parser or optimizer of their own.

mod bson_field;
mod conventions;
mod doc_var;
mod expr;
mod grouped;
mod id_handling;
mod js;
mod reshape;
mod selector;

pub use bson_field::BsonField;
pub use conventions::Conventions;
pub use doc_var::DocVar;
pub use expr::{Expr, GroupOp};
pub use grouped::Grouped;
pub use id_handling::IdHandling;
pub use js::JsFn;
pub use reshape::{Reshape, ReshapeNode};
pub use selector::Selector;

// Document literals are not modeled by this crate; we re-export the `bson`
// crate's value type directly, treating it as a fully opaque leaf with no
// behavior beyond literal construction and equality.
pub use bson::{Bson, Document};
