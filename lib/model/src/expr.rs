use crate::{Bson, DocVar};

/// The group accumulator operators that a [`GroupOp`]-typed [`Expr`] leaf
/// may wrap. `Grouped` values are restricted to these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupOp {
    First,
    Last,
    Sum,
    Avg,
    Min,
    Max,
    Push,
    AddToSet,
}

/// The expression sublanguage: a small recursive value that may reference
/// fields of the current document, apply a named function, or wrap a group
/// accumulator over an inner expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal BSON value.
    Literal(Bson),
    /// A reference to a field (or the root) of the current document.
    Field(DocVar),
    /// Application of a named function to a list of argument expressions.
    Call(String, Vec<Expr>),
    /// A group accumulator applied to an inner expression. The rewriter
    /// must never turn this into a non-`Group` expression.
    Group(GroupOp, Box<Expr>),
}

impl Expr {
    /// Bottom-up rewrite: applies `f` to every [`DocVar`] leaf, from the
    /// inside out. The identity on a term with no `Field` leaves.
    pub fn map_up(&self, f: &mut impl FnMut(&DocVar) -> DocVar) -> Expr {
        match self {
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Field(var) => Expr::Field(f(var)),
            Expr::Call(name, args) => {
                Expr::Call(name.clone(), args.iter().map(|a| a.map_up(f)).collect())
            }
            Expr::Group(op, inner) => Expr::Group(*op, Box::new(inner.map_up(f))),
        }
    }

    /// `true` iff this expression is a group-accumulator application. Used
    /// by the reference rewriter to detect a broken rewrite of a `Grouped`
    /// value: it is an error for a rewrite to change the structural shape
    /// of a grouped value.
    pub fn is_group_op(&self) -> bool {
        matches!(self, Expr::Group(_, _))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BsonField;

    #[test]
    fn map_up_rewrites_every_field_leaf() {
        let expr = Expr::Call(
            "add".to_string(),
            vec![
                Expr::Field(DocVar::field(BsonField::name("a"))),
                Expr::Group(GroupOp::Sum, Box::new(Expr::Field(DocVar::field(BsonField::name("b"))))),
            ],
        );
        let rewritten = expr.map_up(&mut |_| DocVar::field(BsonField::name("renamed")));
        match rewritten {
            Expr::Call(_, args) => {
                assert_eq!(args[0], Expr::Field(DocVar::field(BsonField::name("renamed"))));
                assert!(args[1].is_group_op());
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn map_up_preserves_group_op_shape() {
        let expr = Expr::Group(GroupOp::Max, Box::new(Expr::Field(DocVar::Root)));
        assert!(expr.is_group_op());
        let rewritten = expr.map_up(&mut |_| DocVar::Root);
        assert!(rewritten.is_group_op());
    }
}
