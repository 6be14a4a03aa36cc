use crate::{BsonField, DocVar, Expr};

/// A mapping from output field leaves to group operators.
///
/// Every value is expected to be a [`Expr::Group`](crate::Expr::Group); the
/// reference rewriter relies on that invariant being preserved across a
/// rewrite.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grouped(Vec<(BsonField, Expr)>);

impl Grouped {
    /// An empty grouping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `Grouped` from field/group-op pairs, in the given order.
    pub fn from_entries(entries: Vec<(BsonField, Expr)>) -> Self {
        Self(entries)
    }

    /// The entries, in insertion order.
    pub fn entries(&self) -> &[(BsonField, Expr)] {
        &self.0
    }

    /// The group operator bound to `field`, if any.
    pub fn get(&self, field: &BsonField) -> Option<&Expr> {
        self.0.iter().find(|(f, _)| f == field).map(|(_, e)| e)
    }

    /// Map union with right bias: entries of `other` replace entries of
    /// `self` on key collision; `self`'s ordering is kept for keys it alone
    /// has, with `other`'s new keys appended after.
    #[must_use]
    pub fn union(&self, other: &Grouped) -> Grouped {
        let mut merged: Vec<(BsonField, Expr)> = Vec::with_capacity(self.0.len() + other.0.len());
        for (field, expr) in &self.0 {
            let replacement = other.get(field).cloned();
            merged.push((field.clone(), replacement.unwrap_or_else(|| expr.clone())));
        }
        for (field, expr) in &other.0 {
            if !merged.iter().any(|(f, _)| f == field) {
                merged.push((field.clone(), expr.clone()));
            }
        }
        Grouped(merged)
    }

    /// Applies `f` to every [`DocVar`] leaf referenced by the grouped
    /// expressions.
    #[must_use]
    pub fn map_up_fields(&self, f: &mut impl FnMut(&DocVar) -> DocVar) -> Grouped {
        Grouped(
            self.0
                .iter()
                .map(|(field, expr)| (field.clone(), expr.map_up(f)))
                .collect(),
        )
    }

    /// `true` if every value is a group-accumulator application, i.e. the
    /// invariant the rewriter must preserve still holds.
    pub fn is_well_formed(&self) -> bool {
        self.0.iter().all(|(_, e)| e.is_group_op())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroupOp;

    fn group_op(field: &str) -> Expr {
        Expr::Group(GroupOp::Sum, Box::new(Expr::Field(DocVar::field(BsonField::name(field)))))
    }

    #[test]
    fn union_is_right_biased_on_collision() {
        let a = Grouped::from_entries(vec![(BsonField::name("total"), group_op("x"))]);
        let b = Grouped::from_entries(vec![(BsonField::name("total"), group_op("y"))]);
        let merged = a.union(&b);
        assert_eq!(merged.get(&BsonField::name("total")), Some(&group_op("y")));
    }

    #[test]
    fn union_keeps_keys_unique_to_each_side() {
        let a = Grouped::from_entries(vec![(BsonField::name("a"), group_op("a"))]);
        let b = Grouped::from_entries(vec![(BsonField::name("b"), group_op("b"))]);
        let merged = a.union(&b);
        assert!(merged.get(&BsonField::name("a")).is_some());
        assert!(merged.get(&BsonField::name("b")).is_some());
    }
}
