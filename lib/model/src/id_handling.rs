/// The `_id`-field discipline attached to a `Project`.
///
/// Forms a semiring whose two operations are used by the coalescer: the
/// merge-composed schema combine used when two `Project`s land on the same
/// node, and the upstream-adjusted chain used when one `Project` feeds
/// another. `IgnoreId` is the unit of both operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IdHandling {
    /// `_id` must be present in the output.
    IncludeId,
    /// `_id` must be absent from the output (serialized as `_id: false`
    /// regardless of the reshape contents).
    ExcludeId,
    /// No explicit opinion; defers to whatever the surrounding context does.
    #[default]
    IgnoreId,
}

impl IdHandling {
    /// `combine(a, b)`: used when two `Project`s compose at the same node.
    /// `IncludeId` dominates; otherwise `ExcludeId` wins if either side is
    /// `ExcludeId`; otherwise `IgnoreId`. Commutative, with `IgnoreId` as
    /// the identity.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        use IdHandling::{ExcludeId, IgnoreId, IncludeId};
        match (self, other) {
            (IncludeId, _) | (_, IncludeId) => IncludeId,
            (ExcludeId, _) | (_, ExcludeId) => ExcludeId,
            (IgnoreId, IgnoreId) => IgnoreId,
        }
    }

    /// `chain(a, b)`: used when one `Project` is fed into another. A
    /// right-hand `IgnoreId` is neutral (keeps `a`); otherwise `b` wins.
    /// Not commutative; `IgnoreId` is a right identity only.
    #[must_use]
    pub fn chain(self, other: Self) -> Self {
        match other {
            IdHandling::IgnoreId => self,
            other => other,
        }
    }
}


#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::IdHandling;

    fn any_id_handling() -> impl Strategy<Value = IdHandling> {
        prop_oneof![
            Just(IdHandling::IncludeId),
            Just(IdHandling::ExcludeId),
            Just(IdHandling::IgnoreId),
        ]
    }

    proptest! {
        /// `combine` is commutative: the two `Project`s that land on one
        /// node can be discovered in either order.
        #[test]
        fn combine_is_commutative(a in any_id_handling(), b in any_id_handling()) {
            prop_assert_eq!(a.combine(b), b.combine(a));
        }

        /// `combine` is associative, so folding a chain of same-node
        /// `Project`s doesn't depend on how they're grouped.
        #[test]
        fn combine_is_associative(a in any_id_handling(), b in any_id_handling(), c in any_id_handling()) {
            prop_assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
        }

        /// `IgnoreId` is the identity of `combine`.
        #[test]
        fn combine_ignore_id_is_identity(a in any_id_handling()) {
            prop_assert_eq!(a.combine(IdHandling::IgnoreId), a);
            prop_assert_eq!(IdHandling::IgnoreId.combine(a), a);
        }

        /// `IgnoreId` is a right identity of `chain`, never a left one:
        /// `chain` models Project-feeds-Project order, so it is
        /// deliberately not commutative.
        #[test]
        fn chain_ignore_id_is_a_right_identity(a in any_id_handling()) {
            prop_assert_eq!(a.chain(IdHandling::IgnoreId), a);
        }

        /// `chain` is associative: `(a.chain(b)).chain(c) == a.chain(b.chain(c))`.
        #[test]
        fn chain_is_associative(a in any_id_handling(), b in any_id_handling(), c in any_id_handling()) {
            prop_assert_eq!(a.chain(b).chain(c), a.chain(b.chain(c)));
        }
    }
}
