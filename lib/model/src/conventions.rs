use crate::{BsonField, DocVar};

/// Naming conventions the logical and physical layers share.
///
/// These are not configurable: they are fixed points that `FoldLeft`
/// head-normalization, `Join` arm-naming, and `MapReduce` lowering all agree
/// on, so they live as associated constants rather than fields on some
/// configuration struct threaded through every call.
pub struct Conventions;

impl Conventions {
    /// The field a `FoldLeft` arm's accumulator is bound to before
    /// `finalize` folds it into the arm's expression.
    pub const EXPR_VAR: &'static str = "value";

    /// The reserved left-arm name a `Join` binds its left source under.
    pub const L_EFT: &'static str = "lEft";

    /// The reserved right-arm name a `Join` binds its right source under.
    pub const R_IGHT: &'static str = "rIght";

    /// `EXPR_VAR` as a [`BsonField`].
    pub fn expr_var() -> BsonField {
        BsonField::name(Self::EXPR_VAR)
    }

    /// `L_EFT` as a [`BsonField`].
    pub fn left_field() -> BsonField {
        BsonField::name(Self::L_EFT)
    }

    /// `R_IGHT` as a [`BsonField`].
    pub fn right_field() -> BsonField {
        BsonField::name(Self::R_IGHT)
    }

    /// `L_EFT` as a [`DocVar`], for composing directly onto a rebase path.
    pub fn left_field_var() -> DocVar {
        DocVar::field(Self::left_field())
    }

    /// `R_IGHT` as a [`DocVar`], for composing directly onto a rebase path.
    pub fn right_field_var() -> DocVar {
        DocVar::field(Self::right_field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_are_distinct() {
        assert_ne!(Conventions::left_field(), Conventions::right_field());
    }
}
