use crate::BsonField;
use std::fmt;

/// A path into the *current* document, relative to its root.
///
/// The merger propagates pairs of `DocVar`s meaning "data
/// that used to live at the root of an operand now lives at this path under
/// the merged root". [`DocVar::compose`] implements the `\\` path
/// concatenation used pervasively by that algorithm.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocVar {
    /// The document root itself.
    Root,
    /// A field path relative to the root.
    Field(BsonField),
}

impl DocVar {
    /// Builds a `DocVar` pointing at a single top-level field.
    pub fn field(path: BsonField) -> Self {
        Self::Field(path)
    }

    /// `true` for [`DocVar::Root`].
    pub fn is_root(&self) -> bool {
        matches!(self, DocVar::Root)
    }

    /// The underlying [`BsonField`], if this is not the root.
    pub fn as_field(&self) -> Option<&BsonField> {
        match self {
            DocVar::Root => None,
            DocVar::Field(f) => Some(f),
        }
    }

    /// `self \\ other`: composes two `DocVar`s, reading `other` as relative
    /// to `self`. `Root` is the identity on both sides.
    pub fn compose(&self, other: &DocVar) -> DocVar {
        match (self, other) {
            (DocVar::Root, _) => other.clone(),
            (_, DocVar::Root) => self.clone(),
            (DocVar::Field(a), DocVar::Field(b)) => DocVar::Field(a.append(b)),
        }
    }
}

impl fmt::Display for DocVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocVar::Root => write!(f, "ROOT"),
            DocVar::Field(path) => write!(f, "ROOT.{path}"),
        }
    }
}
