use std::collections::HashSet;
use std::fmt;

/// A non-empty field path into a BSON document.
///
/// `BsonField` is the leaf path type referenced throughout the compiler: a
/// `Project`'s reshape keys into it, a `Sort`'s keys are `BsonField`s, and a
/// [`crate::DocVar`] is either the document root or one of these paths
/// relative to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BsonField(Vec<String>);

impl BsonField {
    /// Builds a single-segment field path.
    pub fn name(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Builds a field path from its segments. Returns `None` for an empty
    /// sequence, since a `BsonField` is always non-empty.
    pub fn from_parts(parts: impl IntoIterator<Item = String>) -> Option<Self> {
        let parts: Vec<String> = parts.into_iter().collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    /// The path segments, outermost first.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// The last segment of the path.
    pub fn leaf(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Path concatenation: `self` followed by `other`.
    pub fn append(&self, other: &BsonField) -> BsonField {
        let mut parts = self.0.clone();
        parts.extend(other.0.iter().cloned());
        Self(parts)
    }

    /// Renders the path as a dotted string, e.g. `"a.b.c"`.
    pub fn to_dotted(&self) -> String {
        self.0.join(".")
    }

    /// Generates a name not present in `existing`, preferring short names
    /// (`"__tmp0"`, `"__tmp1"`, ...) so field order stays predictable across
    /// calls for the same `existing` set.
    pub fn gen_uniq_name(existing: &HashSet<BsonField>) -> BsonField {
        Self::gen_uniq_names(1, existing)
            .into_iter()
            .next()
            .unwrap_or_else(|| BsonField::name("__tmp0"))
    }

    /// Generates `n` pairwise-distinct names, none present in `existing`.
    pub fn gen_uniq_names(n: usize, existing: &HashSet<BsonField>) -> Vec<BsonField> {
        let mut generated = Vec::with_capacity(n);
        let mut counter = 0usize;
        while generated.len() < n {
            let candidate = BsonField::name(format!("__tmp{counter}"));
            counter += 1;
            if !existing.contains(&candidate) && !generated.contains(&candidate) {
                generated.push(candidate);
            }
        }
        generated
    }
}

impl fmt::Display for BsonField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}
