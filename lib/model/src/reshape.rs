use crate::{BsonField, DocVar, Document, Expr, IdHandling, JsFn};

/// A single entry in a [`Reshape`]: either a computed leaf, or a nested
/// sub-document built from another `Reshape`.
#[derive(Clone, Debug, PartialEq)]
pub enum ReshapeNode {
    Leaf(Expr),
    Nested(Reshape),
}

/// The projection/reshape sublanguage: an ordered mapping
/// from field names to either a computed value or a nested reshape.
///
/// Order is preserved because it is observable in the serialized document
/// (`bson()`) and in the generated JS object literal (`to_js()`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reshape(Vec<(BsonField, ReshapeNode)>);

impl Reshape {
    /// An empty reshape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a reshape from top-level entries, in the given order.
    pub fn from_entries(entries: Vec<(BsonField, ReshapeNode)>) -> Self {
        Self(entries)
    }

    /// The top-level entries, in order.
    pub fn entries(&self) -> &[(BsonField, ReshapeNode)] {
        &self.0
    }

    /// Looks up `field`, descending through nested reshapes for a
    /// multi-segment path.
    pub fn get(&self, field: &BsonField) -> Option<&ReshapeNode> {
        let (head, rest) = split_first(field);
        let head_field = BsonField::name(head);
        let node = &self.0.iter().find(|(f, _)| *f == head_field)?.1;
        match rest {
            None => Some(node),
            Some(rest) => match node {
                ReshapeNode::Nested(inner) => inner.get(&rest),
                ReshapeNode::Leaf(_) => None,
            },
        }
    }

    /// Sets `field` to `node`, creating intermediate nested reshapes for a
    /// multi-segment path. Replaces any existing entry at the same path.
    pub fn set(&mut self, field: BsonField, node: ReshapeNode) {
        let (head, rest) = split_first(&field);
        let head_field = BsonField::name(head.clone());
        match rest {
            None => {
                if let Some(slot) = self.0.iter_mut().find(|(f, _)| *f == head_field) {
                    slot.1 = node;
                } else {
                    self.0.push((head_field, node));
                }
            }
            Some(rest) => {
                if let Some((_, ReshapeNode::Nested(inner))) =
                    self.0.iter_mut().find(|(f, _)| *f == head_field)
                {
                    inner.set(rest, node);
                } else {
                    let mut inner = Reshape::new();
                    inner.set(rest, node);
                    self.0.retain(|(f, _)| *f != head_field);
                    self.0.push((head_field, ReshapeNode::Nested(inner)));
                }
            }
        }
    }

    /// All leaf paths and their expressions, flattened from any nesting.
    pub fn get_all(&self) -> Vec<(BsonField, &Expr)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(BsonField, &'a Expr)>) {
        for (field, node) in &self.0 {
            prefix.extend(field.parts().iter().cloned());
            match node {
                ReshapeNode::Leaf(expr) => {
                    out.push((BsonField::from_parts(prefix.clone()).expect("non-empty"), expr));
                }
                ReshapeNode::Nested(inner) => inner.collect_leaves(prefix, out),
            }
            for _ in field.parts() {
                prefix.pop();
            }
        }
    }

    /// Replaces all top-level entries.
    pub fn set_all(&mut self, entries: Vec<(BsonField, ReshapeNode)>) {
        self.0 = entries;
    }

    /// Shape-compatible merge of two reshapes: entries unique to either side
    /// are kept as-is; entries present on both sides must either be equal
    /// leaves or mergeable nested reshapes, or the merge fails.
    pub fn merge(&self, other: &Reshape) -> Option<Reshape> {
        let mut merged = self.0.clone();
        for (field, other_node) in &other.0 {
            match merged.iter_mut().find(|(f, _)| f == field) {
                None => merged.push((field.clone(), other_node.clone())),
                Some((_, existing)) => {
                    *existing = merge_nodes(existing, other_node)?;
                }
            }
        }
        Some(Reshape(merged))
    }

    /// Applies `f` to every [`DocVar`] leaf referenced by the reshape's
    /// expressions.
    #[must_use]
    pub fn map_up_fields(&self, f: &mut impl FnMut(&DocVar) -> DocVar) -> Reshape {
        Reshape(
            self.0
                .iter()
                .map(|(field, node)| (field.clone(), node.map_up_fields(f)))
                .collect(),
        )
    }

    /// Serializes the reshape to a BSON document, evaluating each leaf to
    /// its own literal when it is itself a literal, and falling back to a
    /// placeholder expression document otherwise.
    pub fn to_bson(&self) -> Document {
        let mut doc = Document::new();
        for (field, node) in &self.0 {
            doc.insert(field.to_dotted(), node.to_bson());
        }
        doc
    }

    /// Serializes a `$project` stage's reshape the way `to_bson` does, plus
    /// the `_id` discipline a `Project` node carries alongside its reshape:
    /// an `ExcludeId` project always emits `_id: false`, regardless of what
    /// the reshape itself contains or omits for `_id`.
    pub fn to_bson_with_id(&self, id: IdHandling) -> Document {
        let mut doc = self.to_bson();
        if id == IdHandling::ExcludeId {
            doc.insert("_id", crate::Bson::Boolean(false));
        }
        doc
    }

    /// Returns a JS function `ident => { ... }` performing the same
    /// projection, if every leaf expression has a structural translation
    /// (a field getter chain). Returns `None` otherwise.
    pub fn to_js(&self, ident: &str) -> Option<JsFn> {
        let mut parts = Vec::new();
        for (field, node) in &self.0 {
            parts.push(format!("{}: {}", field.to_dotted(), node.to_js_expr(ident)?));
        }
        Some(JsFn::new([ident], format!("{{ {} }}", parts.join(", "))))
    }
}

impl ReshapeNode {
    fn map_up_fields(&self, f: &mut impl FnMut(&DocVar) -> DocVar) -> ReshapeNode {
        match self {
            ReshapeNode::Leaf(expr) => ReshapeNode::Leaf(expr.map_up(f)),
            ReshapeNode::Nested(inner) => ReshapeNode::Nested(inner.map_up_fields(f)),
        }
    }

    fn to_bson(&self) -> crate::Bson {
        match self {
            ReshapeNode::Leaf(Expr::Literal(v)) => v.clone(),
            ReshapeNode::Leaf(_) => crate::Bson::String("<expr>".to_string()),
            ReshapeNode::Nested(inner) => crate::Bson::Document(inner.to_bson()),
        }
    }

    fn to_js_expr(&self, ident: &str) -> Option<String> {
        match self {
            ReshapeNode::Leaf(Expr::Field(DocVar::Root)) => Some(ident.to_string()),
            ReshapeNode::Leaf(Expr::Field(DocVar::Field(path))) => {
                Some(format!("{}.{}", ident, path.to_dotted()))
            }
            ReshapeNode::Leaf(Expr::Literal(_) | Expr::Call(_, _) | Expr::Group(_, _)) => None,
            ReshapeNode::Nested(inner) => inner.to_js(ident).map(|f| f.render()),
        }
    }
}

fn merge_nodes(a: &ReshapeNode, b: &ReshapeNode) -> Option<ReshapeNode> {
    match (a, b) {
        (ReshapeNode::Leaf(x), ReshapeNode::Leaf(y)) if x == y => Some(ReshapeNode::Leaf(x.clone())),
        (ReshapeNode::Leaf(_), ReshapeNode::Leaf(_)) => None,
        (ReshapeNode::Nested(x), ReshapeNode::Nested(y)) => x.merge(y).map(ReshapeNode::Nested),
        _ => None,
    }
}

fn split_first(field: &BsonField) -> (String, Option<BsonField>) {
    let parts = field.parts();
    let head = parts[0].clone();
    let rest = BsonField::from_parts(parts[1..].iter().cloned());
    (head, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocVar;

    #[test]
    fn set_and_get_roundtrip_nested_path() {
        let mut reshape = Reshape::new();
        let path = BsonField::from_parts(["a".to_string(), "b".to_string()]).unwrap();
        reshape.set(path.clone(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
        assert_eq!(
            reshape.get(&path),
            Some(&ReshapeNode::Leaf(Expr::Field(DocVar::Root)))
        );
    }

    #[test]
    fn merge_fails_on_conflicting_leaves() {
        let mut a = Reshape::new();
        a.set(BsonField::name("x"), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
        let mut b = Reshape::new();
        b.set(
            BsonField::name("x"),
            ReshapeNode::Leaf(Expr::Field(DocVar::field(BsonField::name("y")))),
        );
        assert!(a.merge(&b).is_none());
    }

    #[test]
    fn merge_keeps_non_overlapping_entries_from_both_sides() {
        let mut a = Reshape::new();
        a.set(BsonField::name("x"), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
        let mut b = Reshape::new();
        b.set(BsonField::name("y"), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));

        let merged = a.merge(&b).unwrap();
        assert!(merged.get(&BsonField::name("x")).is_some());
        assert!(merged.get(&BsonField::name("y")).is_some());
    }

    #[test]
    fn to_js_is_none_when_a_leaf_has_no_js_translation() {
        let mut reshape = Reshape::new();
        reshape.set(
            BsonField::name("x"),
            ReshapeNode::Leaf(Expr::Call("sum".to_string(), vec![])),
        );
        assert!(reshape.to_js("doc").is_none());
    }

    #[test]
    fn to_js_translates_field_projections() {
        let mut reshape = Reshape::new();
        reshape.set(
            BsonField::name("x"),
            ReshapeNode::Leaf(Expr::Field(DocVar::field(BsonField::name("a")))),
        );
        let js = reshape.to_js("doc").unwrap();
        assert!(js.render().contains("x: doc.a"));
    }

    #[test]
    fn to_bson_with_id_adds_id_false_only_for_exclude_id() {
        let mut reshape = Reshape::new();
        reshape.set(BsonField::name("x"), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));

        let excluded = reshape.to_bson_with_id(IdHandling::ExcludeId);
        assert_eq!(excluded.get_bool("_id").unwrap(), false);

        let ignored = reshape.to_bson_with_id(IdHandling::IgnoreId);
        assert!(!ignored.contains_key("_id"));
    }
}
