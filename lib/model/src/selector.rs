use crate::{Bson, BsonField, DocVar, Document, JsFn};

/// The query-matcher sublanguage: a boolean combination of
/// field-level predicates and an opaque JS `$where` clause.
///
/// `Selector` is deliberately shallow — it models enough structure for the
/// coalescer and the finalizer to reason about (conjunction, field
/// rewriting, pipeline-eligibility), without reproducing the full query
/// operator language.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// A single field-level predicate, rendered verbatim as its RHS.
    Doc(BsonField, Bson),
    /// Conjunction of selectors.
    And(Vec<Selector>),
    /// Disjunction of selectors.
    Or(Vec<Selector>),
    /// An opaque `$where` predicate. Never pipeline-eligible.
    Where(JsFn),
}

impl Selector {
    /// Conjoins `self` with `other`, flattening nested `And`s so repeated
    /// `and` calls don't build up spurious nesting.
    #[must_use]
    pub fn and(self, other: Selector) -> Selector {
        let mut clauses = match self {
            Selector::And(clauses) => clauses,
            other => vec![other],
        };
        match other {
            Selector::And(more) => clauses.extend(more),
            other => clauses.push(other),
        }
        match clauses.len() {
            1 => clauses.into_iter().next().expect("len checked"),
            _ => Selector::And(clauses),
        }
    }

    /// Applies `f` to every [`DocVar`] referenced by a field-level
    /// predicate, leaving `$where` clauses untouched (they are opaque JS).
    #[must_use]
    pub fn map_up_fields(&self, f: &mut impl FnMut(&DocVar) -> DocVar) -> Selector {
        match self {
            Selector::Doc(field, value) => {
                let var = f(&DocVar::field(field.clone()));
                Selector::Doc(var.as_field().cloned().unwrap_or_else(|| field.clone()), value.clone())
            }
            Selector::And(clauses) => Selector::And(clauses.iter().map(|c| c.map_up_fields(f)).collect()),
            Selector::Or(clauses) => Selector::Or(clauses.iter().map(|c| c.map_up_fields(f)).collect()),
            Selector::Where(js) => Selector::Where(js.clone()),
        }
    }

    /// `true` if any clause in the selector (including nested ones) is an
    /// opaque `$where` predicate.
    pub fn has_where_clause(&self) -> bool {
        match self {
            Selector::Doc(_, _) => false,
            Selector::And(clauses) | Selector::Or(clauses) => clauses.iter().any(Selector::has_where_clause),
            Selector::Where(_) => true,
        }
    }

    /// `true` if the selector can run as a `$match` pipeline stage, i.e. it
    /// carries no `$where` clause anywhere: `$where` cannot follow a
    /// `Unwind` or sit ahead of a JS op in a pipeline task.
    pub fn is_pipelineable(&self) -> bool {
        !self.has_where_clause()
    }

    /// Renders the selector as the BSON document MongoDB's `$match`/`find`
    /// accepts.
    pub fn to_bson(&self) -> Document {
        match self {
            Selector::Doc(field, value) => {
                let mut doc = Document::new();
                doc.insert(field.to_dotted(), value.clone());
                doc
            }
            Selector::And(clauses) => {
                let mut doc = Document::new();
                doc.insert("$and", Bson::Array(clauses.iter().map(|c| Bson::Document(c.to_bson())).collect()));
                doc
            }
            Selector::Or(clauses) => {
                let mut doc = Document::new();
                doc.insert("$or", Bson::Array(clauses.iter().map(|c| Bson::Document(c.to_bson())).collect()));
                doc
            }
            Selector::Where(js) => {
                let mut doc = Document::new();
                doc.insert("$where", Bson::String(js.render()));
                doc
            }
        }
    }

    /// Renders the selector as a JS boolean expression over `ident`, for use
    /// inside a `$where` clause or a map/reduce guard.
    pub fn render(&self, ident: &str) -> String {
        match self {
            Selector::Doc(field, value) => format!("{}.{} === {}", ident, field.to_dotted(), render_bson(value)),
            Selector::And(clauses) => join_clauses(clauses, ident, "&&"),
            Selector::Or(clauses) => join_clauses(clauses, ident, "||"),
            Selector::Where(js) => js.call(&[ident]),
        }
    }
}

fn join_clauses(clauses: &[Selector], ident: &str, op: &str) -> String {
    if clauses.is_empty() {
        return "true".to_string();
    }
    clauses
        .iter()
        .map(|c| format!("({})", c.render(ident)))
        .collect::<Vec<_>>()
        .join(&format!(" {op} "))
}

fn render_bson(value: &Bson) -> String {
    match value {
        Bson::String(s) => format!("{s:?}"),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(d) => d.to_string(),
        Bson::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}
