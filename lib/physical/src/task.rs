use dbflow_logical::{GeoNearSpec, SortDir, SortKey};
use dbflow_model::{Bson, DocVar, Document, Expr, Grouped, IdHandling, JsFn, Reshape, Selector};

/// A pipeline stage, with its child stripped out — the crushed counterpart
/// of [`dbflow_logical::Rhs`], restricted to the stages that can actually
/// appear in a `PipelineTask` (the JS operators never do).
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOp {
    Match(Selector),
    Limit(i64),
    Skip(i64),
    Sort(Vec<SortKey>),
    Out(String),
    Project(Reshape, IdHandling),
    Redact(Expr),
    Unwind(DocVar),
    Group(Grouped, Vec<DocVar>),
    GeoNear(GeoNearSpec),
}

impl PipelineOp {
    /// Renders the stage as a single-key aggregation-pipeline document, the
    /// way MongoDB's own pipeline stages are shaped (`{$match: ...}`,
    /// `{$project: ...}`, ...). A diagnostic renderer, not a driver-facing
    /// wire encoder — the compiler core never serializes to wire format;
    /// it exists so a `Project`'s `_id` discipline is visible somewhere
    /// concrete rather than only living in the `IdHandling` enum.
    pub fn to_bson(&self) -> Document {
        let mut doc = Document::new();
        match self {
            PipelineOp::Match(sel) => {
                doc.insert("$match", Bson::Document(sel.to_bson()));
            }
            PipelineOp::Limit(n) => {
                doc.insert("$limit", Bson::Int64(*n));
            }
            PipelineOp::Skip(n) => {
                doc.insert("$skip", Bson::Int64(*n));
            }
            PipelineOp::Sort(keys) => {
                let mut spec = Document::new();
                for (field, dir) in keys {
                    let dir = if *dir == SortDir::Asc { 1 } else { -1 };
                    spec.insert(field.to_dotted(), Bson::Int32(dir));
                }
                doc.insert("$sort", Bson::Document(spec));
            }
            PipelineOp::Out(coll) => {
                doc.insert("$out", Bson::String(coll.clone()));
            }
            PipelineOp::Project(shape, id) => {
                doc.insert("$project", Bson::Document(shape.to_bson_with_id(*id)));
            }
            PipelineOp::Redact(_) => {
                doc.insert("$redact", Bson::String("<expr>".to_string()));
            }
            PipelineOp::Unwind(field) => {
                doc.insert("$unwind", Bson::String(field.to_string()));
            }
            PipelineOp::Group(_, by) => {
                let mut spec = Document::new();
                spec.insert("_id", Bson::String(by.iter().map(DocVar::to_string).collect::<Vec<_>>().join(",")));
                doc.insert("$group", Bson::Document(spec));
            }
            PipelineOp::GeoNear(spec) => {
                doc.insert("$geoNear", Bson::Document(geo_near_bson(spec)));
            }
        }
        doc
    }
}

fn geo_near_bson(spec: &GeoNearSpec) -> Document {
    let mut doc = Document::new();
    doc.insert("near", spec.near.clone());
    doc.insert("distanceField", spec.distance_field.to_dotted());
    doc.insert("spherical", spec.spherical);
    doc
}

/// The `out` action recorded on a `MapReduceSpec`: unset except on
/// `FoldLeft` tail arms, which always run `WithAction(Reduce)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutAction {
    Reduce,
}

/// Everything a single `mapReduce` invocation needs.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MapReduceSpec {
    pub map: Option<JsFn>,
    pub reduce: Option<JsFn>,
    pub selection: Option<Selector>,
    pub input_sort: Option<Vec<SortKey>>,
    pub limit: Option<i64>,
    pub finalizer: Option<JsFn>,
    pub scope: Option<Document>,
    pub out: Option<OutAction>,
}

impl MapReduceSpec {
    /// The identity map/NOP-reduce spec the crusher starts a new
    /// `MapReduceTask` from before filling in finalizer/reduce.
    pub fn identity(map: JsFn) -> Self {
        Self {
            map: Some(map),
            reduce: Some(nop_reduce()),
            ..Default::default()
        }
    }
}

/// A no-op reduce function: `function(key, values) { return values[0]; }`.
/// Used as the placeholder reduce a `Match`-only `MapReduceTask` carries,
/// and as the initial reduce of any `MapReduceTask` the crusher opens
/// before a `Reduce` operator supplies a real one.
pub fn nop_reduce() -> JsFn {
    JsFn::new(["key", "values"], "values[0]")
}

/// The executable task tree a [`Workflow`] is crushed into.
#[derive(Clone, Debug, PartialEq)]
pub enum Task {
    Pure(Bson),
    Read(String),
    Pipeline(Box<Task>, Vec<PipelineOp>),
    MapReduce(Box<Task>, MapReduceSpec),
    FoldLeft(Box<Task>, Vec<Task>),
    Join(Vec<Task>),
}

impl Task {
    /// `true` for the variant the `FoldLeft` tail requires every arm to be.
    pub fn is_map_reduce(&self) -> bool {
        matches!(self, Task::MapReduce(_, _))
    }
}

/// `crush`'s result type: the rebased root alongside the task it produces.
pub type Crushed = (DocVar, Task);

impl std::fmt::Display for Task {
    /// A one-line-per-node, indented tree rendering, mirroring
    /// [`dbflow_logical::Workflow`]'s `Display` impl — an `EXPLAIN`-style
    /// view, not a serialization format.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Task {
    fn write_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Task::Pure(v) => writeln!(f, "{pad}Pure({v})"),
            Task::Read(c) => writeln!(f, "{pad}Read({c})"),
            Task::Pipeline(upstream, ops) => {
                writeln!(f, "{pad}Pipeline(ops={})", ops.len())?;
                upstream.write_indented(f, depth + 1)
            }
            Task::MapReduce(upstream, spec) => {
                writeln!(f, "{pad}MapReduce(out={:?})", spec.out)?;
                upstream.write_indented(f, depth + 1)
            }
            Task::FoldLeft(head, tail) => {
                writeln!(f, "{pad}FoldLeft(tail={})", tail.len())?;
                head.write_indented(f, depth + 1)?;
                for arm in tail {
                    arm.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
            Task::Join(arms) => {
                writeln!(f, "{pad}Join(arms={})", arms.len())?;
                for arm in arms {
                    arm.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbflow_model::{BsonField, Expr, ReshapeNode};

    #[test]
    fn exclude_id_project_always_renders_id_false() {
        let mut shape = Reshape::new();
        shape.set(BsonField::name("x"), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
        let op = PipelineOp::Project(shape, IdHandling::ExcludeId);

        let doc = op.to_bson();
        let project = doc.get_document("$project").unwrap();
        assert_eq!(project.get_bool("_id").unwrap(), false);
    }

    #[test]
    fn include_id_project_does_not_add_an_id_key() {
        let shape = Reshape::new();
        let op = PipelineOp::Project(shape, IdHandling::IncludeId);

        let doc = op.to_bson();
        let project = doc.get_document("$project").unwrap();
        assert!(!project.contains_key("_id"));
    }

    #[test]
    fn limit_renders_as_a_single_key_stage() {
        let doc = PipelineOp::Limit(5).to_bson();
        assert_eq!(doc.get_i64("$limit").unwrap(), 5);
    }
}
