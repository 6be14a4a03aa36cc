use dbflow_model::{Bson, BsonField, DocVar, Expr, Grouped, IdHandling, JsFn, Reshape, Selector};

/// Sort direction for a [`Node::Sort`] key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// A single sort key.
pub type SortKey = (BsonField, SortDir);

/// The parameters of a `$geoNear` stage. Kept minimal: the core treats
/// `GeoNear` as an opaque pipeline stage whose only algebra is "no-op when
/// composed with another `GeoNear`".
#[derive(Clone, Debug, PartialEq)]
pub struct GeoNearSpec {
    pub near: Bson,
    pub distance_field: BsonField,
    pub spherical: bool,
}

/// A workflow tree: the fixed point of [`Node`].
///
/// Boxed recursive enum rather than an arena; the merge and crush
/// algorithms only recurse to tree depth, which stays
/// well under any stack limit for realistic inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Workflow(Box<Node>);

impl Workflow {
    pub fn new(node: Node) -> Self {
        Self(Box::new(node))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub fn into_node(self) -> Node {
        *self.0
    }

    /// The number of nodes in the tree, counting every arm of a `FoldLeft`
    /// or `Join`. Used by merge-termination instrumentation and by tests
    /// asserting a rewrite didn't blow up tree size.
    pub fn node_count(&self) -> usize {
        1 + self
            .node()
            .children()
            .iter()
            .map(|c| c.node_count())
            .sum::<usize>()
    }
}

impl std::fmt::Display for Workflow {
    /// A one-line-per-node, indented tree rendering — an `EXPLAIN`-style
    /// view for tests and embedders, not a serialization format — this
    /// crate has none.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.node().write_indented(f, 0)
    }
}

impl Node {
    fn write_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(depth), self.label())?;
        for child in self.children() {
            child.node().write_indented(f, depth + 1)?;
        }
        Ok(())
    }

    /// The node's single-line label, omitting its children.
    fn label(&self) -> String {
        match self {
            Node::Pure(v) => format!("Pure({v})"),
            Node::Read(c) => format!("Read({c})"),
            Node::Match(_, sel) => format!("Match({sel:?})"),
            Node::Limit(_, n) => format!("Limit({n})"),
            Node::Skip(_, n) => format!("Skip({n})"),
            Node::Sort(_, keys) => format!("Sort({keys:?})"),
            Node::Out(_, coll) => format!("Out({coll})"),
            Node::Project(_, shape, id) => format!("Project({shape:?}, {id:?})"),
            Node::Redact(_, e) => format!("Redact({e:?})"),
            Node::Unwind(_, field) => format!("Unwind({field})"),
            Node::Group(_, grouped, by) => format!("Group({grouped:?}, by={by:?})"),
            Node::GeoNear(_, spec) => format!("GeoNear({spec:?})"),
            Node::Map(_, fun) => format!("Map({})", fun.render()),
            Node::FlatMap(_, fun) => format!("FlatMap({})", fun.render()),
            Node::Reduce(_, fun) => format!("Reduce({})", fun.render()),
            Node::FoldLeft(_, tail) => format!("FoldLeft(tail={})", tail.len()),
            Node::Join(srcs) => format!("Join(arms={})", srcs.len()),
        }
    }
}

/// The operator model: a tagged union of workflow steps.
///
/// Every variant but `Pure`/`Read` (sources) and `Join` (a set) carries
/// exactly one child; `FoldLeft` carries a head plus a nonempty tail.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Pure(Bson),
    Read(String),
    Match(Workflow, Selector),
    Limit(Workflow, i64),
    Skip(Workflow, i64),
    Sort(Workflow, Vec<SortKey>),
    Out(Workflow, String),
    Project(Workflow, Reshape, IdHandling),
    Redact(Workflow, Expr),
    Unwind(Workflow, DocVar),
    Group(Workflow, Grouped, Vec<DocVar>),
    GeoNear(Workflow, GeoNearSpec),
    Map(Workflow, JsFn),
    FlatMap(Workflow, JsFn),
    Reduce(Workflow, JsFn),
    FoldLeft(Workflow, Vec<Workflow>),
    Join(Vec<Workflow>),
}

/// The operator-specific payload of a single-source node, with its child
/// stripped out. Produced by [`Node::rhs`].
#[derive(Clone, Debug, PartialEq)]
pub enum Rhs {
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
    Map(JsFn),
    FlatMap(JsFn),
    Reduce(JsFn),
}

/// The classification the merger and crusher consult, replacing the
/// source's `SingleSource`/`PipelineF`/`ShapePreservingF` trait hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    ShapePreserving,
    Shape,
    Js,
    FoldLeft,
    Join,
}

impl Node {
    /// The node's classification.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Pure(_) | Node::Read(_) => NodeKind::Source,
            Node::Match(_, _) | Node::Limit(_, _) | Node::Skip(_, _) | Node::Sort(_, _) | Node::Out(_, _) => {
                NodeKind::ShapePreserving
            }
            Node::Project(_, _, _)
            | Node::Redact(_, _)
            | Node::Unwind(_, _)
            | Node::Group(_, _, _)
            | Node::GeoNear(_, _) => NodeKind::Shape,
            Node::Map(_, _) | Node::FlatMap(_, _) | Node::Reduce(_, _) => NodeKind::Js,
            Node::FoldLeft(_, _) => NodeKind::FoldLeft,
            Node::Join(_) => NodeKind::Join,
        }
    }

    pub fn is_source(&self) -> bool {
        self.kind() == NodeKind::Source
    }

    /// `true` for every variant with exactly one child.
    pub fn is_single_source(&self) -> bool {
        !matches!(self.kind(), NodeKind::Source | NodeKind::FoldLeft | NodeKind::Join)
    }

    /// `true` for pipeline stages the crusher can fold into a
    /// `PipelineTask`. A `Match` additionally requires its selector to be
    /// pipelineable.
    pub fn is_pipelineable(&self) -> bool {
        match self {
            Node::Match(_, sel) => sel.is_pipelineable(),
            Node::Limit(_, _)
            | Node::Skip(_, _)
            | Node::Sort(_, _)
            | Node::Out(_, _)
            | Node::Project(_, _, _)
            | Node::Redact(_, _)
            | Node::Unwind(_, _)
            | Node::Group(_, _, _)
            | Node::GeoNear(_, _) => true,
            _ => false,
        }
    }

    /// `true` for the stages that do not alter document shape.
    pub fn is_shape_preserving(&self) -> bool {
        self.kind() == NodeKind::ShapePreserving
    }

    /// Every immediate child, in positional order (head before tail for
    /// `FoldLeft`).
    pub fn children(&self) -> Vec<&Workflow> {
        match self {
            Node::Pure(_) | Node::Read(_) => vec![],
            Node::Match(src, _)
            | Node::Limit(src, _)
            | Node::Skip(src, _)
            | Node::Sort(src, _)
            | Node::Out(src, _)
            | Node::Project(src, _, _)
            | Node::Redact(src, _)
            | Node::Unwind(src, _)
            | Node::Group(src, _, _)
            | Node::GeoNear(src, _)
            | Node::Map(src, _)
            | Node::FlatMap(src, _)
            | Node::Reduce(src, _) => vec![src],
            Node::FoldLeft(head, tail) => std::iter::once(head).chain(tail.iter()).collect(),
            Node::Join(srcs) => srcs.iter().collect(),
        }
    }

    /// The single child of a [`Node::is_single_source`] node.
    pub fn src(&self) -> Option<&Workflow> {
        match self {
            Node::Match(src, _)
            | Node::Limit(src, _)
            | Node::Skip(src, _)
            | Node::Sort(src, _)
            | Node::Out(src, _)
            | Node::Project(src, _, _)
            | Node::Redact(src, _)
            | Node::Unwind(src, _)
            | Node::Group(src, _, _)
            | Node::GeoNear(src, _)
            | Node::Map(src, _)
            | Node::FlatMap(src, _)
            | Node::Reduce(src, _) => Some(src),
            _ => None,
        }
    }

    /// Replaces the single child of a single-source node. Returns `None` for
    /// sources, `FoldLeft`, and `Join`, which do not have exactly one child.
    #[must_use]
    pub fn reparent(&self, new_child: Workflow) -> Option<Node> {
        Some(match self {
            Node::Match(_, sel) => Node::Match(new_child, sel.clone()),
            Node::Limit(_, n) => Node::Limit(new_child, *n),
            Node::Skip(_, n) => Node::Skip(new_child, *n),
            Node::Sort(_, keys) => Node::Sort(new_child, keys.clone()),
            Node::Out(_, coll) => Node::Out(new_child, coll.clone()),
            Node::Project(_, shape, id) => Node::Project(new_child, shape.clone(), *id),
            Node::Redact(_, e) => Node::Redact(new_child, e.clone()),
            Node::Unwind(_, f) => Node::Unwind(new_child, f.clone()),
            Node::Group(_, g, by) => Node::Group(new_child, g.clone(), by.clone()),
            Node::GeoNear(_, spec) => Node::GeoNear(new_child, spec.clone()),
            Node::Map(_, f) => Node::Map(new_child, f.clone()),
            Node::FlatMap(_, f) => Node::FlatMap(new_child, f.clone()),
            Node::Reduce(_, f) => Node::Reduce(new_child, f.clone()),
            Node::Pure(_) | Node::Read(_) | Node::FoldLeft(_, _) | Node::Join(_) => return None,
        })
    }

    /// The operator-specific payload, with the child stripped out. `None`
    /// for sources, `FoldLeft`, and `Join`.
    pub fn rhs(&self) -> Option<Rhs> {
        Some(match self {
            Node::Match(_, sel) => Rhs::Match(sel.clone()),
            Node::Limit(_, n) => Rhs::Limit(*n),
            Node::Skip(_, n) => Rhs::Skip(*n),
            Node::Sort(_, keys) => Rhs::Sort(keys.clone()),
            Node::Out(_, coll) => Rhs::Out(coll.clone()),
            Node::Project(_, shape, id) => Rhs::Project(shape.clone(), *id),
            Node::Redact(_, e) => Rhs::Redact(e.clone()),
            Node::Unwind(_, f) => Rhs::Unwind(f.clone()),
            Node::Group(_, g, by) => Rhs::Group(g.clone(), by.clone()),
            Node::GeoNear(_, spec) => Rhs::GeoNear(spec.clone()),
            Node::Map(_, f) => Rhs::Map(f.clone()),
            Node::FlatMap(_, f) => Rhs::FlatMap(f.clone()),
            Node::Reduce(_, f) => Rhs::Reduce(f.clone()),
            Node::Pure(_) | Node::Read(_) | Node::FoldLeft(_, _) | Node::Join(_) => return None,
        })
    }

    /// Applies `f` to every immediate child, returning a new node of the
    /// same variant (the functor's `traverse`, specialized to `Workflow ->
    /// Workflow` since the core never suspends an effect across children).
    #[must_use]
    pub fn map_children(&self, mut f: impl FnMut(&Workflow) -> Workflow) -> Node {
        match self {
            Node::Pure(v) => Node::Pure(v.clone()),
            Node::Read(c) => Node::Read(c.clone()),
            Node::Match(src, sel) => Node::Match(f(src), sel.clone()),
            Node::Limit(src, n) => Node::Limit(f(src), *n),
            Node::Skip(src, n) => Node::Skip(f(src), *n),
            Node::Sort(src, keys) => Node::Sort(f(src), keys.clone()),
            Node::Out(src, coll) => Node::Out(f(src), coll.clone()),
            Node::Project(src, shape, id) => Node::Project(f(src), shape.clone(), *id),
            Node::Redact(src, e) => Node::Redact(f(src), e.clone()),
            Node::Unwind(src, field) => Node::Unwind(f(src), field.clone()),
            Node::Group(src, g, by) => Node::Group(f(src), g.clone(), by.clone()),
            Node::GeoNear(src, spec) => Node::GeoNear(f(src), spec.clone()),
            Node::Map(src, fun) => Node::Map(f(src), fun.clone()),
            Node::FlatMap(src, fun) => Node::FlatMap(f(src), fun.clone()),
            Node::Reduce(src, fun) => Node::Reduce(f(src), fun.clone()),
            Node::FoldLeft(head, tail) => Node::FoldLeft(f(head), tail.iter().map(|t| f(t)).collect()),
            Node::Join(srcs) => Node::Join(srcs.iter().map(|s| f(s)).collect()),
        }
    }

    /// The fallible counterpart of [`Node::map_children`], used by passes
    /// that recurse over the whole tree and can fail partway through (the
    /// finalizer, the crusher) rather than fusing just one already-built
    /// layer.
    pub fn try_map_children<E>(&self, mut f: impl FnMut(&Workflow) -> Result<Workflow, E>) -> Result<Node, E> {
        Ok(match self {
            Node::Pure(v) => Node::Pure(v.clone()),
            Node::Read(c) => Node::Read(c.clone()),
            Node::Match(src, sel) => Node::Match(f(src)?, sel.clone()),
            Node::Limit(src, n) => Node::Limit(f(src)?, *n),
            Node::Skip(src, n) => Node::Skip(f(src)?, *n),
            Node::Sort(src, keys) => Node::Sort(f(src)?, keys.clone()),
            Node::Out(src, coll) => Node::Out(f(src)?, coll.clone()),
            Node::Project(src, shape, id) => Node::Project(f(src)?, shape.clone(), *id),
            Node::Redact(src, e) => Node::Redact(f(src)?, e.clone()),
            Node::Unwind(src, field) => Node::Unwind(f(src)?, field.clone()),
            Node::Group(src, g, by) => Node::Group(f(src)?, g.clone(), by.clone()),
            Node::GeoNear(src, spec) => Node::GeoNear(f(src)?, spec.clone()),
            Node::Map(src, fun) => Node::Map(f(src)?, fun.clone()),
            Node::FlatMap(src, fun) => Node::FlatMap(f(src)?, fun.clone()),
            Node::Reduce(src, fun) => Node::Reduce(f(src)?, fun.clone()),
            Node::FoldLeft(head, tail) => {
                let head = f(head)?;
                let tail = tail.iter().map(|t| f(t)).collect::<Result<Vec<_>, E>>()?;
                Node::FoldLeft(head, tail)
            }
            Node::Join(srcs) => Node::Join(srcs.iter().map(|s| f(s)).collect::<Result<Vec<_>, E>>()?),
        })
    }

    /// The multiset of [`DocVar`]s appearing directly in this node's
    /// payload (not recursing into children). A pure accumulator in place
    /// of the source's mutable-buffer `refs(op)` helper.
    pub fn refs(&self) -> Vec<DocVar> {
        let mut out = Vec::new();
        match self {
            Node::Match(_, sel) => collect_selector_refs(sel, &mut out),
            Node::Sort(_, keys) => out.extend(keys.iter().map(|(field, _)| DocVar::field(field.clone()))),
            Node::Redact(_, e) => collect_expr_refs(e, &mut out),
            Node::Unwind(_, field) => out.push(field.clone()),
            Node::Group(_, grouped, by) => {
                for (_, expr) in grouped.entries() {
                    collect_expr_refs(expr, &mut out);
                }
                out.extend(by.iter().cloned());
            }
            Node::Project(_, shape, _) => {
                for (_, expr) in shape.get_all() {
                    collect_expr_refs(expr, &mut out);
                }
            }
            _ => {}
        }
        out
    }
}

fn collect_expr_refs(expr: &Expr, out: &mut Vec<DocVar>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Field(var) => out.push(var.clone()),
        Expr::Call(_, args) => args.iter().for_each(|a| collect_expr_refs(a, out)),
        Expr::Group(_, inner) => collect_expr_refs(inner, out),
    }
}

/// Field references a selector pins in place, ignoring opaque `$where`
/// clauses (which carry no structured field references to protect).
fn collect_selector_refs(sel: &Selector, out: &mut Vec<DocVar>) {
    match sel {
        Selector::Doc(field, _) => out.push(DocVar::field(field.clone())),
        Selector::And(clauses) | Selector::Or(clauses) => {
            clauses.iter().for_each(|c| collect_selector_refs(c, out));
        }
        Selector::Where(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pipelineable_respects_where_clauses() {
        let with_where = Node::Match(Workflow::new(Node::Read("c".into())), Selector::Where(JsFn::new(["d"], "true")));
        assert!(!with_where.is_pipelineable());

        let plain = Node::Match(
            Workflow::new(Node::Read("c".into())),
            Selector::Doc(BsonField::name("x"), Bson::Int32(1)),
        );
        assert!(plain.is_pipelineable());
    }

    #[test]
    fn reparent_replaces_the_single_child() {
        let node = Node::Limit(Workflow::new(Node::Read("c".into())), 5);
        let reparented = node.reparent(Workflow::new(Node::Read("d".into()))).unwrap();
        assert_eq!(reparented, Node::Limit(Workflow::new(Node::Read("d".into())), 5));
    }

    #[test]
    fn reparent_is_none_for_sources_and_fanin() {
        assert!(Node::Pure(Bson::Null).reparent(Workflow::new(Node::Read("x".into()))).is_none());
        assert!(Node::Join(vec![]).reparent(Workflow::new(Node::Read("x".into()))).is_none());
    }

    #[test]
    fn refs_collects_match_and_sort_fields_but_not_where_clauses() {
        let matched = Node::Match(
            Workflow::new(Node::Read("c".into())),
            Selector::Doc(BsonField::name("a"), Bson::Int32(1)),
        );
        assert_eq!(matched.refs(), vec![DocVar::field(BsonField::name("a"))]);

        let opaque = Node::Match(Workflow::new(Node::Read("c".into())), Selector::Where(JsFn::new(["d"], "true")));
        assert!(opaque.refs().is_empty());

        let sorted = Node::Sort(Workflow::new(Node::Read("c".into())), vec![(BsonField::name("b"), SortDir::Asc)]);
        assert_eq!(sorted.refs(), vec![DocVar::field(BsonField::name("b"))]);
    }

    #[test]
    fn node_count_includes_every_foldleft_arm() {
        let wf = Workflow::new(Node::FoldLeft(
            Workflow::new(Node::Read("c".into())),
            vec![Workflow::new(Node::Read("d".into()))],
        ));
        assert_eq!(wf.node_count(), 3);
    }
}
