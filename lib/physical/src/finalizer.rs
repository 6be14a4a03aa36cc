use dbflow_common::WorkflowResult;
use dbflow_logical::{Node, Workflow};
use dbflow_model::{Conventions, DocVar, Expr, IdHandling, JsFn, Reshape, ReshapeNode};

/// Bottom-up normalization pass: after `finalize`, every JS
/// operator (`Map`/`FlatMap`/`Reduce`) is fed directly by another JS
/// operator, a `Read`/`Pure`, or a `FoldLeft` — never by a `Project` or
/// `Unwind` — and every `FoldLeft` tail arm has been wrapped into a
/// `Reduce`.
pub fn finalize(wf: &Workflow) -> WorkflowResult<Workflow> {
    let rebuilt = wf.node().try_map_children(finalize)?;
    let normalized = finalize_node(rebuilt)?;
    Ok(Workflow::new(normalized))
}

fn finalize_node(node: Node) -> WorkflowResult<Node> {
    let normalized = match node {
        Node::Map(src, f) => finalize_js_op(src, f, JsOpKind::Map),
        Node::FlatMap(src, f) => finalize_js_op(src, f, JsOpKind::FlatMap),
        Node::Reduce(src, f) => finalize_js_op(src, f, JsOpKind::Reduce),
        Node::FoldLeft(head, tail) => finalize_fold_left(head, tail),
        other => other,
    };
    Ok(normalized)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum JsOpKind {
    Map,
    FlatMap,
    Reduce,
}

impl JsOpKind {
    fn build(self, src: Workflow, f: JsFn) -> Node {
        match self {
            JsOpKind::Map => Node::Map(src, f),
            JsOpKind::FlatMap => Node::FlatMap(src, f),
            JsOpKind::Reduce => Node::Reduce(src, f),
        }
    }
}

/// `Map(Project(...), fn)` / `FlatMap(Project(...), fn)` / `Reduce(Project(...), fn)`
/// and the analogous `Unwind` cases.
fn finalize_js_op(src: Workflow, f: JsFn, kind: JsOpKind) -> Node {
    match src.node() {
        Node::Project(inner, shape, _) => match shape.to_js(Conventions::EXPR_VAR) {
            Some(reshape_js) => {
                let replaced = Workflow::new(Node::Map(inner.clone(), map_map(Conventions::EXPR_VAR, &reshape_js)));
                kind.build(replaced, f)
            }
            // No structural JS translation: leave the Project in place.
            // The crusher still has to cope with it (it wraps a fresh
            // MapReduceTask rather than absorbing one).
            None => kind.build(src, f),
        },
        Node::Unwind(inner, field) => {
            let replaced = Workflow::new(Node::FlatMap(inner.clone(), unwind_flatmap_js(field)));
            kind.build(replaced, f)
        }
        _ => kind.build(src, f),
    }
}

/// `FoldLeft(head, tail)` normalization: the head is wrapped so its whole
/// document lands under the `value` field (the convention every map-reduce
/// output agrees on), and every tail arm that isn't already a `Reduce` gets
/// one appended.
fn finalize_fold_left(head: Workflow, tail: Vec<Workflow>) -> Node {
    let mut head_shape = Reshape::new();
    head_shape.set(Conventions::expr_var(), ReshapeNode::Leaf(Expr::Field(DocVar::Root)));
    let new_head = Workflow::new(Node::Project(head, head_shape, IdHandling::IncludeId));

    let new_tail = tail
        .into_iter()
        .map(|arm| match arm.node() {
            Node::Reduce(_, _) => arm,
            _ => Workflow::new(Node::Reduce(arm, fold_left_reducer())),
        })
        .collect();

    Node::FoldLeft(new_head, new_tail)
}

/// `x => reshape_js(x)`, fusing a reshape's JS translation into a plain
/// unary function so it can stand in for the `Project` it replaced.
fn map_map(ident: &str, reshape_js: &JsFn) -> JsFn {
    JsFn::new([ident], reshape_js.call(&[ident]))
}

/// A JS function flattening an `Unwind`'s target array field: each element
/// becomes its own document, a shallow copy of the input with the field
/// replaced by the single element.
fn unwind_flatmap_js(field: &DocVar) -> JsFn {
    let ident = Conventions::EXPR_VAR;
    let path = match field {
        DocVar::Root => return JsFn::new([ident], format!("[{ident}]")),
        DocVar::Field(path) => path.to_dotted(),
    };
    JsFn::new(
        [ident],
        format!(
            "({ident}.{path} || []).map(function(__item) {{ \
             var __copy = Object.assign({{}}, {ident}); __copy.{path} = __item; return __copy; \
             }})"
        ),
    )
}

/// The reduce function a normalized `FoldLeft` tail arm runs when its
/// expression hadn't already terminated in a `Reduce`: folds every value
/// sharing a key into one merged document.
fn fold_left_reducer() -> JsFn {
    JsFn::new(
        ["key", "values"],
        "values.reduce(function(acc, next) { return Object.assign({}, acc, next); })",
    )
}
