use dbflow_logical::{limit, match_, project, read};
use dbflow_model::{Bson, BsonField, DocVar, Expr, IdHandling, JsFn, Reshape, ReshapeNode, Selector};
use dbflow_physical::{crush, delete_unused_fields, finalize, finish, PipelineOp, Task};

fn compile(wf: &dbflow_logical::Workflow) -> Task {
    let finished = finish(wf);
    let finalized = finalize(&finished).expect("well-typed workflow");
    let (_base, task) = crush(&finalized).expect("well-typed workflow");
    task
}

#[test]
fn match_then_limit_crushes_to_a_single_pipeline() {
    let sel = Selector::Doc(BsonField::name("active"), Bson::Boolean(true));
    let wf = limit(10, match_(sel.clone(), read("users")));

    match compile(&wf) {
        Task::Pipeline(upstream, ops) => {
            assert_eq!(*upstream, Task::Read("users".into()));
            assert_eq!(ops, vec![PipelineOp::Match(sel), PipelineOp::Limit(10)]);
        }
        other => panic!("expected Pipeline, got {other:?}"),
    }
}

#[test]
fn where_clause_match_crushes_to_a_map_reduce() {
    let wf = match_(Selector::Where(JsFn::new(["d"], "d.active")), read("users"));
    assert!(matches!(compile(&wf), Task::MapReduce(_, _)));
}

#[test]
fn unused_project_fields_are_pruned_before_crushing() {
    let shape = Reshape::from_entries(vec![
        (BsonField::name("kept"), ReshapeNode::Leaf(Expr::Field(DocVar::Field(BsonField::name("kept"))))),
        (BsonField::name("dropped"), ReshapeNode::Leaf(Expr::Field(DocVar::Field(BsonField::name("dropped"))))),
    ]);
    let wf = project(shape, IdHandling::ExcludeId, read("users"));

    let pruned = delete_unused_fields(&wf, &[DocVar::Field(BsonField::name("kept"))]);
    match pruned.node() {
        dbflow_logical::Node::Project(_, reshape, _) => {
            let fields: Vec<_> = reshape.entries().iter().map(|(f, _)| f.clone()).collect();
            assert_eq!(fields, vec![BsonField::name("kept")]);
        }
        other => panic!("expected Project, got {other:?}"),
    }
}
