use dbflow_logical::{limit, match_, read, skip, Node, Workflow};
use dbflow_model::{Bson, BsonField, Selector};

#[test]
fn read_match_match_fuses_into_one_match() {
    let a = Selector::Doc(BsonField::name("a"), Bson::Int32(1));
    let b = Selector::Doc(BsonField::name("b"), Bson::Int32(2));
    let wf = match_(b.clone(), match_(a.clone(), read("c")));

    let expected = Workflow::new(Node::Match(read("c"), Selector::And(vec![a, b])));
    assert_eq!(wf, expected);
}

#[test]
fn limit_then_limit_keeps_the_smaller_bound() {
    let wf = limit(3, limit(10, read("c")));
    assert_eq!(wf, limit(3, read("c")));
}

#[test]
fn limit_then_skip_commutes_to_a_skip_over_a_limit() {
    let wf = limit(10, skip(3, read("c")));
    match wf.node() {
        Node::Skip(inner, skip_n) => {
            assert_eq!(*skip_n, 3);
            assert_eq!(inner.node(), &Node::Limit(read("c"), 13));
        }
        other => panic!("unexpected shape: {other:?}"),
    }
}
