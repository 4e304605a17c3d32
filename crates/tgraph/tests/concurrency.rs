use std::thread;

use tgraph::graph::{BuildContext, Graph};
use tgraph::ops;
use tgraph::types::{ElementType, Shape};
use tgraph::GraphError;

fn build_branch(context: BuildContext, width: usize) -> Graph {
    let mut graph = Graph::with_context(context);
    let a = ops::parameter(&mut graph, ElementType::F32, Shape::new([width])).expect("a");
    let b = ops::parameter(&mut graph, ElementType::F32, Shape::new([width])).expect("b");
    let sum = ops::add(&mut graph, a, b).expect("add");
    let negated = ops::negative(&mut graph, sum).expect("negative");
    ops::result(&mut graph, negated).expect("result");
    graph
}

#[test]
fn graphs_built_on_threads_from_one_context_merge() {
    let context = BuildContext::new();
    let handles = (1..=4)
        .map(|width| {
            let context = context.clone();
            thread::spawn(move || build_branch(context, width))
        })
        .collect::<Vec<_>>();
    let branches = handles
        .into_iter()
        .map(|handle| handle.join().expect("builder thread"))
        .collect::<Vec<_>>();

    let mut merged = Graph::with_context(context.clone());
    for branch in branches {
        let expected = branch.len();
        let mapping = merged.absorb(branch).expect("absorb");
        assert_eq!(mapping.len(), expected);
    }

    assert_eq!(merged.len(), 20);
    assert_eq!(merged.parameters().len(), 8);
    assert_eq!(merged.results().len(), 4);
    merged.verify_edges().expect("consistent after merge");
    merged.revalidate_all().expect("types still hold");

    let mut instances = merged
        .nodes()
        .map(|node| node.instance_id())
        .collect::<Vec<_>>();
    let total = instances.len();
    instances.dedup();
    assert_eq!(instances.len(), total, "instance ids are unique and ordered");
}

#[test]
fn absorbed_handles_are_remapped() {
    let context = BuildContext::new();
    let mut first = build_branch(context.clone(), 2);
    let second = build_branch(context.clone(), 3);
    let second_results = second.results();

    let mapping = first.absorb(second).expect("absorb");
    let result = mapping[&second_results[0]];
    let node = first.node(result);
    assert!(node.is_output());
    assert_eq!(node.instance_id(), second_results[0].instance());
    assert_eq!(node.shape().expect("shape"), Shape::new([3]));
}

#[test]
fn absorbing_across_contexts_is_rejected() {
    let mut first = build_branch(BuildContext::new(), 2);
    let second = build_branch(BuildContext::new(), 2);
    let err = first.absorb(second).expect_err("separate contexts");
    assert_eq!(err, GraphError::ContextMismatch);
}

#[test]
fn absorbing_a_clone_is_rejected() {
    let mut first = build_branch(BuildContext::new(), 2);
    let copy = first.clone();
    let err = first.absorb(copy).expect_err("same instances twice");
    assert!(matches!(err, GraphError::DuplicateInstance { .. }));
}
