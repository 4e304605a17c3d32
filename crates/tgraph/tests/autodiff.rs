use tgraph::autodiff::{generate_node_adjoints, Adjoints};
use tgraph::graph::{Graph, Output};
use tgraph::ops;
use tgraph::types::{ElementType, Shape};
use tgraph::GraphError;

fn f32_param(graph: &mut Graph, dims: &[usize]) -> Output {
    ops::parameter(graph, ElementType::F32, Shape::from(dims)).expect("parameter")
}

#[test]
fn add_passes_the_delta_to_both_inputs() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[3]);
    let b = f32_param(&mut graph, &[3]);
    let sum = ops::add(&mut graph, a, b).expect("add");
    let seed = f32_param(&mut graph, &[3]);

    let mut adjoints = Adjoints::new();
    generate_node_adjoints(&mut graph, &mut adjoints, sum.node, &[seed]).expect("adjoints");
    assert_eq!(adjoints.get(a), Some(seed));
    assert_eq!(adjoints.get(b), Some(seed));
    assert_eq!(adjoints.len(), 2);
}

#[test]
fn repeated_contributions_are_summed() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let product = ops::multiply(&mut graph, a, a).expect("square");
    let seed = f32_param(&mut graph, &[2]);

    let mut adjoints = Adjoints::new();
    generate_node_adjoints(&mut graph, &mut adjoints, product.node, &[seed]).expect("adjoints");

    // d(a*a)/da = seed*a + seed*a, accumulated through one Add
    let delta = adjoints.get(a).expect("delta of a");
    let accumulated = graph.node(delta.node);
    assert_eq!(accumulated.description(), "Add");
    for term in accumulated.arguments() {
        let term = graph.node(term);
        assert_eq!(term.description(), "Multiply");
        assert_eq!(term.input_values(), vec![seed, a]);
    }
    assert_eq!(adjoints.len(), 1);
}

#[test]
fn broadcasting_adjoints_are_unsupported() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[3]);
    let sum = ops::add(&mut graph, a, b).expect("add");
    let seed = f32_param(&mut graph, &[2, 3]);

    let mut adjoints = Adjoints::new();
    let err = generate_node_adjoints(&mut graph, &mut adjoints, sum.node, &[seed])
        .expect_err("broadcast add");
    assert!(matches!(err, GraphError::Unsupported { op: "Add", .. }));
    assert!(adjoints.is_empty());
}

#[test]
fn delta_count_must_match_outputs() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let negated = ops::negative(&mut graph, a).expect("negative");

    let mut adjoints = Adjoints::new();
    let err = generate_node_adjoints(&mut graph, &mut adjoints, negated.node, &[])
        .expect_err("no deltas");
    assert!(matches!(err, GraphError::Unsupported { op: "Negative", .. }));
}

#[test]
fn ops_without_a_hook_report_it() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let root = ops::sqrt(&mut graph, a).expect("sqrt");
    let seed = f32_param(&mut graph, &[2]);

    let mut adjoints = Adjoints::new();
    let err = generate_node_adjoints(&mut graph, &mut adjoints, root.node, &[seed])
        .expect_err("sqrt has no hook");
    assert_eq!(err.to_string(), "Sqrt does not support adjoint generation");
}

#[test]
fn sum_and_broadcast_are_mutual_adjoints() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let total = ops::sum(&mut graph, a, [1]).expect("sum");
    let seed = f32_param(&mut graph, &[2]);

    let mut adjoints = Adjoints::new();
    generate_node_adjoints(&mut graph, &mut adjoints, total.node, &[seed]).expect("adjoints");
    let delta = adjoints.get(a).expect("delta");
    let node = graph.node(delta.node);
    assert_eq!(node.description(), "Broadcast");
    assert_eq!(node.shape().expect("shape"), Shape::new([2, 3]));
}
