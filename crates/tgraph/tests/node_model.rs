use std::any::Any;
use std::sync::Arc;

use tgraph::graph::{Graph, InferContext, NodeId, Output};
use tgraph::op::{check_new_args_count, Op};
use tgraph::ops::{self, Constant};
use tgraph::types::{Dimension, ElementType, PartialShape, Shape};
use tgraph::{GraphError, GraphResult, Placement};

/// Two outputs, each a copy of the argument's type.
#[derive(Debug)]
struct Split2;

impl Op for Split2 {
    fn type_name(&self) -> &'static str {
        "Split2"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        let element_type = cx.input_element_type(0)?;
        let shape = cx.input_partial_shape(0)?.clone();
        for index in 0..cx.output_size() {
            cx.set_output_type(index, element_type, shape.clone())?;
        }
        Ok(())
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        add_split(graph, new_args[0])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Relies on the default inference.
#[derive(Debug)]
struct Opaque;

impl Op for Opaque {
    fn type_name(&self) -> &'static str {
        "Opaque"
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        graph.add_node(Opaque, new_args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn add_split(graph: &mut Graph, arg: Output) -> GraphResult<NodeId> {
    let id = graph.create_node(Arc::new(Split2), &[arg])?;
    graph.set_output_size(id, 2)?;
    graph.constructor_validate_and_infer_types(id)?;
    Ok(id)
}

fn f32_param(graph: &mut Graph, dims: &[usize]) -> Output {
    ops::parameter(graph, ElementType::F32, Shape::from(dims)).expect("parameter")
}

#[test]
fn unique_names_follow_kind_and_instance() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[2, 3]);
    let sum = ops::add(&mut graph, a, b).expect("add");

    let node = graph.node(sum.node);
    assert_eq!(node.unique_name(), format!("Add_{}", node.instance_id()));
    assert_eq!(node.name(), node.unique_name());
    assert_eq!(
        node.output_tensor(0).expect("tensor").name(),
        format!("{}_0", node.unique_name())
    );
    assert!(node.instance_id() > graph.node(b.node).instance_id());
}

#[test]
fn friendly_name_can_be_set_once() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[4]);
    graph.set_friendly_name(a.node, "input").expect("first name");
    assert_eq!(graph.node(a.node).name(), "input");

    let err = graph
        .set_friendly_name(a.node, "again")
        .expect_err("second name must be rejected");
    assert!(matches!(err, GraphError::FriendlyNameAlreadySet { ref name, .. } if name == "input"));
}

#[test]
fn inference_populates_output_types() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[3]);
    let sum = ops::add(&mut graph, a, b).expect("add");

    let node = graph.node(sum.node);
    assert_eq!(node.input_size(), 2);
    assert_eq!(node.output_size(), 1);
    assert_eq!(node.element_type().expect("type"), ElementType::F32);
    assert_eq!(node.shape().expect("shape"), Shape::new([2, 3]));
    assert_eq!(node.input_shape(1).expect("input shape"), Shape::new([3]));
    assert_eq!(node.arguments(), vec![a.node, b.node]);
    assert!(node.input_is_relevant_to_value(0).expect("relevance"));
}

#[test]
fn multi_output_nodes_declare_their_size_before_inference() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[8]);
    let split = add_split(&mut graph, a).expect("split");

    let node = graph.node(split);
    assert_eq!(node.output_size(), 2);
    assert_eq!(node.output_shape(1).expect("shape"), Shape::new([8]));
    assert!(matches!(
        node.element_type(),
        Err(GraphError::NotSingleOutput { outputs: 2, .. })
    ));

    let err = graph
        .set_output_size(split, 3)
        .expect_err("size is frozen after inference");
    assert!(matches!(err, GraphError::OutputSizeFrozen { .. }));
}

#[test]
fn output_size_is_settable_once() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[8]);
    let id = graph.create_node(Arc::new(Split2), &[a]).expect("create");
    graph.set_output_size(id, 2).expect("first size");
    let err = graph.set_output_size(id, 4).expect_err("second size");
    assert!(matches!(err, GraphError::OutputSizeAlreadySet { .. }));

    graph
        .constructor_validate_and_infer_types(id)
        .expect("inference");
    let err = graph
        .constructor_validate_and_infer_types(id)
        .expect_err("constructor inference runs once");
    assert!(matches!(err, GraphError::ConstructionFinished { .. }));
}

#[test]
fn default_inference_marks_outputs_dynamic() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let opaque = graph.add_node(Opaque, &[a]).expect("opaque");

    let node = graph.node(opaque);
    assert_eq!(node.output_element_type(0).expect("type"), ElementType::Dynamic);
    assert!(node.output_partial_shape(0).expect("shape").is_dynamic());
    assert!(!graph.is_static());
}

#[test]
fn failed_construction_leaves_no_edges_behind() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[4]);
    let before = graph.len();

    let err = ops::add(&mut graph, a, b).expect_err("shapes do not broadcast");
    match err {
        GraphError::NodeValidation { node, explanation } => {
            assert!(node.starts_with("Add Add_"), "{node}");
            assert!(node.contains("f32[2,3]"), "{node}");
            assert!(explanation.contains("Argument shapes are inconsistent"), "{explanation}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(graph.len(), before);
    assert!(!graph.output(a).expect("a").has_users());
    assert!(!graph.output(b).expect("b").has_users());
    graph.verify_edges().expect("edges stay consistent");
}

#[test]
fn copy_with_new_args_rebinds_and_keeps_attributes() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[2, 3]);
    let c = f32_param(&mut graph, &[3]);
    let product = ops::multiply(&mut graph, a, b).expect("multiply");
    graph
        .add_provenance_tag(product.node, "layer0")
        .expect("tag");

    let copy = graph
        .copy_with_new_args(product.node, &[b, c])
        .expect("copy");
    let node = graph.node(copy);
    assert_ne!(copy, product.node);
    assert_eq!(node.description(), "Multiply");
    assert_eq!(node.input_values(), vec![b, c]);
    assert_eq!(node.shape().expect("shape"), Shape::new([2, 3]));
    assert!(node.provenance_tags().contains("layer0"));
}

#[test]
fn copy_with_wrong_arity_is_rejected() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let negated = ops::negative(&mut graph, a).expect("negative");

    let err = graph
        .copy_with_new_args(negated.node, &[a, a])
        .expect_err("arity mismatch");
    assert_eq!(
        err,
        GraphError::CopyArity {
            op: "Negative",
            expected: 1,
            actual: 2
        }
    );
    assert_eq!(
        err.to_string(),
        "Expected 1 element(s) in new_args for the Negative op but got 2"
    );
}

#[test]
fn users_can_be_filtered_by_liveness() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let live = ops::negative(&mut graph, a).expect("live");
    let dead = ops::sqrt(&mut graph, a).expect("dead");
    ops::result(&mut graph, live).expect("result");

    let all = graph.users(a.node, false).expect("users");
    assert_eq!(all.len(), 2);
    let used = graph.users(a.node, true).expect("used users");
    assert!(used.contains(&live.node));
    assert!(!used.contains(&dead.node));
}

#[test]
fn removed_nodes_become_stale() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let negated = ops::negative(&mut graph, a).expect("negative");

    let err = graph.remove_node(a.node).expect_err("a is still read");
    assert!(matches!(err, GraphError::NodeInUse { users: 1, .. }));

    graph.remove_node(negated.node).expect("remove");
    assert!(!graph.contains(negated.node));
    assert!(matches!(
        graph.try_node(negated.node),
        Err(GraphError::StaleNode { .. })
    ));
    assert!(!graph.output(a).expect("a").has_users());

    // the freed slot is reused under a new instance id
    let replacement = ops::sqrt(&mut graph, a).expect("sqrt");
    assert_ne!(replacement.node, negated.node);
    assert!(graph.try_node(negated.node).is_err());
}

#[test]
fn placement_and_control_dependencies_are_node_state() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let b = f32_param(&mut graph, &[2]);
    let c = ops::constant(&mut graph, Constant::splat(ElementType::F32, vec![2], 1.0)).expect("c");

    {
        let mut node = graph.node_mut(b.node).expect("node");
        node.set_placement(Placement::Gpu).expect("placement");
        node.set_placement_index(Some(1)).expect("index");
        node.add_control_dependency(a.node).expect("control dep");
    }
    let node = graph.node(b.node);
    assert_eq!(node.placement(), Placement::Gpu);
    assert_eq!(node.placement_index(), Some(1));
    assert!(node.control_dependencies().contains(&a.node));

    let order = graph.topological_order().expect("order");
    let pos = |id: NodeId| order.iter().position(|n| *n == id).expect("present");
    assert!(pos(a.node) < pos(b.node));

    // removing a dependency target drops it from every control set
    graph.remove_node(a.node).expect("remove a");
    assert!(graph.node(b.node).control_dependencies().is_empty());
    assert!(graph.node(c.node).is_constant());
}

#[test]
fn has_same_type_compares_all_outputs() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[2, 3]);
    let c = ops::parameter(
        &mut graph,
        ElementType::F32,
        PartialShape::new(vec![Dimension::Static(2), Dimension::Dynamic]),
    )
    .expect("c");

    assert!(graph.node(a.node).has_same_type(&graph.node(b.node)));
    assert!(!graph.node(a.node).has_same_type(&graph.node(c.node)));
}

#[test]
fn long_description_lists_arguments_and_results() {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let b = f32_param(&mut graph, &[2, 3]);
    graph.set_friendly_name(b.node, "bias").expect("name");
    let sum = ops::add(&mut graph, a, b).expect("add");

    let node = graph.node(sum.node);
    let expected = format!(
        "Add {}({}: f32[2,3], bias: f32[2,3]) -> (f32[2,3])",
        node.unique_name(),
        graph.node(a.node).unique_name()
    );
    assert_eq!(node.long_description(), expected);
    assert_eq!(node.to_string(), expected);
    assert_eq!(node.short_description(), format!("Add {}", node.unique_name()));
}
