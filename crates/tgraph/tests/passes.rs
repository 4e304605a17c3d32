use std::any::Any;

use anyhow::Result;
use tgraph::graph::{Graph, NodeId, Output};
use tgraph::op::{check_new_args_count, decompose_node, Decompose, Op};
use tgraph::ops::{self, Clamp, Constant, Mvn};
use tgraph::pass::{
    check_pass_preconditions, run_pass, AlgebraicSimplificationPass, DeadNodeEliminationPass,
    FusedOpDecompositionPass, GraphPass, PassConfig, PassManager, PassProperty,
    PassPropertyMask, PassResult,
};
use tgraph::types::{Dimension, ElementType, PartialShape, Shape};
use tgraph::{GraphError, GraphResult};

fn f32_param(graph: &mut Graph, dims: &[usize]) -> Output {
    ops::parameter(graph, ElementType::F32, Shape::from(dims)).expect("parameter")
}

fn count_kind(graph: &Graph, kind: &str) -> usize {
    graph
        .nodes()
        .filter(|node| node.description() == kind)
        .count()
}

/// Decomposes into a partial subgraph, then fails or yields no outputs.
#[derive(Debug, Clone, Copy)]
struct Unfinished {
    fails: bool,
}

impl Op for Unfinished {
    fn type_name(&self) -> &'static str {
        "Unfinished"
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(*self, new_args)
    }

    fn as_decomposable(&self) -> Option<&dyn Decompose> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Decompose for Unfinished {
    fn decompose(&self, graph: &mut Graph, node: NodeId) -> GraphResult<Vec<Output>> {
        let data = graph.try_node(node)?.input_value(0)?;
        let negated = ops::negative(graph, data)?;
        ops::sqrt(graph, negated)?;
        if self.fails {
            return Err(GraphError::Unsupported {
                op: self.type_name(),
                what: "decomposition".to_string(),
            });
        }
        Ok(Vec::new())
    }
}

#[test]
fn property_mask_tracks_individual_bits() {
    let mut mask = PassPropertyMask::empty();
    assert!(!mask.is_set(PassProperty::RegularFusions));

    mask.set(PassProperty::RegularFusions);
    mask.set(PassProperty::ChangeDynamicState);
    assert!(mask.is_set(PassProperty::RegularFusions));
    assert!(!mask.is_set(PassProperty::RequireStaticShape));
    assert!(mask.contains(PassProperty::ChangeDynamicState.into()));

    mask.clear(PassProperty::RegularFusions);
    assert!(!mask.is_set(PassProperty::RegularFusions));
    assert_eq!(
        mask,
        PassPropertyMask::from(PassProperty::ChangeDynamicState)
    );

    let combined = PassProperty::RegularFusions | PassProperty::RequireStaticShape;
    assert!(combined.contains(PassPropertyMask::from(PassProperty::RequireStaticShape)));
    assert!(!combined.contains(combined | PassProperty::ChangeDynamicState));
    assert_ne!(combined.bits(), 0);
}

#[test]
fn static_shape_requirement_is_checked_before_running() {
    let mut graph = Graph::new();
    let a = ops::parameter(
        &mut graph,
        ElementType::F32,
        PartialShape::new(vec![Dimension::Dynamic, Dimension::Static(2)]),
    )
    .expect("parameter");
    let zero = ops::constant(&mut graph, Constant::scalar(ElementType::F32, 0.0)).expect("zero");
    let sum = ops::add(&mut graph, a, zero).expect("add");
    ops::result(&mut graph, sum).expect("result");

    let pass = AlgebraicSimplificationPass;
    let err = check_pass_preconditions(&pass, &graph).expect_err("dynamic graph");
    assert!(matches!(
        err,
        GraphError::PassPrecondition {
            pass: "algebraic_simplification",
            ..
        }
    ));
    assert!(run_pass(&pass, &mut graph).is_err());
    assert_eq!(count_kind(&graph, "Add"), 1, "graph left untouched");
}

#[test]
fn algebraic_simplification_folds_neutral_operands() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 2]);
    let zero = ops::constant(&mut graph, Constant::splat(ElementType::F32, vec![2, 2], 0.0))?;
    let one = ops::constant(&mut graph, Constant::scalar(ElementType::F32, 1.0))?;
    let sum = ops::add(&mut graph, zero, a)?;
    let product = ops::multiply(&mut graph, sum, one)?;
    let result = ops::result(&mut graph, product)?;

    let stats = run_pass(&AlgebraicSimplificationPass, &mut graph)?;
    assert!(stats.changed);
    assert_eq!(stats.rewrites_applied, 2);
    assert_eq!(graph.node(result).input_values(), vec![a]);
    assert_eq!(count_kind(&graph, "Add"), 0);
    assert_eq!(count_kind(&graph, "Multiply"), 0);
    graph.verify_edges()?;
    Ok(())
}

#[test]
fn algebraic_simplification_keeps_ordering_through_folded_nodes() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[3]);
    let b = f32_param(&mut graph, &[3]);
    let side_effect = ops::sqrt(&mut graph, b)?;
    let zero = ops::constant(&mut graph, Constant::splat(ElementType::F32, vec![3], 0.0))?;
    let sum = ops::add(&mut graph, a, zero)?;
    graph.add_control_dependency(sum.node, side_effect.node)?;
    let negated = ops::negative(&mut graph, sum)?;
    graph.add_control_dependency(negated.node, sum.node)?;
    ops::result(&mut graph, negated)?;
    ops::result(&mut graph, side_effect)?;

    let stats = run_pass(&AlgebraicSimplificationPass, &mut graph)?;
    assert_eq!(stats.rewrites_applied, 1);
    assert_eq!(count_kind(&graph, "Add"), 0);
    let negated = graph.node(negated.node);
    assert_eq!(negated.input_values(), vec![a]);
    assert!(negated.control_dependencies().contains(&side_effect.node));
    assert!(!negated.control_dependencies().contains(&sum.node));

    let order = graph.topological_order()?;
    let position = |id| order.iter().position(|node| *node == id).expect("ordered");
    assert!(position(side_effect.node) < position(negated.id()));
    Ok(())
}

#[test]
fn algebraic_simplification_keeps_broadcasting_identities() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[3]);
    let zero = ops::constant(&mut graph, Constant::splat(ElementType::F32, vec![2, 3], 0.0))?;
    let sum = ops::add(&mut graph, a, zero)?;
    ops::result(&mut graph, sum)?;

    let stats = run_pass(&AlgebraicSimplificationPass, &mut graph)?;
    assert!(!stats.changed);
    assert_eq!(count_kind(&graph, "Add"), 1);
    Ok(())
}

#[test]
fn fused_decomposition_replaces_clamp_and_keeps_provenance() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[3]);
    let clamped = ops::clamp(&mut graph, a, 0.0, 3.0)?;
    graph.add_provenance_tag(clamped.node, "activation")?;
    let result = ops::result(&mut graph, clamped)?;

    let stats = run_pass(&FusedOpDecompositionPass::new(), &mut graph)?;
    assert!(stats.changed);
    assert_eq!(stats.rewrites_applied, 1);
    assert_eq!(count_kind(&graph, "Clamp"), 0);
    assert_eq!(count_kind(&graph, "Maximum"), 1);
    assert_eq!(count_kind(&graph, "Minimum"), 1);

    let min_node = graph.node(graph.node(result).argument(0)?);
    assert_eq!(min_node.description(), "Minimum");
    assert_eq!(min_node.shape()?, Shape::new([3]));
    for node in graph.nodes() {
        if !node.is_parameter() && !node.is_output() {
            assert!(
                node.provenance_tags().contains("activation"),
                "{} lost its provenance",
                node.name()
            );
        }
    }
    graph.verify_edges()?;
    Ok(())
}

#[test]
fn failed_decompositions_leave_no_partial_subgraph() -> Result<()> {
    for fails in [true, false] {
        let mut graph = Graph::new();
        let a = f32_param(&mut graph, &[3]);
        let unfinished = graph.add_node(Unfinished { fails }, &[a])?;
        let result = ops::result(&mut graph, unfinished.output(0))?;
        let before = graph.len();

        let err = decompose_node(&mut graph, unfinished).expect_err("decomposition fails");
        if fails {
            assert!(matches!(err, GraphError::Unsupported { .. }));
        } else {
            assert!(matches!(
                err,
                GraphError::DecompositionArity {
                    expected: 1,
                    actual: 0,
                    ..
                }
            ));
        }
        assert_eq!(graph.len(), before);
        assert_eq!(count_kind(&graph, "Negative"), 0);
        assert_eq!(count_kind(&graph, "Sqrt"), 0);
        assert_eq!(graph.users(a.node, false)?.len(), 1);
        assert_eq!(graph.node(result).argument(0)?, unfinished);
        graph.verify_edges()?;

        let err = run_pass(&FusedOpDecompositionPass::new(), &mut graph)
            .expect_err("the pass reports the failure");
        assert!(err.to_string().contains("fused_op_decomposition"));
        assert_eq!(graph.len(), before);
    }
    Ok(())
}

#[test]
fn boolean_clamp_is_rejected() {
    let mut graph = Graph::new();
    let flags = ops::parameter(&mut graph, ElementType::Boolean, Shape::new([4])).expect("flags");
    let before = graph.len();
    match ops::clamp(&mut graph, flags, 0.0, 1.0).expect_err("boolean clamp") {
        GraphError::NodeValidation { explanation, .. } => {
            assert!(explanation.contains("cannot have boolean element type"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(graph.len(), before);
}

#[test]
fn integral_clamp_rounds_fractional_bounds_inward() -> Result<()> {
    let mut graph = Graph::new();
    let a = ops::parameter(&mut graph, ElementType::I64, Shape::new([3]))?;
    let clamped = ops::clamp(&mut graph, a, 0.5, 3.7)?;
    ops::result(&mut graph, clamped)?;
    assert_eq!(
        Clamp::new(0.5, 3.7).bounds_for(ElementType::I64),
        (1.0, 3.0)
    );
    assert_eq!(
        Clamp::new(0.5, 3.7).bounds_for(ElementType::F32),
        (0.5, 3.7)
    );

    run_pass(&FusedOpDecompositionPass::new(), &mut graph)?;
    let mut bounds = graph
        .nodes()
        .filter_map(|node| node.op_as::<Constant>().and_then(Constant::splat_value))
        .collect::<Vec<_>>();
    bounds.sort_by(f64::total_cmp);
    assert_eq!(bounds, vec![1.0, 3.0]);
    assert_eq!(count_kind(&graph, "Clamp"), 0);
    graph.verify_edges()?;
    Ok(())
}

#[test]
fn fused_decomposition_honors_its_filter() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 4]);
    let clamped = ops::clamp(&mut graph, a, -1.0, 1.0)?;
    let normalized = ops::mvn(&mut graph, clamped, Mvn::new(true, true, Mvn::DEFAULT_EPS))?;
    ops::result(&mut graph, normalized)?;

    let pass = FusedOpDecompositionPass::with_filter(|op| op.as_any().is::<Mvn>());
    run_pass(&pass, &mut graph)?;
    assert_eq!(count_kind(&graph, "MVN"), 0);
    assert_eq!(count_kind(&graph, "Clamp"), 1);
    assert!(graph.nodes().any(|node| node.op_as::<Clamp>().is_some()));
    Ok(())
}

#[test]
fn dead_node_elimination_keeps_results_and_parameters() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2]);
    let unused = f32_param(&mut graph, &[2]);
    let live = ops::negative(&mut graph, a)?;
    let dead = ops::sqrt(&mut graph, a)?;
    let dead_tail = ops::add(&mut graph, dead, unused)?;
    let ordered = ops::sqrt(&mut graph, a)?;
    let result = ops::result(&mut graph, live)?;
    graph.add_control_dependency(result, ordered.node)?;

    let stats = run_pass(&DeadNodeEliminationPass, &mut graph)?;
    assert_eq!(stats.removed_nodes, 2);
    assert!(!graph.contains(dead.node));
    assert!(!graph.contains(dead_tail.node));
    assert!(graph.contains(ordered.node), "control dependencies keep nodes alive");
    assert!(graph.contains(unused.node));
    graph.verify_edges()?;
    Ok(())
}

#[derive(Default)]
struct CountingPass;

impl GraphPass for CountingPass {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn run(&self, graph: &mut Graph) -> Result<PassResult> {
        Ok(PassResult {
            iterations: 1,
            rewrites_applied: graph.len(),
            ..PassResult::default()
        })
    }
}

#[test]
fn pass_manager_sweeps_until_nothing_changes() -> Result<()> {
    let mut graph = Graph::new();
    let a = f32_param(&mut graph, &[2, 3]);
    let clamped = ops::clamp(&mut graph, a, 0.0, 6.0)?;
    let zero = ops::constant(&mut graph, Constant::splat(ElementType::F32, vec![2, 3], 0.0))?;
    let sum = ops::add(&mut graph, clamped, zero)?;
    ops::result(&mut graph, sum)?;

    let mut manager = PassManager::new(PassConfig::default());
    manager
        .register(FusedOpDecompositionPass::new())
        .register(AlgebraicSimplificationPass)
        .register(DeadNodeEliminationPass)
        .register(CountingPass);
    assert_eq!(
        manager.pass_names(),
        vec![
            "fused_op_decomposition",
            "algebraic_simplification",
            "dead_node_elimination",
            "counting"
        ]
    );

    let stats = manager.run(&mut graph)?;
    assert!(stats.changed);
    assert_eq!(stats.iterations, 2, "second sweep finds nothing to do");
    assert_eq!(count_kind(&graph, "Clamp"), 0);
    assert_eq!(count_kind(&graph, "Add"), 0);
    // parameter, two splat constants, maximum, minimum, result
    assert_eq!(graph.len(), 6);
    Ok(())
}
