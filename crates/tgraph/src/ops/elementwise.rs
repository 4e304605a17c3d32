use std::any::Any;

use crate::autodiff::AdjointContext;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::op::{check_new_args_count, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    Power,
}

impl BinaryKind {
    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::Add => "Add",
            BinaryKind::Subtract => "Subtract",
            BinaryKind::Multiply => "Multiply",
            BinaryKind::Divide => "Divide",
            BinaryKind::Maximum => "Maximum",
            BinaryKind::Minimum => "Minimum",
            BinaryKind::Power => "Power",
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryKind::Add | BinaryKind::Multiply | BinaryKind::Maximum | BinaryKind::Minimum
        )
    }
}

/// Elementwise arithmetic over two broadcast-compatible arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binary {
    kind: BinaryKind,
}

impl Binary {
    pub fn new(kind: BinaryKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> BinaryKind {
        self.kind
    }
}

impl Op for Binary {
    fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(2)?;
        cx.infer_elementwise_arithmetic()
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 2)?;
        graph.add_node(*self, new_args)
    }

    fn generate_adjoints(&self, cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        let delta = cx.delta(0)?;
        match self.kind {
            BinaryKind::Add => {
                cx.require_unbroadcast(self.type_name())?;
                cx.add_input_delta(0, delta)?;
                cx.add_input_delta(1, delta)
            }
            BinaryKind::Subtract => {
                cx.require_unbroadcast(self.type_name())?;
                let negated = super::negative(cx.graph(), delta)?;
                cx.add_input_delta(0, delta)?;
                cx.add_input_delta(1, negated)
            }
            BinaryKind::Multiply => {
                cx.require_unbroadcast(self.type_name())?;
                let lhs = cx.input_value(0)?;
                let rhs = cx.input_value(1)?;
                let lhs_delta = super::multiply(cx.graph(), delta, rhs)?;
                let rhs_delta = super::multiply(cx.graph(), delta, lhs)?;
                cx.add_input_delta(0, lhs_delta)?;
                cx.add_input_delta(1, rhs_delta)
            }
            _ => Err(GraphError::Unsupported {
                op: self.type_name(),
                what: "adjoint generation".to_string(),
            }),
        }
    }

    fn is_commutative(&self) -> bool {
        self.kind.is_commutative()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Negative,
    Abs,
    Sqrt,
    Exp,
    Log,
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Negative => "Negative",
            UnaryKind::Abs => "Abs",
            UnaryKind::Sqrt => "Sqrt",
            UnaryKind::Exp => "Exp",
            UnaryKind::Log => "Log",
        }
    }
}

/// Elementwise arithmetic over one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unary {
    kind: UnaryKind,
}

impl Unary {
    pub fn new(kind: UnaryKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> UnaryKind {
        self.kind
    }
}

impl Op for Unary {
    fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        cx.infer_elementwise_arithmetic()
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(*self, new_args)
    }

    fn generate_adjoints(&self, cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        let delta = cx.delta(0)?;
        match self.kind {
            UnaryKind::Negative => {
                let negated = super::negative(cx.graph(), delta)?;
                cx.add_input_delta(0, negated)
            }
            // d/dx exp(x) = exp(x)
            UnaryKind::Exp => {
                let value = cx.node().output(0);
                let product = super::multiply(cx.graph(), delta, value)?;
                cx.add_input_delta(0, product)
            }
            _ => Err(GraphError::Unsupported {
                op: self.type_name(),
                what: "adjoint generation".to_string(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKind {
    And,
    Or,
    Xor,
}

impl LogicalKind {
    pub fn name(self) -> &'static str {
        match self {
            LogicalKind::And => "And",
            LogicalKind::Or => "Or",
            LogicalKind::Xor => "Xor",
        }
    }
}

/// Elementwise boolean logic over two broadcast-compatible arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logical {
    kind: LogicalKind,
}

impl Logical {
    pub fn new(kind: LogicalKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> LogicalKind {
        self.kind
    }
}

impl Op for Logical {
    fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(2)?;
        cx.infer_elementwise_logical()
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 2)?;
        graph.add_node(*self, new_args)
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
