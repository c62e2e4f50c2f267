use std::sync::Arc;

use uuid::Uuid;

use crate::{
    model::Plan,
    module::Failure,
    problem::{PlanPrefix, SymbolicProblem},
};

/// Node awaiting translation into a skeleton.
#[derive(Debug, Clone, Default)]
pub struct HlNode {
    /// Committed prefix inherited from the failure that produced this node.
    pub prefix: Option<PlanPrefix>,
    /// Translations already produced.
    pub revisits: usize,
    /// Repaired plan offered to the translator on the first visit.
    pub seed: Option<Box<Plan>>,
}

/// Node holding a skeleton under refinement.
#[derive(Debug, Clone)]
pub struct LlNode {
    /// Plan being refined; repairs accumulate on it across attempts.
    pub plan: Box<Plan>,
    /// Refinement passes run so far.
    pub attempts: usize,
    /// Failure reported by the last pass.
    pub last_failure: Option<Failure>,
}

/// HL or LL payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Awaiting translation.
    Hl(HlNode),
    /// Awaiting refinement.
    Ll(LlNode),
}

/// Hybrid search node.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Node identifier.
    pub id: Uuid,
    /// Generation depth.
    pub priority: usize,
    /// Symbolic problem the node works on.
    pub problem: Arc<SymbolicProblem>,
    /// Variant payload.
    pub kind: NodeKind,
}

impl SearchNode {
    /// Root HL node at priority 0.
    #[must_use]
    pub fn root(problem: Arc<SymbolicProblem>) -> Self {
        Self::hl(problem, 0, HlNode::default())
    }

    /// HL node.
    #[must_use]
    pub fn hl(problem: Arc<SymbolicProblem>, priority: usize, node: HlNode) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            problem,
            kind: NodeKind::Hl(node),
        }
    }

    /// LL node for a fresh skeleton.
    #[must_use]
    pub fn ll(problem: Arc<SymbolicProblem>, priority: usize, plan: Plan) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            problem,
            kind: NodeKind::Ll(LlNode {
                plan: Box::new(plan),
                attempts: 0,
                last_failure: None,
            }),
        }
    }

    /// Queue key: generation depth plus the work already spent on this node.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn heuristic(&self) -> f64 {
        let spent = match &self.kind {
            NodeKind::Hl(node) => node.revisits,
            NodeKind::Ll(node) => node.attempts,
        };
        (self.priority + spent) as f64
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self.kind {
            NodeKind::Hl(_) => "hl",
            NodeKind::Ll(_) => "ll",
        }
    }
}
