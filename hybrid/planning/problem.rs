use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{module::Failure, oracle::SubproblemBuilder};

/// Action committed before a failure step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    /// Action name.
    pub name: String,
    /// First step.
    pub start: usize,
    /// Last step.
    pub end: usize,
}

/// Committed plan prefix attached to a failure-derived node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrefix {
    /// Step at which the committed part ends (exclusive).
    pub step: usize,
    /// Actions finished before `step`.
    pub actions: Vec<ActionSummary>,
}

impl PlanPrefix {
    /// Names of the committed actions.
    #[must_use]
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.name.as_str()).collect()
    }
}

/// Failure that produced a subproblem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Problem the failure happened in.
    pub parent: Uuid,
    /// Violated predicate.
    pub predicate: String,
    /// Violation step.
    pub step: usize,
    /// Action containing the step.
    pub action: String,
}

/// Symbolic task problem: ground facts of the initial state and goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicProblem {
    /// Problem identifier.
    pub id: Uuid,
    /// Problem name.
    pub name: String,
    /// Facts holding initially, e.g. `(RobotAt baxter robot_init_pose)`.
    pub init: IndexSet<String>,
    /// Facts that must hold at the end.
    pub goal: IndexSet<String>,
    /// Committed prefix for failure-derived problems.
    #[serde(default)]
    pub prefix: Option<PlanPrefix>,
    /// Failure this problem was derived from.
    #[serde(default)]
    pub failure: Option<FailureContext>,
}

impl SymbolicProblem {
    /// Creates a root problem.
    pub fn new<I, G, S, T>(name: impl Into<String>, init: I, goal: G) -> Self
    where
        I: IntoIterator<Item = S>,
        G: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            init: init.into_iter().map(Into::into).collect(),
            goal: goal.into_iter().map(Into::into).collect(),
            prefix: None,
            failure: None,
        }
    }

    /// True when every goal fact holds in the initial state.
    #[must_use]
    pub fn goal_test(&self) -> bool {
        self.goal.iter().all(|fact| self.init.contains(fact))
    }

    /// Unsatisfied goal facts.
    #[must_use]
    pub fn open_goals(&self) -> Vec<&str> {
        self.goal
            .iter()
            .filter(|fact| !self.init.contains(*fact))
            .map(String::as_str)
            .collect()
    }

    /// True for problems derived from a refinement failure.
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.failure.is_some()
    }
}

/// Default subproblem constructor: same facts, tagged with the failure and the
/// committed prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureSubproblemBuilder;

impl SubproblemBuilder for FailureSubproblemBuilder {
    fn build(
        &self,
        parent: &SymbolicProblem,
        prefix: &PlanPrefix,
        failure: &Failure,
    ) -> SymbolicProblem {
        SymbolicProblem {
            id: Uuid::new_v4(),
            name: format!("{}@{}", parent.name, failure.step),
            init: parent.init.clone(),
            goal: parent.goal.clone(),
            prefix: Some(prefix.clone()),
            failure: Some(FailureContext {
                parent: parent.id,
                predicate: failure.predicate.clone(),
                step: failure.step,
                action: failure.action_name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ActionId, BindingId};

    #[test]
    fn goal_test_checks_every_fact() {
        let done = SymbolicProblem::new("p", ["(At can0 target0)"], ["(At can0 target0)"]);
        assert!(done.goal_test());
        let open = SymbolicProblem::new(
            "p",
            ["(At can0 target0)"],
            ["(At can0 target0)", "(At can0 target1)"],
        );
        assert!(!open.goal_test());
        assert_eq!(open.open_goals(), vec!["(At can0 target1)"]);
    }

    #[test]
    fn subproblem_records_failure_and_prefix() {
        let parent = SymbolicProblem::new("putdown", Vec::<String>::new(), ["(At can1 target2)"]);
        let prefix = PlanPrefix {
            step: 20,
            actions: vec![ActionSummary {
                name: "moveto".into(),
                start: 0,
                end: 19,
            }],
        };
        let failure = Failure {
            binding: BindingId(2),
            predicate: "EEReachable".into(),
            step: 23,
            action: ActionId(1),
            action_name: "grasp".into(),
        };
        let child = FailureSubproblemBuilder.build(&parent, &prefix, &failure);
        assert_eq!(child.name, "putdown@23");
        assert_eq!(child.goal, parent.goal);
        assert!(child.is_derived());
        assert_eq!(child.failure.as_ref().unwrap().parent, parent.id);
        assert_eq!(child.prefix.unwrap().action_names(), vec!["moveto"]);
    }
}
