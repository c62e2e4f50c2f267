use std::{collections::BTreeSet, fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Parameter, SamplingTraceEntry, TraceSummary, ROTATION, VALUE};
use crate::{
    config::{DomainConfig, RobotLayout},
    module::{ActionId, BindingId, Configuration, Failure, ParamId, PlanningError},
    oracle::GeometryOracle,
    predicate::{Predicate, PredicateContext},
    problem::{ActionSummary, PlanPrefix},
};

/// Symbolic operands of an action, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operands {
    /// Robot trajectory object.
    pub robot: ParamId,
    /// Start robot-pose symbol.
    pub start: Option<ParamId>,
    /// End robot-pose symbol.
    pub end: Option<ParamId>,
    /// Manipulated object.
    pub object: Option<ParamId>,
    /// Object target pose symbol.
    pub target: Option<ParamId>,
    /// End-effector pose symbol.
    pub ee_pose: Option<ParamId>,
}

impl Operands {
    /// Operands with only the robot set.
    #[must_use]
    pub const fn robot(robot: ParamId) -> Self {
        Self {
            robot,
            start: None,
            end: None,
            object: None,
            target: None,
            ee_pose: None,
        }
    }

    /// Sets the start and end robot-pose symbols.
    #[must_use]
    pub const fn with_poses(mut self, start: ParamId, end: ParamId) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Sets the manipulated object.
    #[must_use]
    pub const fn with_object(mut self, object: ParamId) -> Self {
        self.object = Some(object);
        self
    }

    /// Sets the target symbol.
    #[must_use]
    pub const fn with_target(mut self, target: ParamId) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the end-effector pose symbol.
    #[must_use]
    pub const fn with_ee_pose(mut self, ee_pose: ParamId) -> Self {
        self.ee_pose = Some(ee_pose);
        self
    }

    fn ids(&self) -> impl Iterator<Item = ParamId> {
        [
            Some(self.robot),
            self.start,
            self.end,
            self.object,
            self.target,
            self.ee_pose,
        ]
        .into_iter()
        .flatten()
    }
}

/// Grounded action spanning the inclusive step range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action name (e.g. `moveto`, `grasp`).
    pub name: String,
    /// First step.
    pub start: usize,
    /// Last step.
    pub end: usize,
    /// Symbolic operands.
    pub operands: Operands,
}

impl Action {
    /// True when `t` lies inside the action range.
    #[must_use]
    pub const fn contains(&self, t: usize) -> bool {
        self.start <= t && t <= self.end
    }

    /// Number of steps covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Actions always cover at least one step.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Middle step of the range.
    #[must_use]
    pub const fn midpoint(&self) -> usize {
        (self.start + self.end) / 2
    }

    fn summary(&self) -> ActionSummary {
        ActionSummary {
            name: self.name.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

/// A predicate attached to an action, evaluated over the inclusive `window` of steps.
#[derive(Debug, Clone)]
pub struct PredicateBinding {
    /// Binding id.
    pub id: BindingId,
    /// Owning action.
    pub action: ActionId,
    /// Predicate instance.
    pub predicate: Arc<dyn Predicate>,
    /// Steps at which the predicate is evaluated.
    pub window: (usize, usize),
}

impl PredicateBinding {
    /// True when the binding is evaluated at `t`.
    #[must_use]
    pub const fn covers(&self, t: usize) -> bool {
        self.window.0 <= t && t <= self.window.1
    }

    /// Inclusive window shifted by the predicate's active range.
    #[must_use]
    pub fn active_steps(&self) -> (isize, isize) {
        let range = self.predicate.active_range();
        (
            signed(self.window.0) + range.start,
            signed(self.window.1) + range.end,
        )
    }
}

/// Cells written by one repair proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWrite {
    /// Parameter written.
    pub param: ParamId,
    /// Attribute written.
    pub attr: String,
    /// Step (column 0 for symbols).
    pub step: usize,
    /// Rows that were free and received values.
    pub rows: Vec<usize>,
}

impl CellWrite {
    /// True when nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serializable overview of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Plan id.
    pub id: Uuid,
    /// Number of steps.
    pub horizon: usize,
    /// Actions in order.
    pub actions: Vec<ActionSummary>,
    /// Locked trajectory cells.
    pub locked_cells: usize,
    /// Repair proposals made on this plan.
    pub trace: TraceSummary,
}

/// Action skeleton plus arena-style trajectory buffers for every parameter.
///
/// The symbolic structure (parameters, actions, bindings) is fixed at build time.
/// Continuous cells only move from free to locked.
#[derive(Clone)]
pub struct Plan {
    id: Uuid,
    horizon: usize,
    params: Vec<Parameter>,
    names: IndexMap<String, ParamId>,
    actions: Vec<Action>,
    bindings: Vec<PredicateBinding>,
    layouts: Arc<IndexMap<String, RobotLayout>>,
    trace: Vec<SamplingTraceEntry>,
    reachable_memo: BTreeSet<BindingId>,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("horizon", &self.horizon)
            .field("actions", &self.actions)
            .field("bindings", &self.bindings.len())
            .field("trace", &self.trace.len())
            .finish_non_exhaustive()
    }
}

impl Plan {
    /// Plan id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Number of time steps.
    #[must_use]
    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    /// Actions in order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Predicate bindings in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[PredicateBinding] {
        &self.bindings
    }

    /// All parameters.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Parameter ids in declaration order.
    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> {
        (0..self.params.len()).map(ParamId)
    }

    /// Looks up a parameter.
    pub fn param(&self, id: ParamId) -> Result<&Parameter, PlanningError> {
        self.params
            .get(id.0)
            .ok_or_else(|| PlanningError::UnknownParameter(id.to_string()))
    }

    /// Mutable parameter view; buffers still refuse writes to locked cells.
    pub fn param_mut(&mut self, id: ParamId) -> Result<&mut Parameter, PlanningError> {
        self.params
            .get_mut(id.0)
            .ok_or_else(|| PlanningError::UnknownParameter(id.to_string()))
    }

    /// Resolves a parameter name.
    pub fn param_id(&self, name: &str) -> Result<ParamId, PlanningError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| PlanningError::UnknownParameter(name.into()))
    }

    /// Looks up an action.
    pub fn action(&self, id: ActionId) -> Result<&Action, PlanningError> {
        self.actions
            .get(id.0)
            .ok_or_else(|| PlanningError::MalformedAction {
                action: id.to_string(),
                reason: "no such action".into(),
            })
    }

    /// Looks up a binding.
    pub fn binding(&self, id: BindingId) -> Result<&PredicateBinding, PlanningError> {
        self.bindings
            .get(id.0)
            .ok_or_else(|| PlanningError::Config(format!("unknown binding {}", id.0)))
    }

    /// First action containing `t`.
    #[must_use]
    pub fn action_at(&self, t: usize) -> Option<ActionId> {
        self.actions
            .iter()
            .position(|action| action.contains(t))
            .map(ActionId)
    }

    /// Last action containing `t` (differs from [`Self::action_at`] on shared boundaries).
    #[must_use]
    pub fn last_action_at(&self, t: usize) -> Option<ActionId> {
        self.actions
            .iter()
            .rposition(|action| action.contains(t))
            .map(ActionId)
    }

    fn check_step(&self, t: usize) -> Result<(), PlanningError> {
        if t < self.horizon {
            Ok(())
        } else {
            Err(PlanningError::StepOutOfRange {
                step: t,
                horizon: self.horizon,
            })
        }
    }

    /// Attribute layout of a robot or robot-pose parameter.
    pub fn layout_of(&self, param: ParamId) -> Result<&RobotLayout, PlanningError> {
        let type_name = self.param(param)?.type_name();
        self.layouts
            .get(type_name)
            .ok_or_else(|| PlanningError::UnknownLayout(type_name.into()))
    }

    /// Full configuration (`base ++ arm`) of a robot or robot-pose parameter at `t`.
    pub fn configuration(&self, robot: ParamId, t: usize) -> Result<Configuration, PlanningError> {
        self.check_step(t)?;
        let layout = self.layout_of(robot)?;
        let param = self.param(robot)?;
        let mut config = param.values(&layout.base.attr, t)?.to_vec();
        config.extend_from_slice(param.values(&layout.arm.attr, t)?);
        Ok(config)
    }

    /// Arm joints of a robot at `t`.
    pub fn arm(&self, robot: ParamId, t: usize) -> Result<&[f64], PlanningError> {
        self.check_step(t)?;
        let layout = self.layout_of(robot)?;
        self.param(robot)?.values(&layout.arm.attr, t)
    }

    /// Base pose of a robot at `t`.
    pub fn base(&self, robot: ParamId, t: usize) -> Result<&[f64], PlanningError> {
        self.check_step(t)?;
        let layout = self.layout_of(robot)?;
        self.param(robot)?.values(&layout.base.attr, t)
    }

    /// True when every value of the robot configuration at `t` is finite.
    pub fn configuration_defined(&self, robot: ParamId, t: usize) -> Result<bool, PlanningError> {
        Ok(self
            .configuration(robot, t)?
            .iter()
            .all(|value| value.is_finite()))
    }

    /// Writes the free rows of one cell column. Locked rows keep their values.
    pub fn write(
        &mut self,
        param: ParamId,
        attr: &str,
        t: usize,
        values: &[f64],
    ) -> Result<CellWrite, PlanningError> {
        self.check_step(t)?;
        let parameter = self.param_mut(param)?;
        let col = parameter.col(t);
        let rows = parameter.attr_mut(attr)?.write_free(col, values)?;
        Ok(CellWrite {
            param,
            attr: attr.into(),
            step: t,
            rows,
        })
    }

    /// Splits a full configuration into base and arm writes.
    pub fn write_configuration(
        &mut self,
        robot: ParamId,
        t: usize,
        config: &[f64],
    ) -> Result<Vec<CellWrite>, PlanningError> {
        let layout = self.layout_of(robot)?.clone();
        if config.len() != layout.config_dim() {
            return Err(PlanningError::DimensionMismatch {
                what: format!("configuration of {robot}"),
                expected: layout.config_dim(),
                actual: config.len(),
            });
        }
        let (base, arm) = config.split_at(layout.base.dim);
        Ok(vec![
            self.write(robot, &layout.base.attr, t, base)?,
            self.write(robot, &layout.arm.attr, t, arm)?,
        ])
    }

    /// Writes arm joints only.
    pub fn write_arm(
        &mut self,
        robot: ParamId,
        t: usize,
        arm: &[f64],
    ) -> Result<CellWrite, PlanningError> {
        let attr = self.layout_of(robot)?.arm.attr.clone();
        self.write(robot, &attr, t, arm)
    }

    /// Locks the rows recorded by a write.
    pub fn lock(&mut self, write: &CellWrite) -> Result<(), PlanningError> {
        let parameter = self.param_mut(write.param)?;
        let col = parameter.col(write.step);
        parameter.attr_mut(&write.attr)?.lock_rows(col, &write.rows)
    }

    /// Locks every row of one column.
    pub fn lock_column(&mut self, param: ParamId, attr: &str, t: usize) -> Result<(), PlanningError> {
        self.check_step(t)?;
        let parameter = self.param_mut(param)?;
        let col = parameter.col(t);
        parameter.attr_mut(attr)?.lock(col)
    }

    /// Locks base and arm of a robot at `t`.
    pub fn lock_configuration(&mut self, robot: ParamId, t: usize) -> Result<(), PlanningError> {
        let layout = self.layout_of(robot)?.clone();
        self.lock_column(robot, &layout.base.attr, t)?;
        self.lock_column(robot, &layout.arm.attr, t)
    }

    /// Total locked cells; never decreases over the plan's lifetime.
    #[must_use]
    pub fn locked_cells(&self) -> usize {
        self.params.iter().map(Parameter::locked_count).sum()
    }

    /// True when every cell of every parameter holds a finite value.
    #[must_use]
    pub fn is_fully_defined(&self) -> bool {
        self.params.iter().all(|param| {
            param.buffers().all(|(_, buffer)| {
                (0..buffer.cols()).all(|col| buffer.is_defined(col).unwrap_or(false))
            })
        })
    }

    /// Evaluates one binding at `t`.
    pub fn test_binding(
        &self,
        binding: BindingId,
        t: usize,
        oracle: &dyn GeometryOracle,
    ) -> Result<bool, PlanningError> {
        let binding = self.binding(binding)?;
        let ctx = PredicateContext::new(self, oracle);
        Ok(binding.predicate.test(&ctx, t))
    }

    /// Bindings covering `t` whose predicate does not hold, in declaration order.
    #[must_use]
    pub fn failing_at(&self, t: usize, oracle: &dyn GeometryOracle) -> Vec<BindingId> {
        let ctx = PredicateContext::new(self, oracle);
        self.bindings
            .iter()
            .filter(|binding| binding.covers(t) && !binding.predicate.test(&ctx, t))
            .map(|binding| binding.id)
            .collect()
    }

    /// Earliest violated binding: lowest step first, then declaration order.
    #[must_use]
    pub fn first_failure(&self, oracle: &dyn GeometryOracle) -> Option<Failure> {
        (0..self.horizon).find_map(|t| {
            self.failing_at(t, oracle)
                .first()
                .and_then(|id| self.failure_for(*id, t))
        })
    }

    /// Builds the failure record for a binding violated at `t`.
    #[must_use]
    pub fn failure_for(&self, binding: BindingId, t: usize) -> Option<Failure> {
        let binding = self.bindings.get(binding.0)?;
        let action = self.actions.get(binding.action.0)?;
        Some(Failure {
            binding: binding.id,
            predicate: binding.predicate.name().into(),
            step: t,
            action: binding.action,
            action_name: action.name.clone(),
        })
    }

    /// Actions committed before `step`.
    #[must_use]
    pub fn prefix(&self, step: usize) -> PlanPrefix {
        PlanPrefix {
            step,
            actions: self
                .actions
                .iter()
                .filter(|action| action.end < step)
                .map(Action::summary)
                .collect(),
        }
    }

    /// Appends a trace entry and returns its index.
    pub fn record_trace(&mut self, entry: SamplingTraceEntry) -> usize {
        self.trace.push(entry);
        self.trace.len() - 1
    }

    /// Marks a recorded proposal as failed.
    pub fn fail_trace(&mut self, index: usize) {
        if let Some(entry) = self.trace.get_mut(index) {
            entry.fail();
        }
    }

    /// Repair proposals made on this plan, oldest first.
    #[must_use]
    pub fn trace(&self) -> &[SamplingTraceEntry] {
        &self.trace
    }

    /// Trace as pretty JSON.
    pub fn trace_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.trace)
    }

    /// Records a successful approach/retreat repair for a binding.
    pub fn remember_reachable(&mut self, binding: BindingId) {
        self.reachable_memo.insert(binding);
    }

    /// True when the binding already had a successful approach/retreat repair.
    #[must_use]
    pub fn reachable_repaired(&self, binding: BindingId) -> bool {
        self.reachable_memo.contains(&binding)
    }

    /// Serializable overview.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            id: self.id,
            horizon: self.horizon,
            actions: self.actions.iter().map(Action::summary).collect(),
            locked_cells: self.locked_cells(),
            trace: TraceSummary::of(&self.trace),
        }
    }

    /// Robot configurations per step, for export.
    pub fn robot_trajectory(&self, robot: ParamId) -> Result<Vec<Configuration>, PlanningError> {
        (0..self.horizon)
            .map(|t| self.configuration(robot, t))
            .collect()
    }
}

/// Assembles a plan skeleton, validating its symbolic structure.
#[derive(Debug)]
pub struct PlanBuilder {
    horizon: usize,
    layouts: Arc<IndexMap<String, RobotLayout>>,
    params: Vec<Parameter>,
    names: IndexMap<String, ParamId>,
    actions: Vec<Action>,
    bindings: Vec<(ActionId, Arc<dyn Predicate>, Option<(usize, usize)>)>,
}

impl PlanBuilder {
    /// Starts a plan over `horizon` steps.
    #[must_use]
    pub fn new(layouts: Arc<IndexMap<String, RobotLayout>>, horizon: usize) -> Self {
        Self {
            horizon,
            layouts,
            params: Vec::new(),
            names: IndexMap::new(),
            actions: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Starts a plan using the domain's robot layouts.
    #[must_use]
    pub fn for_domain(domain: &DomainConfig, horizon: usize) -> Self {
        Self::new(Arc::new(domain.robots.clone()), horizon)
    }

    fn add(&mut self, param: Parameter) -> Result<ParamId, PlanningError> {
        if self.names.contains_key(param.name()) {
            return Err(PlanningError::Config(format!(
                "duplicate parameter {}",
                param.name()
            )));
        }
        let id = ParamId(self.params.len());
        self.names.insert(param.name().into(), id);
        self.params.push(param);
        Ok(id)
    }

    fn layout(&self, robot_type: &str) -> Result<&RobotLayout, PlanningError> {
        self.layouts
            .get(robot_type)
            .ok_or_else(|| PlanningError::UnknownLayout(robot_type.into()))
    }

    /// Adds a robot trajectory object using its type's layout.
    pub fn robot(&mut self, name: &str, robot_type: &str) -> Result<ParamId, PlanningError> {
        let attrs = self.layout(robot_type)?.attributes();
        let horizon = self.horizon;
        self.add(Parameter::new(name, robot_type, false, horizon, &attrs))
    }

    /// Adds a robot-pose symbol (base and arm attributes of the robot type).
    pub fn robot_pose(&mut self, name: &str, robot_type: &str) -> Result<ParamId, PlanningError> {
        let layout = self.layout(robot_type)?;
        let attrs = vec![
            (layout.base.attr.clone(), layout.base.dim),
            (layout.arm.attr.clone(), layout.arm.dim()),
        ];
        let horizon = self.horizon;
        self.add(Parameter::new(name, robot_type, true, horizon, &attrs))
    }

    /// Adds a pose symbol (`value` and `rotation`), such as a target or end-effector pose.
    pub fn pose_symbol(&mut self, name: &str, type_name: &str) -> Result<ParamId, PlanningError> {
        let horizon = self.horizon;
        self.add(Parameter::new(name, type_name, true, horizon, &pose_attrs()))
    }

    /// Adds a movable object with a pose trajectory.
    pub fn object(&mut self, name: &str, type_name: &str) -> Result<ParamId, PlanningError> {
        let horizon = self.horizon;
        self.add(Parameter::new(name, type_name, false, horizon, &pose_attrs()))
    }

    /// Writes and locks one known cell column.
    pub fn fix(
        &mut self,
        param: ParamId,
        attr: &str,
        t: usize,
        values: &[f64],
    ) -> Result<(), PlanningError> {
        if t >= self.horizon {
            return Err(PlanningError::StepOutOfRange {
                step: t,
                horizon: self.horizon,
            });
        }
        let parameter = self
            .params
            .get_mut(param.0)
            .ok_or_else(|| PlanningError::UnknownParameter(param.to_string()))?;
        let col = parameter.col(t);
        parameter.attr_mut(attr)?.fix(col, values)
    }

    /// Writes and locks an attribute over every step.
    pub fn fix_all(&mut self, param: ParamId, attr: &str, values: &[f64]) -> Result<(), PlanningError> {
        for t in 0..self.horizon {
            self.fix(param, attr, t, values)?;
        }
        Ok(())
    }

    /// Appends an action over `[start, end]`.
    pub fn action(
        &mut self,
        name: impl Into<String>,
        start: usize,
        end: usize,
        operands: Operands,
    ) -> ActionId {
        self.actions.push(Action {
            name: name.into(),
            start,
            end,
            operands,
        });
        ActionId(self.actions.len() - 1)
    }

    /// Binds a predicate evaluated over the inclusive `window`.
    pub fn bind(
        &mut self,
        action: ActionId,
        predicate: Arc<dyn Predicate>,
        window: (usize, usize),
    ) -> BindingId {
        self.bindings.push((action, predicate, Some(window)));
        BindingId(self.bindings.len() - 1)
    }

    /// Binds a predicate evaluated over the whole action range.
    pub fn bind_over(&mut self, action: ActionId, predicate: Arc<dyn Predicate>) -> BindingId {
        self.bindings.push((action, predicate, None));
        BindingId(self.bindings.len() - 1)
    }

    /// Validates action ranges, operands and binding windows.
    pub fn build(self) -> Result<Plan, PlanningError> {
        if self.horizon == 0 {
            return Err(PlanningError::Config("plan horizon must be positive".into()));
        }
        if self.actions.is_empty() {
            return Err(PlanningError::Config("plan has no actions".into()));
        }
        let mut expected_start = 0;
        for (idx, action) in self.actions.iter().enumerate() {
            let malformed = |reason: String| PlanningError::MalformedAction {
                action: action.name.clone(),
                reason,
            };
            if action.start > action.end {
                return Err(malformed(format!(
                    "range [{}, {}] is reversed",
                    action.start, action.end
                )));
            }
            let contiguous = if idx == 0 {
                action.start == 0
            } else {
                action.start == expected_start || action.start == expected_start + 1
            };
            if !contiguous {
                return Err(malformed(format!(
                    "starts at {} but the previous action ends at {expected_start}",
                    action.start
                )));
            }
            if action.end >= self.horizon {
                return Err(malformed(format!(
                    "ends at {} beyond horizon {}",
                    action.end, self.horizon
                )));
            }
            if let Some(id) = action.operands.ids().find(|id| id.0 >= self.params.len()) {
                return Err(PlanningError::UnknownParameter(id.to_string()));
            }
            expected_start = action.end;
        }
        if expected_start + 1 != self.horizon {
            return Err(PlanningError::Config(format!(
                "actions cover [0, {expected_start}] but horizon is {}",
                self.horizon
            )));
        }

        let mut bindings = Vec::with_capacity(self.bindings.len());
        for (idx, (action, predicate, window)) in self.bindings.into_iter().enumerate() {
            let range = self
                .actions
                .get(action.0)
                .ok_or_else(|| PlanningError::MalformedAction {
                    action: action.to_string(),
                    reason: format!("predicate {} bound to a missing action", predicate.name()),
                })?;
            let window = window.unwrap_or((range.start, range.end));
            let malformed = |reason: String| PlanningError::MalformedAction {
                action: range.name.clone(),
                reason,
            };
            if window.0 > window.1 || window.0 < range.start || window.1 > range.end {
                return Err(malformed(format!(
                    "predicate {} window [{}, {}] outside [{}, {}]",
                    predicate.name(),
                    window.0,
                    window.1,
                    range.start,
                    range.end
                )));
            }
            let binding = PredicateBinding {
                id: BindingId(idx),
                action,
                predicate,
                window,
            };
            let (lo, hi) = binding.active_steps();
            if lo < 0 || hi >= signed(self.horizon) {
                return Err(malformed(format!(
                    "predicate {} is active over [{lo}, {hi}] beyond horizon {}",
                    binding.predicate.name(),
                    self.horizon
                )));
            }
            bindings.push(binding);
        }

        Ok(Plan {
            id: Uuid::new_v4(),
            horizon: self.horizon,
            params: self.params,
            names: self.names,
            actions: self.actions,
            bindings,
            layouts: self.layouts,
            trace: Vec::new(),
            reachable_memo: BTreeSet::new(),
        })
    }
}

fn signed(step: usize) -> isize {
    isize::try_from(step).unwrap_or(isize::MAX)
}

fn pose_attrs() -> Vec<(String, usize)> {
    vec![(VALUE.into(), 3), (ROTATION.into(), 3)]
}
