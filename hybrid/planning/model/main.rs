//! Plan data model: parameters with arena-style attribute buffers, actions,
//! predicate bindings and the sampling trace.

/// Plan, actions, bindings and the plan builder.
pub mod plan;
/// Repair proposal records.
pub mod trace;
/// Attribute buffers with free masks.
pub mod trajectory;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::module::{PlanningError, Pose};

pub use plan::{Action, CellWrite, Operands, Plan, PlanBuilder, PlanSummary, PredicateBinding};
pub use trace::{SamplingTraceEntry, TraceSummary, FAILED_REWARD};
pub use trajectory::AttrBuffer;

/// Position attribute of poses, targets and objects.
pub const VALUE: &str = "value";
/// Rotation attribute of poses, targets and objects.
pub const ROTATION: &str = "rotation";

/// Plan operand: a time-invariant symbol or a per-step trajectory object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    type_name: String,
    symbol: bool,
    attrs: IndexMap<String, AttrBuffer>,
}

impl Parameter {
    /// Creates a parameter with one buffer per `(attr, dim)`; symbols get a single column.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        symbol: bool,
        horizon: usize,
        attrs: &[(String, usize)],
    ) -> Self {
        let cols = if symbol { 1 } else { horizon };
        Self {
            name: name.into(),
            type_name: type_name.into(),
            symbol,
            attrs: attrs
                .iter()
                .map(|(attr, dim)| (attr.clone(), AttrBuffer::new(*dim, cols)))
                .collect(),
        }
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter type (robot type for robots).
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// True for time-invariant symbols.
    #[must_use]
    pub const fn is_symbol(&self) -> bool {
        self.symbol
    }

    /// Column holding step `t`.
    #[must_use]
    pub const fn col(&self, t: usize) -> usize {
        if self.symbol {
            0
        } else {
            t
        }
    }

    /// Attribute names in declaration order.
    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Attribute buffer.
    pub fn attr(&self, attr: &str) -> Result<&AttrBuffer, PlanningError> {
        self.attrs
            .get(attr)
            .ok_or_else(|| PlanningError::UnknownAttribute {
                param: self.name.clone(),
                attr: attr.into(),
            })
    }

    /// Mutable attribute buffer.
    pub fn attr_mut(&mut self, attr: &str) -> Result<&mut AttrBuffer, PlanningError> {
        let name = &self.name;
        self.attrs
            .get_mut(attr)
            .ok_or_else(|| PlanningError::UnknownAttribute {
                param: name.clone(),
                attr: attr.into(),
            })
    }

    /// Iterates all buffers.
    pub fn buffers(&self) -> impl Iterator<Item = (&str, &AttrBuffer)> {
        self.attrs.iter().map(|(name, buffer)| (name.as_str(), buffer))
    }

    /// Iterates all buffers mutably.
    pub fn buffers_mut(&mut self) -> impl Iterator<Item = (&str, &mut AttrBuffer)> {
        self.attrs
            .iter_mut()
            .map(|(name, buffer)| (name.as_str(), buffer))
    }

    /// Values of an attribute at step `t`.
    pub fn values(&self, attr: &str, t: usize) -> Result<&[f64], PlanningError> {
        self.attr(attr)?.column(self.col(t))
    }

    /// Pose stored in the `value`/`rotation` attributes at step `t`.
    pub fn pose(&self, t: usize) -> Result<Pose, PlanningError> {
        Pose::from_slices(self.values(VALUE, t)?, self.values(ROTATION, t)?)
    }

    /// True when every attribute column at `t` is locked.
    pub fn is_fixed(&self, t: usize) -> Result<bool, PlanningError> {
        for buffer in self.attrs.values() {
            if !buffer.is_locked(self.col(t))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Total locked cells across attributes.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.attrs.values().map(AttrBuffer::locked_count).sum()
    }
}
