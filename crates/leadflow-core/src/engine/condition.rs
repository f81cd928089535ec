//! Edge condition evaluation.
//!
//! Pure function of (edge, context): decides whether an edge fires.

use std::sync::Arc;

use leadflow_types::execution::ExecutionContext;
use leadflow_types::flow::{ConditionType, Edge};
use serde_json::Value;

use super::value::is_truthy;

/// Pluggable predicate for `custom` edges.
pub trait CustomCondition: Send + Sync {
    fn evaluate(&self, condition_value: Option<&Value>, ctx: &ExecutionContext) -> bool;
}

/// Default `custom` predicate: every custom edge fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CustomCondition for AcceptAll {
    fn evaluate(&self, _condition_value: Option<&Value>, _ctx: &ExecutionContext) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct ConditionEvaluator {
    custom: Arc<dyn CustomCondition>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self {
            custom: Arc::new(AcceptAll),
        }
    }

    /// Use `custom` for edges with `condition_type = custom`.
    pub fn with_custom<C: CustomCondition + 'static>(custom: C) -> Self {
        Self {
            custom: Arc::new(custom),
        }
    }

    /// Whether `edge` fires for `ctx`.
    ///
    /// `if_false` needs a non-null previous result: a node that produced
    /// nothing (a skipped action) fires neither conditional branch.
    pub fn fires(&self, edge: &Edge, ctx: &ExecutionContext) -> bool {
        let prev = &ctx.previous_node_result;
        match edge.condition_type {
            ConditionType::Always => true,
            ConditionType::IfTrue => is_truthy(prev),
            ConditionType::IfFalse => !prev.is_null() && !is_truthy(prev),
            ConditionType::Custom => self.custom.evaluate(edge.condition_value.as_ref(), ctx),
        }
    }
}
