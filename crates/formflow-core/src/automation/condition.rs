//! JEXL condition evaluator for conditional automation steps.
//!
//! Wraps `jexl_eval::Evaluator` with a small set of string transforms and
//! builds the evaluation context from trigger data and the outcomes of the
//! steps that already ran in the same execution.
//!
//! Trigger data is always passed as context, never spliced into the
//! expression text.

use std::collections::BTreeMap;

use jexl_eval::error::EvaluationError;
use serde_json::{Value, json};
use uuid::Uuid;

use formflow_types::execution::StepExecutionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("condition evaluation failed: {0}")]
    EvalFailed(String),

    #[error("condition expression is empty")]
    Empty,

    #[error("invalid condition expression: {0}")]
    Syntax(String),

    #[error("invalid condition context: {0}")]
    InvalidContext(String),
}

/// Outcome of an earlier step, as seen by later conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorStepOutcome {
    pub status: StepExecutionStatus,
    pub status_code: Option<u16>,
}

/// Data a condition is evaluated against.
///
/// Serialises to:
/// ```json
/// {
///   "trigger": <trigger data>,
///   "steps": { "<step_order>": { "status": "completed", "success": true, "statusCode": 200 } },
///   "execution": { "id": "...", "automationId": "..." }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ConditionContext {
    execution_id: Uuid,
    automation_id: Uuid,
    trigger: Value,
    steps: BTreeMap<u32, PriorStepOutcome>,
}

impl ConditionContext {
    pub fn new(execution_id: Uuid, automation_id: Uuid, trigger: Value) -> Self {
        Self {
            execution_id,
            automation_id,
            trigger,
            steps: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, step_order: u32, outcome: PriorStepOutcome) {
        self.steps.insert(step_order, outcome);
    }

    pub fn to_json(&self) -> Value {
        let steps: serde_json::Map<String, Value> = self
            .steps
            .iter()
            .map(|(order, outcome)| {
                (
                    order.to_string(),
                    json!({
                        "status": outcome.status.as_str(),
                        "success": outcome.status == StepExecutionStatus::Completed,
                        "statusCode": outcome.status_code,
                    }),
                )
            })
            .collect();

        json!({
            "trigger": self.trigger,
            "steps": steps,
            "execution": {
                "id": self.execution_id.to_string(),
                "automationId": self.automation_id.to_string(),
            }
        })
    }
}

/// JEXL evaluator with string transforms pre-registered.
///
/// Examples: `trigger.plan == 'pro'`, `steps['1'].success`,
/// `trigger.email|endsWith('@example.com')`.
pub struct ConditionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().cloned().unwrap_or(Value::Null);
                let needle = args.get(1).cloned().unwrap_or(Value::Null);
                let found = match (&subject, &needle) {
                    (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
                    (Value::Array(items), n) => items.contains(n),
                    _ => false,
                };
                Ok(json!(found))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!truthy(&val)))
            });

        Self { evaluator }
    }

    /// Evaluate `expression` and coerce the result with JavaScript-like
    /// truthiness. `context` must be a JSON object.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ConditionError> {
        if expression.trim().is_empty() {
            return Err(ConditionError::Empty);
        }
        if !context.is_object() {
            return Err(ConditionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let result = self
            .evaluator
            .eval_in_context(expression, context)
            .map_err(|e| ConditionError::EvalFailed(e.to_string()))?;

        Ok(truthy(&result))
    }

    pub fn evaluate(&self, expression: &str, ctx: &ConditionContext) -> Result<bool, ConditionError> {
        self.evaluate_bool(expression, &ctx.to_json())
    }

    /// Reject expressions that can never evaluate: parse errors and unknown
    /// transforms. Errors that depend on the data (an undefined identifier,
    /// a bad operand) only surface when a run evaluates the condition.
    pub fn check_syntax(&self, expression: &str) -> Result<(), ConditionError> {
        if expression.trim().is_empty() {
            return Err(ConditionError::Empty);
        }
        let skeleton = json!({ "trigger": {}, "steps": {}, "execution": {} });
        match self.evaluator.eval_in_context(expression, &skeleton) {
            Err(EvaluationError::ParseError(e)) => Err(ConditionError::Syntax(e.to_string())),
            Err(EvaluationError::UnknownTransform(name)) => {
                Err(ConditionError::Syntax(format!("unknown transform '{name}'")))
            }
            _ => Ok(()),
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
