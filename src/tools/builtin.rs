//! A couple of illustrative built-in tools exercised by the extractor and
//! dispatcher tests. This system's tool catalog is deployment-specific; these
//! exist to give the plumbing around them something concrete to run against.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::providers::ToolDefinition;

use super::{Tool, ToolError, ToolObservation};

/// Returns the current UTC time. Idempotent and read-only, so it's
/// allow-listed past the duplicate-call guard (§4.5).
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "current_time".to_owned(),
            description: "Returns the current UTC time in RFC 3339 format.".to_owned(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
        }
    }

    async fn call(&self, _args: &Value) -> Result<ToolObservation, ToolError> {
        Ok(ToolObservation::text(Utc::now().to_rfc3339()))
    }
}

/// Evaluates a basic arithmetic expression over `+`, `-`, `*`, `/` with
/// left-to-right precedence (no operator precedence, no parentheses) —
/// enough to demonstrate a tool whose repeated identical calls are
/// legitimately suspicious, unlike [`CurrentTimeTool`].
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculator".to_owned(),
            description: "Evaluates a simple arithmetic expression, e.g. \"2 + 3 * 4\".".to_owned(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "expression": {"type": "string"},
                },
                "required": ["expression"],
                "additionalProperties": false,
            }),
        }
    }

    async fn call(&self, args: &Value) -> Result<ToolObservation, ToolError> {
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing \"expression\" string".to_owned()))?;

        let result = evaluate(expression)
            .map_err(|e| ToolError::ExecutionFailed(format!("could not evaluate \"{expression}\": {e}")))?;

        Ok(ToolObservation::text(result.to_string()))
    }
}

fn evaluate(expression: &str) -> Result<f64, String> {
    let mut tokens = expression.split_whitespace();
    let first = tokens.next().ok_or("empty expression")?;
    let mut acc: f64 = first.parse().map_err(|_| format!("not a number: {first}"))?;

    loop {
        let Some(op) = tokens.next() else { break };
        let operand_raw = tokens.next().ok_or("dangling operator")?;
        let operand: f64 = operand_raw.parse().map_err(|_| format!("not a number: {operand_raw}"))?;
        acc = match op {
            "+" => acc + operand,
            "-" => acc - operand,
            "*" => acc * operand,
            "/" => {
                if operand == 0.0 {
                    return Err("division by zero".to_owned());
                }
                acc / operand
            }
            other => return Err(format!("unsupported operator: {other}")),
        };
    }

    Ok(acc)
}
