//! Tests for `src/tools/builtin.rs`.

use serde_json::json;
use wintermute::tools::builtin::{CalculatorTool, CurrentTimeTool};
use wintermute::tools::{Tool, ToolError};

#[tokio::test]
async fn current_time_definition_advertises_no_required_input() {
    let definition = CurrentTimeTool.definition();
    assert_eq!(definition.name, "current_time");
    assert_eq!(definition.input_schema["additionalProperties"], false);
}

#[tokio::test]
async fn calculator_subtraction_and_division_chain_left_to_right() {
    let observation = CalculatorTool
        .call(&json!({"expression": "10 - 4 / 2"}))
        .await
        .expect("should succeed");
    // Left-to-right, no operator precedence: (10 - 4) / 2 = 3.
    assert_eq!(observation.text_summary(), "3");
}

#[tokio::test]
async fn calculator_rejects_an_unsupported_operator() {
    let result = CalculatorTool.call(&json!({"expression": "2 ^ 3"})).await;
    assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
}

#[tokio::test]
async fn calculator_rejects_a_non_numeric_operand() {
    let result = CalculatorTool.call(&json!({"expression": "2 + three"})).await;
    assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
}
