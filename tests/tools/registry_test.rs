//! Tests for `src/tools/registry.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use wintermute::providers::ToolDefinition;
use wintermute::tools::registry::ToolRegistry;
use wintermute::tools::{Tool, ToolError, ToolObservation};

struct NamedTool {
    name: &'static str,
    reply: &'static str,
}

#[async_trait]
impl Tool for NamedTool {
    fn name(&self) -> &str {
        self.name
    }
    fn definition(&self) -> ToolDefinition {
        ToolDefinition { name: self.name.to_owned(), description: String::new(), input_schema: json!({}) }
    }
    async fn call(&self, _args: &Value) -> Result<ToolObservation, ToolError> {
        Ok(ToolObservation::text(self.reply))
    }
}

#[test]
fn registering_a_second_tool_under_the_same_name_replaces_the_first() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(NamedTool { name: "search", reply: "v1" }));
    registry.register(Arc::new(NamedTool { name: "search", reply: "v2" }));

    assert_eq!(registry.len(), 1);
    let tool = registry.get("search").expect("should still be registered");
    assert_eq!(tool.name(), "search");
}

#[test]
fn empty_registry_reports_is_empty() {
    let registry = ToolRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.names().is_empty());
    assert!(registry.definitions().is_empty());
}

#[test]
fn definitions_sort_lexicographically_regardless_of_registration_order() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(NamedTool { name: "zeta", reply: "z" }));
    registry.register(Arc::new(NamedTool { name: "alpha", reply: "a" }));
    registry.register(Arc::new(NamedTool { name: "mid", reply: "m" }));

    let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}
