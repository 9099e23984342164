//! Tests for `src/tools/extractor.rs`.

use wintermute::tools::extractor::extract_tool_call;

fn known(names: &'static [&'static str]) -> impl Fn(&str) -> bool {
    move |n: &str| names.contains(&n)
}

#[test]
fn three_sibling_candidates_prefer_the_textually_last_one() {
    let raw = r#"
        first attempt: {"tool": "a", "args": {}}
        second thought: {"tool": "b", "args": {}}
        final call: {"tool": "c", "args": {}}
    "#;
    let call = extract_tool_call(raw, &known(&[])).expect("should extract");
    assert_eq!(call.tool, "c");
}

#[test]
fn a_fenced_block_is_preferred_even_when_it_is_not_the_last_candidate_in_the_text() {
    let raw = "```json\n{\"tool\": \"fenced\", \"args\": {}}\n```\nthen some trailing prose with {\"tool\": \"decoy\"}";
    let call = extract_tool_call(raw, &known(&[])).expect("should extract");
    assert_eq!(call.tool, "fenced");
}

#[test]
fn function_arguments_schema_falls_back_to_a_string_when_arguments_are_not_valid_json() {
    let raw = r#"{"function": "search", "arguments": "not valid json"}"#;
    let call = extract_tool_call(raw, &known(&[])).expect("should extract");
    assert_eq!(call.args, serde_json::Value::String("not valid json".to_owned()));
}

#[test]
fn whitespace_only_text_yields_no_candidate() {
    assert!(extract_tool_call("   \n\t  ", &known(&[])).is_none());
}
