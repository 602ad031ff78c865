//! Deterministic, hermetic prompt module test runner.
//!
//! No network calls and no LLM invocation: tests render the template
//! against declared inputs and assert on the rendered text directly.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::errors::{PromptPmError, Result};
use crate::schema::{load_prompt_module, validate_prompt_module, PromptBlock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub test_name: String,
    pub assertion_index: usize,
    pub assertion_type: String,
    pub message: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseResult {
    pub name: String,
    pub passed: bool,
    pub failures: Vec<AssertionFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestCaseResult>,
}

struct ParsedTestCase {
    name: String,
    inputs: Vec<(String, Value)>,
    assertions: Vec<Value>,
    original_index: usize,
}

pub fn run_prompt_module_tests(module_path: &Path) -> Result<TestRunResult> {
    let module = load_prompt_module(module_path)?;
    validate_prompt_module(&module)?;

    let parsed_tests = parse_tests(&module.tests)?;
    let template = load_template(&module.source_path, &module.prompt)?;
    let module_root = module
        .source_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());

    let mut case_results = Vec::with_capacity(parsed_tests.len());
    for test_case in &parsed_tests {
        let rendered_output = render_template(&template, &test_case.inputs, &module_root);
        let failures = evaluate_assertions(&test_case.name, &rendered_output, &test_case.assertions)?;
        case_results.push(TestCaseResult {
            name: test_case.name.clone(),
            passed: failures.is_empty(),
            failures,
        });
    }

    let total = case_results.len();
    let passed = case_results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    Ok(TestRunResult {
        total,
        passed,
        failed,
        results: case_results,
    })
}

fn load_template(source_path: &Path, prompt_block: &PromptBlock) -> Result<String> {
    if prompt_block.template.is_empty() {
        return Err(PromptPmError::validation("prompt.template must be a non-empty string"));
    }

    let module_root = source_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    let template_path = module_root.join(&prompt_block.template);
    if !template_path.is_file() {
        return Err(PromptPmError::validation(format!(
            "Template file not found: {}",
            template_path.display()
        )));
    }

    Ok(fs::read_to_string(template_path)?)
}

fn parse_tests(raw_tests: &[Value]) -> Result<Vec<ParsedTestCase>> {
    let mut parsed = Vec::with_capacity(raw_tests.len());

    for (index, test_case) in raw_tests.iter().enumerate() {
        let obj = test_case
            .as_object()
            .ok_or_else(|| PromptPmError::validation(format!("tests[{}] must be a mapping", index)))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PromptPmError::validation(format!("tests[{}].name must be a non-empty string", index))
            })?
            .to_string();

        let inputs: Vec<(String, Value)> = match obj.get("inputs") {
            None => Vec::new(),
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Some(_) => {
                return Err(PromptPmError::validation(format!(
                    "tests[{}].inputs must be a mapping",
                    index
                )))
            }
        };

        let assertions_array = obj
            .get("assertions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                PromptPmError::validation(format!("tests[{}].assertions must be a list", index))
            })?;

        let mut normalized_assertions = Vec::with_capacity(assertions_array.len());
        for (assertion_index, assertion) in assertions_array.iter().enumerate() {
            let assertion_obj = assertion.as_object().ok_or_else(|| {
                PromptPmError::validation(format!(
                    "tests[{}].assertions[{}] must be a mapping",
                    index, assertion_index
                ))
            })?;
            if assertion_obj.len() != 1 {
                return Err(PromptPmError::validation(format!(
                    "tests[{}].assertions[{}] must define exactly one assertion",
                    index, assertion_index
                )));
            }
            normalized_assertions.push(assertion.clone());
        }

        parsed.push(ParsedTestCase {
            name,
            inputs,
            assertions: normalized_assertions,
            original_index: index,
        });
    }

    parsed.sort_by(|a, b| (a.name.as_str(), a.original_index).cmp(&(b.name.as_str(), b.original_index)));
    Ok(parsed)
}

fn render_template(template: &str, inputs: &[(String, Value)], module_root: &Path) -> String {
    let mut sorted_inputs: Vec<&(String, Value)> = inputs.iter().collect();
    sorted_inputs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut rendered = template.to_string();
    for (key, value) in sorted_inputs {
        let resolved = resolve_input_value(value, module_root);
        let text = stringify_value(&resolved);
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), &text);
        rendered = rendered.replace(&format!("{{{}}}", key), &text);
    }
    rendered
}

fn resolve_input_value(value: &Value, module_root: &Path) -> Value {
    if let Value::String(text) = value {
        let candidate_path = module_root.join(text);
        if candidate_path.is_file() {
            if let Ok(contents) = fs::read_to_string(&candidate_path) {
                return Value::String(contents);
            }
        }
    }
    value.clone()
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => canonical_json(other),
    }
}

/// Compact, key-sorted JSON so non-string inputs stringify deterministically.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", body)
        }
        other => serde_json::to_string(other).expect("scalar JSON value always serializes"),
    }
}

fn evaluate_assertions(test_name: &str, output_text: &str, assertions: &[Value]) -> Result<Vec<AssertionFailure>> {
    let mut failures = Vec::new();

    for (index, assertion) in assertions.iter().enumerate() {
        let obj = assertion.as_object().expect("assertions pre-validated as mappings");
        let (assertion_type, assertion_value) = obj.iter().next().expect("assertions pre-validated as singletons");

        match assertion_type.as_str() {
            "contains" => {
                let expected = ensure_string_assertion(assertion_type, assertion_value, test_name, index)?;
                if !output_text.contains(expected) {
                    failures.push(failure(
                        test_name,
                        index,
                        assertion_type,
                        format!("Expected output to contain {:?}", expected),
                        expected.to_string(),
                        preview(output_text),
                    ));
                }
            }
            "excludes" => {
                let expected = ensure_string_assertion(assertion_type, assertion_value, test_name, index)?;
                if output_text.contains(expected) {
                    failures.push(failure(
                        test_name,
                        index,
                        assertion_type,
                        format!("Expected output to exclude {:?}", expected),
                        expected.to_string(),
                        preview(output_text),
                    ));
                }
            }
            "max_length" => {
                let limit = ensure_non_negative_int_assertion(assertion_type, assertion_value, test_name, index)?;
                let actual_length = output_text.chars().count() as i64;
                if actual_length > limit {
                    failures.push(failure(
                        test_name,
                        index,
                        assertion_type,
                        format!("Expected output length <= {}, got {}", limit, actual_length),
                        limit.to_string(),
                        actual_length.to_string(),
                    ));
                }
            }
            "structure" => {
                if let Some(structure_failure) =
                    evaluate_structure_assertion(test_name, index, output_text, assertion_value)?
                {
                    failures.push(structure_failure);
                }
            }
            other => {
                return Err(PromptPmError::validation(format!(
                    "Unsupported assertion type in test {:?} at index {}: {:?}",
                    test_name, index, other
                )))
            }
        }
    }

    Ok(failures)
}

fn evaluate_structure_assertion(
    test_name: &str,
    assertion_index: usize,
    output_text: &str,
    assertion_value: &Value,
) -> Result<Option<AssertionFailure>> {
    let (expected_type, required_keys) = match assertion_value {
        Value::String(text) => (text.clone(), Vec::new()),
        Value::Object(obj) => {
            let expected_type = match obj.get("type") {
                None => "json_object".to_string(),
                Some(Value::String(text)) => text.clone(),
                Some(_) => {
                    return Err(PromptPmError::validation(format!(
                        "structure assertion type must be a string in test {:?} at index {}",
                        test_name, assertion_index
                    )))
                }
            };

            let mut required_keys = Vec::new();
            match obj.get("required_keys") {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for key in items {
                        match key.as_str() {
                            Some(text) if !text.is_empty() => required_keys.push(text.to_string()),
                            _ => {
                                return Err(PromptPmError::validation(format!(
                                    "structure.required_keys entries must be non-empty strings in test {:?} at index {}",
                                    test_name, assertion_index
                                )))
                            }
                        }
                    }
                }
                Some(_) => {
                    return Err(PromptPmError::validation(format!(
                        "structure.required_keys must be a list in test {:?} at index {}",
                        test_name, assertion_index
                    )))
                }
            }
            (expected_type, required_keys)
        }
        _ => {
            return Err(PromptPmError::validation(format!(
                "structure assertion must be a string or mapping in test {:?} at index {}",
                test_name, assertion_index
            )))
        }
    };

    if expected_type != "json_object" && expected_type != "json_array" {
        return Err(PromptPmError::validation(format!(
            "Unsupported structure type in test {:?} at index {}: {:?}",
            test_name, assertion_index, expected_type
        )));
    }

    let parsed_output: Value = match serde_json::from_str(output_text) {
        Ok(value) => value,
        Err(_) => {
            return Ok(Some(failure(
                test_name,
                assertion_index,
                "structure",
                "Expected valid JSON output".to_string(),
                expected_type,
                preview(output_text),
            )))
        }
    };

    if expected_type == "json_object" {
        let object = match parsed_output.as_object() {
            Some(object) => object,
            None => {
                return Ok(Some(failure(
                    test_name,
                    assertion_index,
                    "structure",
                    "Expected JSON object output".to_string(),
                    "object".to_string(),
                    json_type_name(&parsed_output).to_string(),
                )))
            }
        };

        if !required_keys.is_empty() {
            let missing: Vec<&String> = required_keys.iter().filter(|k| !object.contains_key(*k)).collect();
            if !missing.is_empty() {
                let mut present: Vec<&str> = object.keys().map(String::as_str).collect();
                present.sort_unstable();
                return Ok(Some(failure(
                    test_name,
                    assertion_index,
                    "structure",
                    format!(
                        "Missing required JSON keys: {}",
                        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                    serde_json::to_string(&required_keys).expect("string vec always serializes"),
                    serde_json::to_string(&present).expect("string vec always serializes"),
                )));
            }
        }
    }

    if expected_type == "json_array" && !parsed_output.is_array() {
        return Ok(Some(failure(
            test_name,
            assertion_index,
            "structure",
            "Expected JSON array output".to_string(),
            "array".to_string(),
            json_type_name(&parsed_output).to_string(),
        )));
    }

    Ok(None)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn ensure_string_assertion<'a>(
    assertion_type: &str,
    assertion_value: &'a Value,
    test_name: &str,
    assertion_index: usize,
) -> Result<&'a str> {
    assertion_value.as_str().ok_or_else(|| {
        PromptPmError::validation(format!(
            "{} assertion must be a string in test {:?} at index {}",
            assertion_type, test_name, assertion_index
        ))
    })
}

fn ensure_non_negative_int_assertion(
    assertion_type: &str,
    assertion_value: &Value,
    test_name: &str,
    assertion_index: usize,
) -> Result<i64> {
    match assertion_value.as_i64() {
        Some(value) if value >= 0 => Ok(value),
        _ => Err(PromptPmError::validation(format!(
            "{} assertion must be a non-negative integer in test {:?} at index {}",
            assertion_type, test_name, assertion_index
        ))),
    }
}

fn failure(
    test_name: &str,
    assertion_index: usize,
    assertion_type: &str,
    message: String,
    expected: String,
    actual: String,
) -> AssertionFailure {
    AssertionFailure {
        test_name: test_name.to_string(),
        assertion_index,
        assertion_type: assertion_type.to_string(),
        message,
        expected,
        actual,
    }
}

fn preview(value: &str) -> String {
    const LIMIT: usize = 120;
    let normalized = value.replace('\n', "\\n");
    let char_count = normalized.chars().count();
    if char_count <= LIMIT {
        normalized
    } else {
        let truncated: String = normalized.chars().take(LIMIT).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_module(dir: &Path, yaml: &str, template: &str) {
        fs::write(dir.join("promptpm.yaml"), yaml).unwrap();
        fs::write(dir.join("template.prompt"), template).unwrap();
    }

    #[test]
    fn passes_contains_and_max_length_assertions() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: [document]
interface:
  intent: x
  inputs:
    - name: document
      type: text
      description: d
      required: true
  outputs: []
tests:
  - name: basic
    inputs:
      document: hello world
    assertions:
      - contains: "hello"
      - max_length: 40
"#,
            "Summarize: {{document}}",
        );

        let result = run_prompt_module_tests(dir.path()).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);
    }

    #[test]
    fn reports_failing_excludes_assertion() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: [document]
interface:
  intent: x
  inputs:
    - name: document
      type: text
      description: d
      required: true
  outputs: []
tests:
  - name: basic
    inputs:
      document: forbidden
    assertions:
      - excludes: "forbidden"
"#,
            "Summarize: {{document}}",
        );

        let result = run_prompt_module_tests(dir.path()).unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(result.results[0].failures[0].assertion_type, "excludes");
    }

    #[test]
    fn structure_assertion_checks_required_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: []
interface:
  intent: x
  inputs: []
  outputs: []
tests:
  - name: structured
    inputs: {}
    assertions:
      - structure:
          type: json_object
          required_keys: [summary]
"#,
            r#"{"summary": "ok"}"#,
        );

        let result = run_prompt_module_tests(dir.path()).unwrap();
        assert_eq!(result.passed, 1);
    }

    #[test]
    fn tests_are_sorted_by_name_then_original_index() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: []
interface:
  intent: x
  inputs: []
  outputs: []
tests:
  - name: zeta
    inputs: {}
    assertions: []
  - name: alpha
    inputs: {}
    assertions: []
"#,
            "static",
        );

        let result = run_prompt_module_tests(dir.path()).unwrap();
        let names: Vec<&str> = result.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn file_backed_input_is_read_and_substituted() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: d
prompt:
  template: template.prompt
  placeholders: [document]
interface:
  intent: x
  inputs:
    - name: document
      type: text
      description: d
      required: true
  outputs: []
tests:
  - name: file_input
    inputs:
      document: fixture.txt
    assertions:
      - contains: "fixture contents"
"#,
            "{{document}}",
        );
        fs::write(dir.path().join("fixture.txt"), "fixture contents").unwrap();

        let result = run_prompt_module_tests(dir.path()).unwrap();
        assert_eq!(result.passed, 1);
    }
}
