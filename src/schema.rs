//! Module schema loading and cross-field validation.
//!
//! Two on-disk formats (`promptpm.yaml`, `promptpm.toml`) collapse to the
//! same `serde_json::Value` document before validation; the validator
//! never branches on source format.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{PromptPmError, Result};

const YAML_FILENAME: &str = "promptpm.yaml";
const TOML_FILENAME: &str = "promptpm.toml";

/// In-memory record loaded from a module directory.
#[derive(Debug, Clone)]
pub struct PromptModule {
    pub raw: Value,
    pub source_path: PathBuf,
    pub module: ModuleMetadata,
    pub prompt: PromptBlock,
    pub interface: Interface,
    pub dependencies: Vec<DependencySpec>,
    pub tests: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PromptBlock {
    pub template: String,
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InterfaceInput {
    pub name: String,
    pub ty: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct InterfaceOutput {
    pub ty: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub intent: String,
    pub inputs: Vec<InterfaceInput>,
    pub outputs: Vec<InterfaceOutput>,
}

/// `{name, version_range}`, sorted canonically by `(name, version_range)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencySpec {
    pub name: String,
    pub version_range: String,
}

/// Load a module directory into its in-memory representation. Parsing
/// already rejects undeclared template placeholders (a property of the
/// template itself); `validate_prompt_module` covers the remaining
/// cross-field rules over the loaded structure.
pub fn load_prompt_module(path: &Path) -> Result<PromptModule> {
    let yaml_path = path.join(YAML_FILENAME);
    let toml_path = path.join(TOML_FILENAME);

    let (raw, source_path): (Value, PathBuf) = if yaml_path.is_file() {
        let content = fs::read_to_string(&yaml_path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|err| {
            PromptPmError::validation(format!("Failed to parse {}: {}", yaml_path.display(), err))
        })?;
        (yaml_value_to_json(value), yaml_path)
    } else if toml_path.is_file() {
        let content = fs::read_to_string(&toml_path)?;
        let value: toml::Value = content.parse().map_err(|err| {
            PromptPmError::validation(format!("Failed to parse {}: {}", toml_path.display(), err))
        })?;
        (toml_value_to_json(value), toml_path)
    } else {
        return Err(PromptPmError::validation(format!(
            "Missing {} or {} in {}",
            YAML_FILENAME,
            TOML_FILENAME,
            path.display()
        )));
    };

    if !raw.is_object() {
        return Err(PromptPmError::validation(
            "Module definition must be a mapping",
        ));
    }

    build_prompt_module(raw, source_path)
}

/// Validate a `PromptModule` against the schema and cross-field rules.
/// Loading already enforces static shape, so this mostly re-checks the
/// semantic rule that ties `prompt.placeholders` to `interface.inputs`.
pub fn validate_prompt_module(module: &PromptModule) -> Result<()> {
    if module.module.name.is_empty() {
        return Err(PromptPmError::validation("module.name must be a non-empty string"));
    }

    let declared_inputs: BTreeSet<&str> = module
        .interface
        .inputs
        .iter()
        .map(|input| input.name.as_str())
        .collect();

    let undeclared: BTreeSet<&str> = module
        .prompt
        .placeholders
        .iter()
        .map(|p| p.as_str())
        .filter(|p| !declared_inputs.contains(p))
        .collect();

    if !undeclared.is_empty() {
        let names: Vec<&str> = undeclared.into_iter().collect();
        return Err(PromptPmError::validation(format!(
            "Undeclared placeholders used in template: {}",
            names.join(", ")
        )));
    }

    Ok(())
}

fn build_prompt_module(raw: Value, source_path: PathBuf) -> Result<PromptModule> {
    let obj = raw.as_object().expect("caller verified object");

    let required_top_level = ["module", "prompt", "interface"];
    let missing: Vec<&str> = required_top_level
        .iter()
        .filter(|key| !obj.contains_key(**key))
        .copied()
        .collect();
    if !missing.is_empty() {
        let mut sorted = missing.clone();
        sorted.sort_unstable();
        return Err(PromptPmError::validation(format!(
            "Missing required top-level fields: {}",
            sorted.join(", ")
        )));
    }

    let module_value = obj.get("module").unwrap();
    let module = parse_module_metadata(module_value)?;

    let interface_value = obj.get("interface").unwrap();
    let interface = parse_interface(interface_value)?;

    let prompt_value = obj.get("prompt").unwrap();
    let prompt = parse_prompt_block(prompt_value, &interface)?;

    let dependencies = match obj.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => parse_dependencies(value, &source_path.display().to_string())?,
    };

    let tests = match obj.get("tests") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err(PromptPmError::validation("tests must be a list")),
    };

    Ok(PromptModule {
        raw,
        source_path,
        module,
        prompt,
        interface,
        dependencies,
        tests,
    })
}

fn parse_module_metadata(value: &Value) -> Result<ModuleMetadata> {
    let obj = value
        .as_object()
        .ok_or_else(|| PromptPmError::validation("module must be a mapping"))?;

    for field in ["name", "version", "description"] {
        if !obj.contains_key(field) {
            return Err(PromptPmError::validation(format!("module.{} is required", field)));
        }
    }

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PromptPmError::validation("module.name must be a non-empty string"))?
        .to_string();

    let version = obj
        .get("version")
        .and_then(value_as_string)
        .ok_or_else(|| PromptPmError::validation("module.version must be a string"))?;

    let description = obj
        .get("description")
        .and_then(value_as_string)
        .unwrap_or_default();

    Ok(ModuleMetadata {
        name,
        version,
        description,
    })
}

fn parse_prompt_block(value: &Value, interface: &Interface) -> Result<PromptBlock> {
    let obj = value
        .as_object()
        .ok_or_else(|| PromptPmError::validation("prompt must be a mapping"))?;

    let template = obj
        .get("template")
        .and_then(Value::as_str)
        .ok_or_else(|| PromptPmError::validation("prompt.template is required"))?
        .to_string();

    let placeholders_value = obj
        .get("placeholders")
        .ok_or_else(|| PromptPmError::validation("prompt.placeholders must be a list"))?;
    let placeholders_array = placeholders_value
        .as_array()
        .ok_or_else(|| PromptPmError::validation("prompt.placeholders must be a list"))?;

    let mut placeholders = Vec::with_capacity(placeholders_array.len());
    for item in placeholders_array {
        let name = item
            .as_str()
            .ok_or_else(|| PromptPmError::validation("prompt.placeholders entries must be strings"))?;
        placeholders.push(name.to_string());
    }

    let declared_inputs: BTreeSet<&str> = interface
        .inputs
        .iter()
        .map(|input| input.name.as_str())
        .collect();
    let undeclared: BTreeSet<&str> = placeholders
        .iter()
        .map(|p| p.as_str())
        .filter(|p| !declared_inputs.contains(p))
        .collect();
    if !undeclared.is_empty() {
        let names: Vec<&str> = undeclared.into_iter().collect();
        return Err(PromptPmError::validation(format!(
            "Undeclared placeholders used in template: {}",
            names.join(", ")
        )));
    }

    Ok(PromptBlock {
        template,
        placeholders,
    })
}

fn parse_interface(value: &Value) -> Result<Interface> {
    let obj = value
        .as_object()
        .ok_or_else(|| PromptPmError::validation("interface must be a mapping"))?;

    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| PromptPmError::validation("interface.intent is required"))?
        .to_string();

    let inputs_value = obj
        .get("inputs")
        .ok_or_else(|| PromptPmError::validation("interface.inputs must be a list"))?;
    let inputs_array = inputs_value
        .as_array()
        .ok_or_else(|| PromptPmError::validation("interface.inputs must be a list"))?;
    let mut inputs = Vec::with_capacity(inputs_array.len());
    for item in inputs_array {
        inputs.push(parse_interface_input(item)?);
    }

    let outputs_value = obj
        .get("outputs")
        .ok_or_else(|| PromptPmError::validation("interface.outputs must be a list"))?;
    let outputs_array = outputs_value
        .as_array()
        .ok_or_else(|| PromptPmError::validation("interface.outputs must be a list"))?;
    let mut outputs = Vec::with_capacity(outputs_array.len());
    for item in outputs_array {
        outputs.push(parse_interface_output(item)?);
    }

    Ok(Interface {
        intent,
        inputs,
        outputs,
    })
}

fn parse_interface_input(value: &Value) -> Result<InterfaceInput> {
    let obj = value
        .as_object()
        .ok_or_else(|| PromptPmError::validation("interface.inputs entries must be mappings"))?;

    for field in ["name", "type", "description", "required"] {
        if !obj.contains_key(field) {
            return Err(PromptPmError::validation(format!(
                "interface.inputs.{} is required",
                field
            )));
        }
    }

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| PromptPmError::validation("interface.inputs.name must be a string"))?
        .to_string();
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PromptPmError::validation("interface.inputs.type must be a string"))?
        .to_string();
    let description = obj
        .get("description")
        .and_then(value_as_string)
        .unwrap_or_default();
    let required = obj
        .get("required")
        .and_then(Value::as_bool)
        .ok_or_else(|| PromptPmError::validation("interface.inputs.required must be a boolean"))?;

    Ok(InterfaceInput {
        name,
        ty,
        description,
        required,
    })
}

fn parse_interface_output(value: &Value) -> Result<InterfaceOutput> {
    let obj = value
        .as_object()
        .ok_or_else(|| PromptPmError::validation("interface.outputs entries must be mappings"))?;

    for field in ["type", "description"] {
        if !obj.contains_key(field) {
            return Err(PromptPmError::validation(format!(
                "interface.outputs.{} is required",
                field
            )));
        }
    }

    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PromptPmError::validation("interface.outputs.type must be a string"))?
        .to_string();
    let description = obj
        .get("description")
        .and_then(value_as_string)
        .unwrap_or_default();

    Ok(InterfaceOutput { ty, description })
}

fn parse_dependencies(value: &Value, owner: &str) -> Result<Vec<DependencySpec>> {
    let array = value
        .as_array()
        .ok_or_else(|| PromptPmError::dependency(format!("dependencies must be a list in {}", owner)))?;

    let mut parsed = Vec::with_capacity(array.len());
    for (index, entry) in array.iter().enumerate() {
        let obj = entry.as_object().ok_or_else(|| {
            PromptPmError::dependency(format!(
                "dependency entry at index {} must be a mapping in {}",
                index, owner
            ))
        })?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PromptPmError::dependency(format!(
                    "dependency.name is required in {} at index {}",
                    owner, index
                ))
            })?
            .to_string();

        let version_range = obj
            .get("version")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PromptPmError::dependency(format!(
                    "dependency.version is required in {} at index {}",
                    owner, index
                ))
            })?
            .to_string();

        parsed.push(DependencySpec { name, version_range });
    }

    parsed.sort();
    Ok(parsed)
}

fn value_as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn yaml_value_to_json(value: serde_yaml::Value) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn toml_value_to_json(value: toml::Value) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_module(dir: &Path, yaml: &str) {
        fs::write(dir.join(YAML_FILENAME), yaml).unwrap();
    }

    #[test]
    fn loads_minimal_valid_module() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: A demo module
prompt:
  template: template.prompt
  placeholders: [document]
interface:
  intent: Summarize
  inputs:
    - name: document
      type: text
      description: Source text
      required: true
  outputs:
    - type: text
      description: Summary
"#,
        );

        let module = load_prompt_module(dir.path()).unwrap();
        validate_prompt_module(&module).unwrap();
        assert_eq!(module.module.name, "demo");
        assert_eq!(module.prompt.placeholders, vec!["document".to_string()]);
    }

    #[test]
    fn rejects_undeclared_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: A demo module
prompt:
  template: template.prompt
  placeholders: [undeclared_input]
interface:
  intent: Summarize
  inputs:
    - name: document
      type: text
      description: Source text
      required: true
  outputs:
    - type: text
      description: Summary
"#,
        );

        let err = load_prompt_module(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Undeclared placeholders used in template"));
    }

    #[test]
    fn missing_manifest_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_prompt_module(dir.path()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn dependencies_sorted_canonically() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            r#"
module:
  name: demo
  version: "1.0.0"
  description: A demo module
prompt:
  template: template.prompt
  placeholders: []
interface:
  intent: Summarize
  inputs: []
  outputs: []
dependencies:
  - name: zeta
    version: ">=1.0.0"
  - name: alpha
    version: "^2.0.0"
  - name: alpha
    version: "^1.0.0"
"#,
        );

        let module = load_prompt_module(dir.path()).unwrap();
        let names: Vec<(&str, &str)> = module
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.version_range.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![("alpha", "^1.0.0"), ("alpha", "^2.0.0"), ("zeta", ">=1.0.0")]
        );
    }
}
