use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::errors::{PromptPmError, Result};
use crate::output::emit;

fn default_module_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "prompt-module".to_string())
}

fn render_promptpm_yaml(name: &str, version: &str) -> String {
    format!(
        "module:\n  name: {name}\n  version: \"{version}\"\n  description: Describe this module\nprompt:\n  template: template.prompt\n  placeholders:\n    - document\ninterface:\n  intent: Describe module intent.\n  inputs:\n    - name: document\n      type: technical_document\n      description: Source document text\n      required: true\n  outputs:\n    - type: structured_summary\n      description: Concise technical summary\ntests:\n  - name: basic\n    inputs:\n      document: example\n    assertions:\n      - contains: \"Summary\"\n",
        name = name,
        version = version,
    )
}

fn init_module(module_path: &Path, module_name: Option<&str>, module_version: &str) -> Result<(String, String)> {
    let effective_name = module_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_module_name(module_path));
    if effective_name.is_empty() {
        return Err(PromptPmError::validation("module name must be a non-empty string"));
    }

    let module_version = module_version.trim();
    if module_version.is_empty() {
        return Err(PromptPmError::validation("module version must be a non-empty string"));
    }

    let promptpm_yaml = module_path.join("promptpm.yaml");
    let template_prompt = module_path.join("template.prompt");
    let tests_dir = module_path.join("tests");

    let mut conflicts = Vec::new();
    for target in [&promptpm_yaml, &template_prompt, &tests_dir] {
        if target.exists() {
            conflicts.push(
                target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        }
    }
    if !conflicts.is_empty() {
        conflicts.sort();
        return Err(PromptPmError::validation(format!(
            "Initialization would overwrite existing paths: {}",
            conflicts.join(", ")
        )));
    }

    fs::write(&promptpm_yaml, render_promptpm_yaml(&effective_name, module_version))?;
    fs::write(&template_prompt, "Summary:\n{{document}}\n")?;
    fs::create_dir(&tests_dir)?;

    Ok((effective_name, module_version.to_string()))
}

pub fn run(ctx: CommandContext, module_name: Option<&str>, module_version: &str) -> i32 {
    let module_path: PathBuf = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            let payload = json!({
                "ok": false,
                "operation": "init",
                "error": {
                    "code": "INTERNAL_ERROR",
                    "message": err.to_string(),
                    "hint": "Retry the command and inspect traceback in debug logs.",
                    "path": "",
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            return commands::INTERNAL_EXIT_CODE;
        }
    };

    match init_module(&module_path, module_name, module_version) {
        Ok((name, version)) => {
            let payload = json!({
                "ok": true,
                "operation": "init",
                "data": {
                    "path": module_path.display().to_string(),
                    "created": ["promptpm.yaml", "template.prompt", "tests/"],
                    "module": {
                        "name": name,
                        "version": version,
                    },
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let payload = json!({
                "ok": false,
                "operation": "init",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": "Run `promptpm init` in an empty module directory or remove conflicting files.",
                    "path": module_path.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
