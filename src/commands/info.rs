use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::errors::PromptPmError;
use crate::output::emit;
use crate::registry::{InstalledModule, LocalRegistry};
use crate::schema::{load_prompt_module, validate_prompt_module};

fn serialize_module_info(installed: &InstalledModule) -> Result<serde_json::Value, PromptPmError> {
    let loaded = load_prompt_module(&installed.path)?;
    validate_prompt_module(&loaded)?;

    let inputs: Vec<serde_json::Value> = loaded
        .interface
        .inputs
        .iter()
        .map(|input| {
            json!({
                "name": input.name,
                "type": input.ty,
                "description": input.description,
                "required": input.required,
            })
        })
        .collect();
    let outputs: Vec<serde_json::Value> = loaded
        .interface
        .outputs
        .iter()
        .map(|output| {
            json!({
                "type": output.ty,
                "description": output.description,
            })
        })
        .collect();

    Ok(json!({
        "name": installed.name,
        "version": installed.version,
        "source": installed.path.display().to_string(),
        "metadata": {
            "name": loaded.module.name,
            "version": loaded.module.version,
            "description": loaded.module.description,
        },
        "interface": {
            "intent": loaded.interface.intent,
            "inputs": inputs,
            "outputs": outputs,
        },
    }))
}

pub fn run(ctx: CommandContext, module_name: &str, registry_path: &Path) -> i32 {
    let outcome = (|| {
        let registry_path = commands::ensure_local_registry_path(registry_path)?;
        let registry = LocalRegistry::new(&registry_path)?;
        let installed_versions = registry.list_by_name(module_name)?;
        if installed_versions.is_empty() {
            return Err(PromptPmError::dependency(format!("Module not found: {}", module_name)));
        }

        let mut versions = Vec::with_capacity(installed_versions.len());
        for item in &installed_versions {
            versions.push(serialize_module_info(item)?);
        }
        Ok::<_, PromptPmError>((registry_path, versions))
    })();

    match outcome {
        Ok((registry_path, versions)) => {
            let payload = json!({
                "ok": true,
                "operation": "info",
                "data": {
                    "registry_path": registry_path.display().to_string(),
                    "name": module_name,
                    "count": versions.len(),
                    "versions": versions,
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let hint = if err.code() == "VALIDATION_ERROR" {
                "Ensure installed module metadata and interface are valid."
            } else {
                "Use a valid local registry path and a module name that exists."
            };
            let payload = json!({
                "ok": false,
                "operation": "info",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": hint,
                    "path": module_name,
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
