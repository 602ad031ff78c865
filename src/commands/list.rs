use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::output::emit;
use crate::registry::{InstalledModule, LocalRegistry};

fn serialize_modules(modules: &[InstalledModule]) -> Vec<serde_json::Value> {
    modules
        .iter()
        .map(|module| {
            json!({
                "name": module.name,
                "version": module.version,
                "source": module.path.display().to_string(),
            })
        })
        .collect()
}

pub fn run(ctx: CommandContext, registry_path: &Path) -> i32 {
    let outcome = (|| {
        let registry_path = commands::ensure_local_registry_path(registry_path)?;
        let registry = LocalRegistry::new(&registry_path)?;
        let installed = registry.list_installed()?;
        Ok::<_, crate::errors::PromptPmError>((registry_path, installed))
    })();

    match outcome {
        Ok((registry_path, installed)) => {
            let payload = json!({
                "ok": true,
                "operation": "list",
                "data": {
                    "registry_path": registry_path.display().to_string(),
                    "count": installed.len(),
                    "modules": serialize_modules(&installed),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let payload = json!({
                "ok": false,
                "operation": "list",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": "Use a valid local registry path and verify installed module integrity.",
                    "path": registry_path.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
