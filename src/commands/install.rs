use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::output::emit;
use crate::registry::LocalRegistry;
use crate::resolver::DependencyResolver;

pub fn run(ctx: CommandContext, path: &Path, registry_path: &Path) -> i32 {
    let absolute_path = commands::absolute_path(path).unwrap_or_else(|_| path.to_path_buf());

    let outcome = (|| {
        let registry_path = commands::ensure_local_registry_path(registry_path)?;
        let registry = LocalRegistry::new(&registry_path)?;
        let resolver = DependencyResolver::new(&registry);
        let resolved = resolver.resolve_for_module(path)?;
        Ok::<_, crate::errors::PromptPmError>((registry_path, resolved))
    })();

    match outcome {
        Ok((registry_path, resolved)) => {
            let installed: Vec<serde_json::Value> = resolved
                .iter()
                .map(|dependency| {
                    json!({
                        "name": dependency.name,
                        "version": dependency.version,
                        "path": dependency.path,
                    })
                })
                .collect();

            let payload = json!({
                "ok": true,
                "operation": "install",
                "data": {
                    "module_path": absolute_path.display().to_string(),
                    "registry_path": registry_path.display().to_string(),
                    "installed": installed,
                    "count": resolved.len(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let hint = if err.code() == "VALIDATION_ERROR" {
                "Fix module validation issues before installing dependencies."
            } else {
                "Ensure all dependencies are available in the local registry and dependency version ranges are valid."
            };
            let payload = json!({
                "ok": false,
                "operation": "install",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": hint,
                    "path": absolute_path.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
