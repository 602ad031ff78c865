use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::errors::PromptPmError;
use crate::output::emit;
use crate::schema::{load_prompt_module, validate_prompt_module};

pub fn run(ctx: CommandContext, path: &Path) -> i32 {
    let outcome = (|| -> Result<_, PromptPmError> {
        let module = load_prompt_module(path)?;
        validate_prompt_module(&module)?;
        Ok(module)
    })();

    let absolute_path = commands::absolute_path(path).unwrap_or_else(|_| path.to_path_buf());

    match outcome {
        Ok(module) => {
            let source = commands::absolute_path(&module.source_path).unwrap_or(module.source_path);
            let payload = json!({
                "ok": true,
                "data": {
                    "path": absolute_path.display().to_string(),
                    "source": source.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let payload = json!({
                "ok": false,
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": "Fix the module definition and run `promptpm validate` again.",
                    "path": absolute_path.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
