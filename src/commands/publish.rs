use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::errors::PromptPmError;
use crate::output::emit;
use crate::registry::LocalRegistry;
use crate::schema::{load_prompt_module, validate_prompt_module};
use crate::test_runner::{run_prompt_module_tests, TestRunResult};

fn test_summary(result: &TestRunResult) -> serde_json::Value {
    json!({
        "total": result.total,
        "passed": result.passed,
        "failed": result.failed,
    })
}

fn test_failure_payload(absolute_path: &str, result: &TestRunResult) -> serde_json::Value {
    let first_failure = result.results.iter().flat_map(|case| case.failures.first()).next();
    let message = match first_failure {
        Some(failure) => format!(
            "{} test(s) failed. First failure in {} at assertion {} ({}): {}",
            result.failed, failure.test_name, failure.assertion_index, failure.assertion_type, failure.message
        ),
        None => format!("{} test(s) failed.", result.failed),
    };

    let failures: Vec<serde_json::Value> = result
        .results
        .iter()
        .flat_map(|case| case.failures.iter())
        .map(|failure| {
            json!({
                "test_name": failure.test_name,
                "assertion_index": failure.assertion_index,
                "assertion_type": failure.assertion_type,
                "message": failure.message,
                "expected": failure.expected,
                "actual": failure.actual,
            })
        })
        .collect();

    json!({
        "ok": false,
        "operation": "publish",
        "error": {
            "code": "TEST_FAILURE",
            "message": message,
            "hint": "Fix failing tests before publishing.",
            "path": absolute_path,
        },
        "data": {
            "tests": test_summary(result),
            "failures": failures,
        },
    })
}

enum Outcome {
    Published {
        registry_path: std::path::PathBuf,
        name: String,
        version: String,
        published_path: std::path::PathBuf,
        tests: TestRunResult,
    },
    TestsFailed(TestRunResult),
}

fn publish_module(path: &Path, registry_path: &Path) -> Result<Outcome, PromptPmError> {
    let registry_path = commands::ensure_local_registry_path(registry_path)?;
    let registry = LocalRegistry::new(&registry_path)?;

    let module = load_prompt_module(path)?;
    validate_prompt_module(&module)?;

    let test_result = run_prompt_module_tests(path)?;
    if test_result.failed > 0 {
        return Ok(Outcome::TestsFailed(test_result));
    }

    if registry.has_version(&module.module.name, &module.module.version)? {
        return Err(PromptPmError::publish_conflict(format!(
            "Published version already exists: {}@{}",
            module.module.name, module.module.version
        )));
    }

    let installed = registry.install(path, &module.module.name, &module.module.version)?;

    Ok(Outcome::Published {
        registry_path,
        name: installed.name,
        version: installed.version,
        published_path: installed.path,
        tests: test_result,
    })
}

pub fn run(ctx: CommandContext, path: &Path, registry_path: &Path) -> i32 {
    let absolute_path = commands::absolute_path(path).unwrap_or_else(|_| path.to_path_buf());
    let absolute_path_text = absolute_path.display().to_string();

    match publish_module(path, registry_path) {
        Ok(Outcome::TestsFailed(result)) => {
            let payload = test_failure_payload(&absolute_path_text, &result);
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::TEST_FAILURE_EXIT_CODE
        }
        Ok(Outcome::Published {
            registry_path,
            name,
            version,
            published_path,
            tests,
        }) => {
            let payload = json!({
                "ok": true,
                "operation": "publish",
                "data": {
                    "module_path": absolute_path_text,
                    "registry_path": registry_path.display().to_string(),
                    "name": name,
                    "version": version,
                    "published_path": published_path.display().to_string(),
                    "identifier": format!("{}@{}", name, version),
                    "tests": test_summary(&tests),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let hint = match err.code() {
                "VALIDATION_ERROR" => "Fix module validation issues before publishing.",
                "PUBLISH_CONFLICT" => "Bump module version before publishing again.",
                "DEPENDENCY_ERROR" => "Use a valid local registry path and retry.",
                _ => "Retry the command and inspect traceback in debug logs.",
            };
            let payload = json!({
                "ok": false,
                "operation": "publish",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": hint,
                    "path": absolute_path_text,
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
