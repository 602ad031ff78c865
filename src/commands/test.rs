use std::path::Path;

use serde_json::json;

use crate::commands::{self, CommandContext};
use crate::output::emit;
use crate::test_runner::{run_prompt_module_tests, TestRunResult};

fn serialize_result(result: &TestRunResult) -> serde_json::Value {
    let mut cases = Vec::with_capacity(result.results.len());
    let mut failures = Vec::new();

    for case in &result.results {
        cases.push(json!({
            "name": case.name,
            "status": if case.passed { "passed" } else { "failed" },
            "failure_count": case.failures.len(),
        }));
        for failure in &case.failures {
            failures.push(serialize_failure(failure));
        }
    }

    json!({
        "total": result.total,
        "passed": result.passed,
        "failed": result.failed,
        "results": cases,
        "failures": failures,
    })
}

fn serialize_failure(failure: &crate::test_runner::AssertionFailure) -> serde_json::Value {
    json!({
        "test_name": failure.test_name,
        "assertion_index": failure.assertion_index,
        "assertion_type": failure.assertion_type,
        "message": failure.message,
        "expected": failure.expected,
        "actual": failure.actual,
    })
}

fn first_failure_message(result: &TestRunResult) -> String {
    let first_failure = result.results.iter().flat_map(|case| case.failures.first()).next();
    match first_failure {
        Some(failure) => format!(
            "{} test(s) failed. First failure in {} at assertion {} ({}): {}",
            result.failed, failure.test_name, failure.assertion_index, failure.assertion_type, failure.message
        ),
        None => format!("{} test(s) failed.", result.failed),
    }
}

pub fn run(ctx: CommandContext, path: &Path) -> i32 {
    let absolute_path = commands::absolute_path(path).unwrap_or_else(|_| path.to_path_buf());

    match run_prompt_module_tests(path) {
        Ok(result) if result.failed > 0 => {
            let payload = json!({
                "ok": false,
                "operation": "test",
                "error": {
                    "code": "TEST_FAILURE",
                    "message": first_failure_message(&result),
                    "hint": "Inspect failure diagnostics and update tests, inputs, or templates.",
                    "path": absolute_path.display().to_string(),
                },
                "data": serialize_result(&result),
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::TEST_FAILURE_EXIT_CODE
        }
        Ok(result) => {
            let mut data = serialize_result(&result);
            data["module_path"] = json!(absolute_path.display().to_string());
            let payload = json!({
                "ok": true,
                "operation": "test",
                "data": data,
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::SUCCESS_EXIT_CODE
        }
        Err(err) => {
            let payload = json!({
                "ok": false,
                "operation": "test",
                "error": {
                    "code": err.code(),
                    "message": err.to_string(),
                    "hint": "Fix module or test schema issues and run `promptpm test` again.",
                    "path": absolute_path.display().to_string(),
                },
            });
            emit(&payload, ctx.output_mode, ctx.quiet);
            commands::exit_code_for(&err)
        }
    }
}
