//! One module per CLI subcommand. Each `run` function builds a JSON
//! payload, emits it through [`crate::output`], and returns the
//! process exit code for its outcome.

pub mod info;
pub mod init;
pub mod install;
pub mod list;
pub mod publish;
pub mod test;
pub mod validate;

use std::path::{Path, PathBuf};

use crate::errors::{PromptPmError, Result};
use crate::output::OutputMode;

pub const SUCCESS_EXIT_CODE: i32 = 0;
pub const VALIDATION_EXIT_CODE: i32 = 1;
pub const TEST_FAILURE_EXIT_CODE: i32 = 2;
pub const DEPENDENCY_EXIT_CODE: i32 = 3;
pub const PUBLISH_CONFLICT_EXIT_CODE: i32 = 4;
pub const INTERNAL_EXIT_CODE: i32 = 5;

/// Output-related flags shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub output_mode: OutputMode,
    pub quiet: bool,
}

pub fn exit_code_for(error: &PromptPmError) -> i32 {
    match error.code() {
        "VALIDATION_ERROR" => VALIDATION_EXIT_CODE,
        "TEST_FAILURE" => TEST_FAILURE_EXIT_CODE,
        "DEPENDENCY_ERROR" => DEPENDENCY_EXIT_CODE,
        "PUBLISH_CONFLICT" => PUBLISH_CONFLICT_EXIT_CODE,
        _ => INTERNAL_EXIT_CODE,
    }
}

/// Reject non-local registry targets: the registry is filesystem-only,
/// there is no network layer.
pub fn ensure_local_registry_path(raw_path: &Path) -> Result<PathBuf> {
    let text = raw_path.to_string_lossy();
    if text.contains("://") || text.starts_with("http:") || text.starts_with("https:") {
        return Err(PromptPmError::dependency(format!(
            "Registry must be a local filesystem path, got: {:?}",
            text
        )));
    }
    absolute_path(raw_path)
}

pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
