use clap::{builder::styling::AnsiColor, builder::Styles, Parser, Subcommand};

const CLI_STYLE: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Green.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Debug, Clone, Parser)]
#[command(name = "promptpm", about = "A local package manager for declarative, self-testing prompt modules")]
#[command(version)]
#[command(styles = CLI_STYLE)]
pub struct Cli {
    /// Force JSON output.
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty human-readable output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress non-error output.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Path to PromptPM config file. Reserved for future use; currently unread.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Local registry path.
    #[arg(long, global = true, default_value = ".promptpm_registry", value_name = "PATH")]
    pub registry: std::path::PathBuf,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Initialize a new prompt module in the current directory
    Init {
        /// Module name. Defaults to the current directory name.
        #[arg(long = "name", value_name = "NAME")]
        module_name: Option<String>,

        /// Module version.
        #[arg(long = "version", value_name = "VERSION", default_value = "0.1.0")]
        module_version: String,
    },
    /// Validate a prompt module against schema and semantic rules
    Validate {
        /// Module directory.
        #[arg(default_value = ".")]
        path: std::path::PathBuf,
    },
    /// Run deterministic prompt module tests
    Test {
        /// Module directory.
        #[arg(default_value = ".")]
        path: std::path::PathBuf,
    },
    /// Resolve module dependencies from the local registry
    Install {
        /// Module directory.
        #[arg(default_value = ".")]
        path: std::path::PathBuf,
    },
    /// Validate, test, and publish a module to the local registry
    Publish {
        /// Module directory.
        #[arg(default_value = ".")]
        path: std::path::PathBuf,
    },
    /// List installed modules from the local registry
    List,
    /// Display metadata and semantic interface for an installed module
    Info {
        /// Installed module name.
        module_name: String,
    },
}
