use clap::Parser;

use promptpm::cli::{Cli, Command};
use promptpm::commands::{self, CommandContext};
use promptpm::output::resolve_output_mode;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let ctx = CommandContext {
        output_mode: resolve_output_mode(cli.json, cli.pretty),
        quiet: cli.quiet,
    };

    let exit_code = match cli.command {
        Command::Init {
            module_name,
            module_version,
        } => commands::init::run(ctx, module_name.as_deref(), &module_version),
        Command::Validate { path } => commands::validate::run(ctx, &path),
        Command::Test { path } => commands::test::run(ctx, &path),
        Command::Install { path } => commands::install::run(ctx, &path, &cli.registry),
        Command::Publish { path } => commands::publish::run(ctx, &path, &cli.registry),
        Command::List => commands::list::run(ctx, &cli.registry),
        Command::Info { module_name } => commands::info::run(ctx, &module_name, &cli.registry),
    };

    std::process::exit(exit_code);
}

#[test]
fn verify_app() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
