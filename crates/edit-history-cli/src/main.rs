use clap::Parser;
use colored::Colorize;
use edit_history_engine::{EngineConfig, ErrorCategory, HistoryStore};

mod cli_args;
mod commands;
mod tracing_setup;
mod workspace;

use cli_args::{CliArgs, Commands};

fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<edit_history_engine::EngineError>() {
        Some(e) => match e.category() {
            ErrorCategory::Validation => 2,
            ErrorCategory::Precondition => 3,
            ErrorCategory::Lock => 4,
            ErrorCategory::Integrity => 5,
            ErrorCategory::Patch => 6,
            ErrorCategory::Io => 7,
        },
        None => 1,
    }
}

fn main() {
    let args = CliArgs::parse();
    tracing_setup::setup_logging(args.verbose);

    match run(args) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let mut config = EngineConfig::new(std::env::current_dir()?);
    let workspace_root = workspace::discover(args.workspace, &config.history_dir_name)?;
    config.workspace_root = workspace_root;
    if let Some(timeout) = args.timeout {
        config.lock_timeout_secs = timeout;
    }

    let store = HistoryStore::new(&config);
    let reviewer = edit_history_engine::Reviewer::new(config, store);

    if args.force_cleanup {
        commands::run_cleanup(&reviewer)?;
    }

    match args.command {
        Commands::Status { conversation, file, status, time, limit } => {
            commands::run_status(&reviewer, conversation, file, status, time, limit)
        }
        Commands::Show { identifier } => commands::run_show(&reviewer, &identifier),
        Commands::Accept { edit, conversation } => commands::run_accept(&reviewer, edit, conversation),
        Commands::Reject { edit, conversation } => commands::run_reject(&reviewer, edit, conversation),
        Commands::Review { conversation } => commands::run_review(&reviewer, conversation),
        Commands::Cleanup => commands::run_cleanup(&reviewer),
    }
}
