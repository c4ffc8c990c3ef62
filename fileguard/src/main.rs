use anyhow::Result;
use clap::Parser;
use fileguard::errors::display_error;
use fileguard::hooks::exit_code;
use fileguard::tracing_init::init_tracing;
use tracing::{Level, error, instrument};

mod cli;
mod cmd;

use cli::{Cli, Commands};

#[instrument(level = Level::TRACE)]
fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings.as_deref();
    match cli.command {
        Commands::Hook => cmd::hook::run(settings),
        Commands::Explain {
            json,
            agent,
            cwd,
            tool,
            args,
        } => cmd::explain::run(settings, json, agent, cwd, &tool, &args),
        Commands::Validate { json } => cmd::validate::run(settings, json),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let verbose = cli.verbose;
    let is_hook = matches!(cli.command, Commands::Hook);
    if let Err(e) = run(cli) {
        error!("{:?}", e);
        if is_hook {
            // The verdict never reached stdout; fail closed through the exit code.
            eprintln!("fileguard: {:#}", e);
            std::process::exit(exit_code::BLOCKING_ERROR);
        }
        display_error(&e, verbose);
        std::process::exit(1);
    }
}
