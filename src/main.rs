mod asset;
mod command;
mod context;
mod engine;
mod log;
mod process;
mod report;
mod runner;
mod temporary;
mod yuv;

use anyhow::anyhow;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tokio::signal;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Keep temporary files after exiting.
    #[arg(long, global = true)]
    keep: bool,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(clap::Subcommand)]
enum Command {
    Run(command::run::Args),
    PrintCompletions(command::print_completions::Args),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let Cli {
        command: action,
        keep,
        verbose,
    } = Cli::parse();

    env_logger::Builder::new()
        .filter_level(verbose.log_level_filter())
        .parse_default_env()
        .init();

    let out = match action {
        Command::PrintCompletions(args) => return command::print_completions(args),
        Command::Run(args) => tokio::select! {
            r = command::run(args) => r,
            _ = signal::ctrl_c() => Err(anyhow!("ctrl_c")),
        },
    };

    // Wait for vmafrc processes to exit before cleaning the report dir
    process::child::wait().await;
    if !keep {
        temporary::clean().await;
    }

    out
}
