use clap::CommandFactory;
use clap_complete::Shell;

/// Print shell completions.
#[derive(clap::Parser)]
#[group(skip)]
pub struct Args {
    /// Shell.
    #[arg(value_enum, default_value_t = Shell::Bash)]
    shell: Shell,
}

pub fn print_completions(Args { shell }: Args) -> anyhow::Result<()> {
    clap_complete::generate(
        shell,
        &mut crate::Cli::command(),
        env!("CARGO_PKG_NAME"),
        &mut std::io::stdout(),
    );
    Ok(())
}
