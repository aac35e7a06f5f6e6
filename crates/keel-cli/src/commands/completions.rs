//! Shell completion generation.

use std::io;

use clap::CommandFactory;
use clap_complete::{generate, shells};

use crate::{
    cli::{Cli, CompletionsArgs, Shell},
    error::CliResult,
};

pub fn execute(args: CompletionsArgs) -> CliResult<()> {
    let mut cmd = Cli::command();
    let mut out = io::stdout();

    match args.shell {
        Shell::Bash => generate(shells::Bash, &mut cmd, "keel", &mut out),
        Shell::Zsh => generate(shells::Zsh, &mut cmd, "keel", &mut out),
        Shell::Fish => generate(shells::Fish, &mut cmd, "keel", &mut out),
        Shell::PowerShell => generate(shells::PowerShell, &mut cmd, "keel", &mut out),
        Shell::Elvish => generate(shells::Elvish, &mut cmd, "keel", &mut out),
    };

    Ok(())
}
