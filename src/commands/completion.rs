use crate::cli::Cli;
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

/// Generate shell completions
///
/// The script goes to stdout and the install hint to stderr, so redirecting works:
///   tutorcall completion bash > ~/.local/share/bash-completion/completions/tutorcall
pub fn generate_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name.as_str(), &mut io::stdout());

    if let Some(hint) = install_hint(shell, &name) {
        eprintln!();
        eprintln!("{}", hint);
    }
    Ok(())
}

fn install_hint(shell: Shell, name: &str) -> Option<String> {
    match shell {
        Shell::Bash => Some(format!(
            "# {name} completion bash > ~/.local/share/bash-completion/completions/{name}"
        )),
        Shell::Zsh => Some(format!(
            "# {name} completion zsh > ~/.zfunc/_{name}\n# then in ~/.zshrc: fpath=(~/.zfunc $fpath); autoload -Uz compinit && compinit"
        )),
        Shell::Fish => Some(format!(
            "# {name} completion fish > ~/.config/fish/completions/{name}.fish"
        )),
        _ => None,
    }
}
