use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tutorcall::cli::{CatalogCommands, Cli, Commands, ConfigCommands, ScheduleCommands, SweepCommands};
use tutorcall::commands;
use tutorcall::config;
use tutorcall::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::from_error(&e) as u8)
        }
    }
}

/// Logs go to stderr so `--format json` output stays parseable.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "tutorcall=debug" } else { "tutorcall=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    // Completion needs neither config nor data
    if let Commands::Completion { shell } = &cli.command {
        return commands::completion::generate_completions(*shell);
    }

    let mut ctx = config::Context::load(cli.config.as_deref())?;
    if !ctx.config.color {
        console::set_colors_enabled(false);
    }
    if let Some(dir) = cli.data_dir.clone() {
        ctx.set_data_dir(dir);
    }
    if let Some(format) = cli.format {
        ctx.set_format(format);
    }

    execute_command(cli.command, ctx).await
}

async fn execute_command(command: Commands, ctx: config::Context) -> Result<()> {
    match command {
        Commands::Catalog(cmd) => match cmd {
            CatalogCommands::Import { file } => commands::catalog::import(&ctx, &file),
            CatalogCommands::Show => commands::catalog::show(&ctx),
        },
        Commands::Schedule(cmd) => match cmd {
            ScheduleCommands::Create(args) => commands::schedule::create(&ctx, args).await,
            ScheduleCommands::Reschedule(args) => commands::schedule::reschedule(&ctx, args).await,
            ScheduleCommands::Cancel { id, lesson, yes } => {
                commands::schedule::cancel(&ctx, id, &lesson, yes).await
            }
            ScheduleCommands::List { batch } => commands::schedule::list(&ctx, &batch),
            ScheduleCommands::Show { id } => commands::schedule::show(&ctx, id),
        },
        Commands::Sweep(cmd) => match cmd {
            SweepCommands::Reminders { now } => {
                commands::sweep::reminders(&ctx, now.as_deref()).await
            }
            SweepCommands::Status { now } => commands::sweep::status(&ctx, now.as_deref()).await,
        },
        Commands::Daemon => commands::sweep::daemon(&ctx).await,
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(&ctx),
            ConfigCommands::Init { force } => commands::config::init(&ctx, force),
        },
        Commands::Completion { shell } => commands::completion::generate_completions(shell),
    }
}
