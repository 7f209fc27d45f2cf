// schemefit entry point.
//
// 1. Initialize tracing (stderr; stdout carries the command summaries)
// 2. Parse arguments
// 3. Load config (copying defaults/ into config/ on first run)
// 4. Run the requested command

use anyhow::Context;
use clap::Parser;
use schemefit_app::commands::{self, CommandArgs};
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let args = CommandArgs::parse();
    info!("schemefit starting: {:?}", args.mode);

    commands::run(&args)
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("schemefit=info,schemefit_core=info,schemefit_app=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
