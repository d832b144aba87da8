use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use fantastic_filter::{
    app, batch,
    config::{Command, Config},
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::parse();

    if let Some(Command::Batch(args)) = &config.command {
        ensure!(args.model.is_file(), "Model path does not exist");
        let report = batch::run(args, config.session_options())
            .with_context(|| format!("Batch run with {} failed", args.model.display()))?;
        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            output_dir = %args.output_dir.display(),
            "batch done"
        );
        ensure!(
            report.failed.is_empty() || report.succeeded > 0,
            "No image could be enhanced"
        );
        return Ok(());
    }

    app::run(config).context("GUI exited with an error")
}
