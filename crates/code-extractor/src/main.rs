//! code-extractor: split a path subset out of a repository with its history
//!
//! Reads an extraction configuration (`extractions.yml` by default) and either
//! extracts the configured paths into a standalone history or re-injects the
//! work done there back into the original repository.

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use code_extractor::config::{Cli, ExtractionConfig};
use code_extractor::pipeline;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli.log_level().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ExtractionConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    debug!(?config, "Loaded configuration");

    let report = pipeline::run(&config)
        .with_context(|| format!("Extraction {} failed", config.name))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
