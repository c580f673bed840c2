mod cli;
mod config;
mod output;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command, OutputFormat};

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("tkb=debug,info")
        } else {
            EnvFilter::new("tkb=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_config();
    let pricing_path = cli.pricing.clone().or(config.pricing_file);
    let pricing = tkb::pricing::load_pricing(pricing_path.as_deref())?;
    let format = cli
        .format
        .or(config.format)
        .unwrap_or(OutputFormat::Table);

    if cli.effective_command() == Command::Pricing {
        match format {
            OutputFormat::Json => output::print_pricing_json(&pricing)?,
            OutputFormat::Table => output::print_pricing_table(&pricing),
        }
        return Ok(());
    }

    let records = tkb::input::read_usage(cli.input.as_deref())?;
    if records.is_empty() {
        info!("no usage records found");
        return Ok(());
    }
    info!(records = records.len(), "computing breakdown");

    let tree = tkb::compute_breakdown(&records, Some(&pricing));

    match format {
        OutputFormat::Json => output::print_json(&tree)?,
        OutputFormat::Table => {
            output::print_table(&tree, cli.breakdown || config.breakdown.unwrap_or(false))
        }
    }

    if cli.strict && !tree.diagnostics.is_empty() {
        bail!(
            "{} usage group(s) or record(s) could not be priced",
            tree.diagnostics.len()
        );
    }

    Ok(())
}
