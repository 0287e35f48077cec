use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use weir_chain::load_chain_manifest;
use weir_contracts::{ENV_AUDIT_LOG, ENV_SEEDS};
use weir_runner::{run_manifest, RunnerOverrides};

#[derive(Parser)]
#[command(name = "weir-runner")]
#[command(about = "Run a cell scenario under an interceptor chain.", long_about = None)]
struct Cli {
    /// Chain manifest (JSON, schema-version checked).
    #[arg(long, value_name = "PATH")]
    chain: PathBuf,

    /// Seed manifest for filesystem stages; overrides the manifest field.
    #[arg(long, value_name = "PATH")]
    seeds: Option<PathBuf>,

    /// Audit artifact for failed opens; overrides the manifest field.
    #[arg(long, value_name = "PATH")]
    audit_log: Option<PathBuf>,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    let manifest = load_chain_manifest(&cli.chain)?;

    let overrides = RunnerOverrides {
        seeds: cli.seeds.or_else(|| std::env::var_os(ENV_SEEDS).map(PathBuf::from)),
        audit_log: cli
            .audit_log
            .or_else(|| std::env::var_os(ENV_AUDIT_LOG).map(PathBuf::from)),
    };

    let report = run_manifest(&manifest, &overrides)
        .with_context(|| format!("run chain {}", cli.chain.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize run report")?
    );

    if report.cell_status == 0 {
        Ok(std::process::ExitCode::SUCCESS)
    } else {
        Ok(std::process::ExitCode::FAILURE)
    }
}
