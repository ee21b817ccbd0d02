#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod diagnostics;
mod error;
mod harness;
mod oplog;
mod roles;
mod scenarios;
mod util;

use cli::RootArgs;
use config::{ConfigFile, HarnessConfig};
use harness::Harness;

const CI_ENV_VARS: [&str; 2] = ["CI", "GITHUB_ACTIONS"];

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(&args.log_level);

    let in_ci = match ensure_ci(|key| std::env::var(key).ok()) {
        Ok(()) => true,
        Err(err) if args.require_ci => return Err(err),
        Err(err) => {
            tracing::debug!("not running in CI: {err:#}");
            false
        }
    };

    let file = args.config.as_deref().map(ConfigFile::load).transpose()?;
    let config = HarnessConfig::resolve(args.overrides(), file, in_ci)
        .context("resolve harness configuration")?;
    tracing::debug!(?config, "resolved configuration");
    let harness = Harness::new(config);

    for check in args.scenario.checks() {
        println!("Running {} test", check.name());
        if let Err(err) = check.run(&harness) {
            tracing::error!(check = check.name(), "check failed: {err:#}");
            let stdout = std::io::stdout();
            diagnostics::report(&harness, &mut stdout.lock());
            return Err(err);
        }
        tracing::info!(check = check.name(), "check passed");
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn ensure_ci(env: impl Fn(&str) -> Option<String>) -> Result<()> {
    for key in CI_ENV_VARS {
        if env(key).as_deref() != Some("true") {
            return Err(anyhow!(
                "these tests must be run on GitHub Actions ({key} is not \"true\")"
            ));
        }
    }
    Ok(())
}
