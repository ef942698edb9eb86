//! Command-line arguments and the scenario run behind them.

use papilio_harness::{
    HarnessConfig, HarnessError, ScenarioKind, Summary, create_backend, open_sim_link,
    run_selected,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every scenario that fits the configured peripheral.
    All,
    One(ScenarioKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config: String,
    pub selection: Selection,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("usage: {program} <config.toml> [loopback|bram|burst|all] [--json]")]
    Usage { program: String },
    #[error("expected a .toml config path, got: {0}")]
    NotToml(String),
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error("cannot encode report: {0}")]
    Json(#[from] serde_json::Error),
}

impl Args {
    /// Parse everything after the program name.
    pub fn parse<I>(program: &str, args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let usage = || CliError::Usage {
            program: program.to_string(),
        };
        let mut config = None;
        let mut selection = None;
        let mut json = false;

        for arg in args {
            if arg == "--json" {
                json = true;
            } else if config.is_none() {
                config = Some(arg);
            } else if selection.is_none() {
                selection = Some(match arg.as_str() {
                    "all" => Selection::All,
                    name => Selection::One(name.parse()?),
                });
            } else {
                return Err(usage());
            }
        }

        let config = config.ok_or_else(usage)?;
        if Path::new(&config).extension().and_then(|ext| ext.to_str()) != Some("toml") {
            return Err(CliError::NotToml(config));
        }
        Ok(Self {
            config,
            selection: selection.unwrap_or(Selection::All),
            json,
        })
    }
}

/// Load the config, build the backend and run the selected scenarios.
pub fn run(args: &Args) -> Result<Summary, CliError> {
    let config = HarnessConfig::from_file(&args.config)?;
    run_config(&config, &args.selection)
}

pub fn run_config(config: &HarnessConfig, selection: &Selection) -> Result<Summary, CliError> {
    let kinds = match selection {
        Selection::All => config.default_scenarios(),
        Selection::One(kind) => vec![*kind],
    };
    let sim = create_backend(config)?;
    let mut link = open_sim_link(config, &sim)?;
    let summary = run_selected(&mut link, config, &kinds)?;
    link.end();
    log::info!(
        "{} scenario(s), {} exchanges in {} windows",
        summary.reports.len(),
        sim.exchanges(),
        sim.windows()
    );
    Ok(summary)
}

/// Human or JSON rendering of a summary.
pub fn render(summary: &Summary, json: bool) -> Result<String, CliError> {
    if json {
        Ok(serde_json::to_string_pretty(summary)?)
    } else {
        Ok(summary.to_string())
    }
}
