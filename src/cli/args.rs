//! Command-line arguments of a suitecraft harness binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ColorMode, OutputFormat, RunConfig};

#[derive(Debug, Parser)]
#[command(version, about = "Runs declaratively assembled test suites.")]
pub struct HarnessArgs {
    /// Regular expression matched against `<suite> > <test>`.
    pub filter: Option<String>,

    /// Print the selected tests without running them.
    #[arg(long)]
    pub list: bool,

    /// YAML file with run settings; flags override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(long, value_enum)]
    pub color: Option<ColorMode>,

    /// Stop after the first failing test.
    #[arg(long)]
    pub fail_fast: bool,

    /// Raise log verbosity; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl HarnessArgs {
    /// Layers the flags over a config loaded from file.
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(color) = self.color {
            config.color = color;
        }
        config.fail_fast |= self.fail_fast;
        config
    }
}
