//! Run configuration, loaded from an optional YAML file.
//!
//! ```yaml
//! filter: "Math > .*"
//! fail_fast: true
//! format: json
//! color: never
//! ```
//!
//! Command-line flags override whatever the file says.

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::runner::RunOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn choice(&self) -> termcolor::ColorChoice {
        match self {
            ColorMode::Auto if atty::is(atty::Stream::Stdout) => termcolor::ColorChoice::Auto,
            ColorMode::Auto | ColorMode::Never => termcolor::ColorChoice::Never,
            ColorMode::Always => termcolor::ColorChoice::Always,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub filter: Option<String>,
    pub fail_fast: bool,
    pub format: OutputFormat,
    pub color: ColorMode,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config file `{}`", path.display())]
    #[diagnostic(code(suitecraft::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file `{}`", path.display())]
    #[diagnostic(code(suitecraft::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid test filter `{filter}`")]
    #[diagnostic(
        code(suitecraft::config::filter),
        help("the filter is a regular expression matched against `<suite> > <test>`")
    )]
    Filter {
        filter: String,
        #[source]
        source: regex::Error,
    },
}

impl RunConfig {
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &text)
    }

    /// Compiles the filter and builds runner options.
    pub fn run_options(&self) -> Result<RunOptions, ConfigError> {
        let filter = match &self.filter {
            Some(filter) => Some(Regex::new(filter).map_err(|source| ConfigError::Filter {
                filter: filter.clone(),
                source,
            })?),
            None => None,
        };
        Ok(RunOptions {
            filter,
            fail_fast: self.fail_fast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = RunConfig::from_yaml(Path::new("run.yaml"), "fail_fast: true\n").unwrap();
        assert!(config.fail_fast);
        assert_eq!(config.format, OutputFormat::Human);
        assert_eq!(config.color, ColorMode::Auto);
        assert_eq!(config.filter, None);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = RunConfig::from_yaml(Path::new("run.yaml"), "retries: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_bad_filter_is_reported() {
        let config = RunConfig {
            filter: Some("(".to_string()),
            ..RunConfig::default()
        };
        assert!(matches!(config.run_options(), Err(ConfigError::Filter { .. })));
    }
}
