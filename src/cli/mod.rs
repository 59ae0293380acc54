//! Harness entry point.
//!
//! A binary that declares suites hands a build function to [`main`] and
//! gets argument parsing, logging, filtering, reporting and an exit code:
//!
//! ```rust,no_run
//! use std::process::ExitCode;
//! use suitecraft::class::ClassRegistry;
//!
//! fn main() -> ExitCode {
//!     suitecraft::cli::main(|registry: &mut ClassRegistry| {
//!         let smoke = registry
//!             .declare("Smoke")
//!             .test("ok", "passes", |_this, _call| async move { Ok(()) })
//!             .finish()?;
//!         Ok(vec![smoke])
//!     })
//! }
//! ```

use std::process::ExitCode;

use clap::Parser;
use miette::Report;

use crate::class::{ClassId, ClassRegistry};
use crate::config::RunConfig;
use crate::diagnostics::DeclarationError;
use crate::driver::register_all;
use crate::runner::{AssemblyReport, LocalRunner};

pub mod args;
pub mod output;

pub use args::HarnessArgs;

/// Parses the process arguments and runs the suites `build` declares.
pub fn main<F>(build: F) -> ExitCode
where
    F: FnOnce(&mut ClassRegistry) -> Result<Vec<ClassId>, DeclarationError>,
{
    let args = HarnessArgs::parse();
    crate::logging::init(args.verbose);
    match run(&args, build) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{:?}", report);
            ExitCode::from(2)
        }
    }
}

/// Runs the harness with already parsed arguments.
///
/// # Errors
/// Returns a report when the config file or the filter is invalid, or when
/// a suite declaration is rejected. Failing tests and suites that fail to
/// assemble are not errors; they make the exit code non-zero.
pub fn run<F>(args: &HarnessArgs, build: F) -> miette::Result<ExitCode>
where
    F: FnOnce(&mut ClassRegistry) -> Result<Vec<ClassId>, DeclarationError>,
{
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let config = args.apply(config);
    let options = config.run_options()?;

    let mut registry = ClassRegistry::new();
    let suites = build(&mut registry)?;
    tracing::debug!(classes = registry.len(), suites = suites.len(), "suites declared");

    let mut runner = LocalRunner::new(options);
    let errors = register_all(&registry, &suites, &mut runner);
    let reports: Vec<AssemblyReport> = errors.iter().map(AssemblyReport::from).collect();
    for error in errors {
        eprintln!("{:?}", Report::new(error));
    }

    if args.list {
        output::print_listing(&runner.listing());
        return Ok(exit_code(reports.is_empty()));
    }

    let mut summary = runner.run();
    summary.assembly_errors = reports;
    output::print_summary(&summary, config.format, config.color, args.verbose > 0)
        .map_err(|err| miette::miette!("cannot write report: {}", err))?;
    Ok(exit_code(summary.is_success()))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
