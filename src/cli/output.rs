//! User-facing output of the harness: human-readable and JSON reports.

use std::io::{self, Write};

use termcolor::{Color, ColorSpec, StandardStream, WriteColor};

use crate::config::{ColorMode, OutputFormat};
use crate::diagnostics::Failure;
use crate::runner::{RunSummary, Status, TestOutcome};

// ============================================================================
// Entry points
// ============================================================================

pub fn print_summary(summary: &RunSummary, format: OutputFormat, color: ColorMode, verbose: bool) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color.choice());
    match format {
        OutputFormat::Human => write_human(&mut stdout, summary, verbose),
        OutputFormat::Json => write_json(&mut stdout, summary),
    }
}

pub fn print_listing(titles: &[String]) {
    for title in titles {
        println!("{}", title);
    }
    println!("\n{} tests", titles.len());
}

// ============================================================================
// Writers
// ============================================================================

pub fn write_json<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, summary)?;
    writeln!(out)
}

pub fn write_human<W: WriteColor>(out: &mut W, summary: &RunSummary, verbose: bool) -> io::Result<()> {
    for outcome in &summary.outcomes {
        write_outcome(out, outcome, verbose)?;
    }

    for failure in &summary.suite_failures {
        label(out, "FAIL", Color::Red)?;
        writeln!(out, ": suite {}", failure.suite)?;
        write_failure(out, &failure.failure)?;
    }
    for error in &summary.assembly_errors {
        label(out, "ERROR", Color::Red)?;
        writeln!(out, ": [{}] {}", error.kind, error.message)?;
    }

    write!(out, "\nTest summary: total {}, {} ", summary.total(), summary.passed)?;
    label(out, "passed", Color::Green)?;
    write!(out, ", {} ", summary.failed)?;
    label(out, "failed", Color::Red)?;
    write!(out, ", {} ", summary.skipped)?;
    label(out, "skipped", Color::Yellow)?;
    writeln!(out)
}

fn write_outcome<W: WriteColor>(out: &mut W, outcome: &TestOutcome, verbose: bool) -> io::Result<()> {
    match outcome.status {
        Status::Passed => {
            label(out, "PASS", Color::Green)?;
            writeln!(out, ": {}", outcome.full_title())?;
        }
        Status::Skipped => {
            label(out, "SKIP", Color::Yellow)?;
            match &outcome.skip_reason {
                Some(reason) => writeln!(out, ": {} ({})", outcome.full_title(), reason)?,
                None => writeln!(out, ": {}", outcome.full_title())?,
            }
        }
        Status::Failed => {
            label(out, "FAIL", Color::Red)?;
            writeln!(out, ": {}", outcome.full_title())?;
            if let Some(failure) = &outcome.failure {
                write_failure(out, failure)?;
            }
        }
    }

    if verbose {
        if !outcome.state.tags.is_empty() {
            writeln!(out, "  tags: {}", outcome.state.tags.join(" "))?;
        }
        for step in &outcome.state.steps {
            writeln!(out, "  step: {}", step)?;
        }
        for annotation in &outcome.state.annotations {
            match &annotation.description {
                Some(description) => writeln!(out, "  {}: {}", annotation.kind, description)?,
                None => writeln!(out, "  {}", annotation.kind)?,
            }
        }
    }
    Ok(())
}

fn write_failure<W: WriteColor>(out: &mut W, failure: &Failure) -> io::Result<()> {
    writeln!(out, "  Error: {}", failure)?;
    for later in &failure.related {
        writeln!(out, "  Also: {}", later)?;
    }
    Ok(())
}

fn label<W: WriteColor>(out: &mut W, text: &str, color: Color) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{}", text)?;
    out.reset()
}
