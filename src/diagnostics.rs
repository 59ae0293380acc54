//!
//! # Overview
//!
//! This module defines the `miette`-based diagnostics for suite assembly and
//! the runtime [`Failure`] type reported by hooks and test bodies.
//!
//! Three families of errors exist:
//!
//! - [`TemplateError`]: a placeholder could not be substituted. Carries the
//!   template as source code so `miette` can point at the placeholder.
//! - [`AssemblyError`]: a suite could not be turned into test units. Always
//!   fatal for the affected suite and raised before any unit is registered.
//! - [`DeclarationError`]: a class declaration is malformed and was rejected
//!   when finished.
//!
//! Runtime failures of hooks and bodies are plain [`Failure`] values. Use the
//! [`fail!`](crate::fail) macro to build one:
//!
//! ```rust
//! use suitecraft::{fail, Failure};
//! fn check(n: i32) -> Result<(), Failure> {
//!     if n != 4 {
//!         return Err(fail!("expected 4, got {}", n));
//!     }
//!     Ok(())
//! }
//! assert!(check(5).is_err());
//! ```

use miette::{Diagnostic, SourceSpan};
use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::Phase;

/// Type-safe classification of assembly errors, used by the harness and
/// by tests that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    OutOfRange,
    MissingParameter,
    UnsupportedAsyncProvider,
    AssemblyConstructionFailure,
    ProviderFailure,
    UnknownClass,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::OutOfRange => "OutOfRange",
            ErrorType::MissingParameter => "MissingParameter",
            ErrorType::UnsupportedAsyncProvider => "UnsupportedAsyncProvider",
            ErrorType::AssemblyConstructionFailure => "AssemblyConstructionFailure",
            ErrorType::ProviderFailure => "ProviderFailure",
            ErrorType::UnknownClass => "UnknownClass",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Template errors
// ============================================================================

/// A placeholder in a name or step template could not be substituted.
///
/// `offset` is the character offset of the `$` that starts the placeholder.
#[derive(Debug, Error, Diagnostic)]
pub enum TemplateError {
    #[error(
        "placeholder `{placeholder}` at offset {offset} needs at least {required} argument(s), got {available}"
    )]
    #[diagnostic(
        code(suitecraft::template::out_of_range),
        help("pass an argument for every positional placeholder in the template")
    )]
    OutOfRange {
        offset: usize,
        placeholder: String,
        required: usize,
        available: usize,
        #[source_code]
        template: String,
        #[label("no argument for this placeholder")]
        span: SourceSpan,
    },
    #[error("named placeholder `${key}` at offset {offset} has no matching parameter")]
    #[diagnostic(
        code(suitecraft::template::missing_parameter),
        help("declare a parameter named `{key}` on the suite class or one of its ancestors")
    )]
    MissingParameter {
        offset: usize,
        key: String,
        #[source_code]
        template: String,
        #[label("unknown parameter")]
        span: SourceSpan,
    },
}

impl TemplateError {
    /// Character offset of the offending placeholder.
    pub fn offset(&self) -> usize {
        match self {
            TemplateError::OutOfRange { offset, .. } => *offset,
            TemplateError::MissingParameter { offset, .. } => *offset,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            TemplateError::OutOfRange { .. } => ErrorType::OutOfRange,
            TemplateError::MissingParameter { .. } => ErrorType::MissingParameter,
        }
    }
}

// ============================================================================
// Assembly errors
// ============================================================================

/// Fatal error for one suite. Raised before any of its units are registered.
#[derive(Debug, Error, Diagnostic)]
pub enum AssemblyError {
    #[error("cannot render the name of test `{member}` in suite `{class}`")]
    #[diagnostic(code(suitecraft::assembly::template))]
    Template {
        class: String,
        member: String,
        #[source]
        #[diagnostic_source]
        source: TemplateError,
    },
    #[error("data provider for test `{member}` in suite `{class}` returned a pending computation")]
    #[diagnostic(
        code(suitecraft::assembly::unsupported_async_provider),
        help("data providers run while tests are being named and must return their argument tuples immediately")
    )]
    UnsupportedAsyncProvider { class: String, member: String },
    #[error("could not construct an instance of `{class}` during assembly")]
    #[diagnostic(
        code(suitecraft::assembly::construction_failure),
        help("suite classes must be constructible without arguments and without failing")
    )]
    AssemblyConstructionFailure {
        class: String,
        #[source]
        reason: Failure,
    },
    #[error("data provider for test `{member}` in suite `{class}` failed")]
    #[diagnostic(code(suitecraft::assembly::provider_failure))]
    ProviderFailure {
        class: String,
        member: String,
        #[source]
        reason: Failure,
    },
    #[error("class #{index} is not declared in this registry")]
    #[diagnostic(code(suitecraft::assembly::unknown_class))]
    UnknownClass { index: usize },
}

impl AssemblyError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            AssemblyError::Template { source, .. } => source.error_type(),
            AssemblyError::UnsupportedAsyncProvider { .. } => ErrorType::UnsupportedAsyncProvider,
            AssemblyError::AssemblyConstructionFailure { .. } => {
                ErrorType::AssemblyConstructionFailure
            }
            AssemblyError::ProviderFailure { .. } => ErrorType::ProviderFailure,
            AssemblyError::UnknownClass { .. } => ErrorType::UnknownClass,
        }
    }
}

/// A class declaration was rejected by [`ClassBuilder::finish`](crate::class::ClassBuilder::finish).
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("class `{class}` extends class #{parent}, which is not declared")]
    #[diagnostic(code(suitecraft::declaration::unknown_parent))]
    UnknownParent { class: String, parent: usize },
    #[error("member `{member}` of class `{class}` is declared as a test more than once")]
    #[diagnostic(code(suitecraft::declaration::duplicate_test))]
    DuplicateTest { class: String, member: String },
    #[error("parameter `{name}` is declared more than once on class `{class}`")]
    #[diagnostic(
        code(suitecraft::declaration::duplicate_parameter),
        help("a subclass may redeclare an inherited parameter, a single class may not")
    )]
    DuplicateParameter { class: String, name: String },
}

// ============================================================================
// Runtime failures
// ============================================================================

/// Failure raised by a hook, a test body, a constructor or a data provider.
///
/// The lifecycle fills in `phase` and `hook` when the failure crosses a tier
/// boundary so reports can say where it happened. Failures raised after the
/// first one in the same unit or tier are kept in `related`, in the order
/// they happened.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{}", self.render())]
pub struct Failure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Failure>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            phase: None,
            hook: None,
            related: Vec::new(),
        }
    }

    /// Wraps any error as a failure, keeping its message.
    pub fn from_error<E: std::error::Error>(err: E) -> Self {
        Self::new(err.to_string())
    }

    /// Records where the failure happened unless an inner tier already did.
    pub fn located(mut self, phase: Phase, hook: &str) -> Self {
        if self.phase.is_none() {
            self.phase = Some(phase);
            self.hook = Some(hook.to_string());
        }
        self
    }

    /// Appends a later failure. Its own related failures are flattened into
    /// this one so the list stays in the order they were raised.
    pub fn push_related(&mut self, mut later: Failure) {
        let nested = std::mem::take(&mut later.related);
        self.related.push(later);
        self.related.extend(nested);
    }

    /// Every failure in the order it was raised: this one, then `related`.
    pub fn all(&self) -> impl Iterator<Item = &Failure> {
        std::iter::once(self).chain(self.related.iter())
    }

    /// Keeps `failure` in `slot`: it becomes the primary failure if the slot
    /// is empty, otherwise a related one.
    pub fn record(slot: &mut Option<Failure>, failure: Failure) {
        match slot {
            Some(first) => first.push_related(failure),
            None => *slot = Some(failure),
        }
    }

    fn render(&self) -> String {
        match (&self.phase, &self.hook) {
            (Some(phase), Some(hook)) => format!("{} ({} `{}`)", self.message, phase, hook),
            (Some(phase), None) => format!("{} ({})", self.message, phase),
            _ => self.message.clone(),
        }
    }
}

impl From<TemplateError> for Failure {
    fn from(err: TemplateError) -> Self {
        Failure::from_error(err)
    }
}

/// Constructs a [`Failure`] with a formatted message.
#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        $crate::Failure::new(format!($msg))
    };
    ($msg:expr) => {
        $crate::Failure::new(format!("{}", $msg))
    };
    ($fmt:expr, $($arg:expr),+ $(,)?) => {
        $crate::Failure::new(format!($fmt, $($arg),+))
    };
}

#[cfg(test)]
mod diagnostics_tests {
    use miette::Report;

    use super::*;

    #[test]
    fn test_template_error_renders_label() {
        let err = TemplateError::OutOfRange {
            offset: 2,
            placeholder: "$3".to_string(),
            required: 4,
            available: 1,
            template: "a $3".to_string(),
            span: (2, 2).into(),
        };
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("no argument for this placeholder"));
        assert!(output.contains("needs at least 4"));
    }

    #[test]
    fn test_assembly_error_chains_template_error() {
        let err = AssemblyError::Template {
            class: "Math".to_string(),
            member: "adds".to_string(),
            source: TemplateError::MissingParameter {
                offset: 0,
                key: "user".to_string(),
                template: "$user".to_string(),
                span: (0, 5).into(),
            },
        };
        assert_eq!(err.error_type(), ErrorType::MissingParameter);
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("adds"));
        assert!(output.contains("unknown parameter"));
    }

    #[test]
    fn test_failure_location_is_set_once() {
        let failure = fail!("boom {}", 1)
            .located(Phase::PerTestSetup, "openConn")
            .located(Phase::TestBody, "adds");
        assert_eq!(failure.phase, Some(Phase::PerTestSetup));
        assert_eq!(failure.to_string(), "boom 1 (per-test setup `openConn`)");
    }

    #[test]
    fn test_fail_literal_captures_variables() {
        let n = 5;
        assert_eq!(fail!("bad {n}").message, "bad 5");
        let owned = String::from("plain {n}");
        assert_eq!(fail!(owned).message, "plain {n}");
        assert_eq!(fail!("{}-{}", 1, 2).message, "1-2");
    }

    #[test]
    fn test_later_failures_are_kept_in_order() {
        let mut slot = None;
        Failure::record(&mut slot, fail!("body failed"));
        let mut teardown = fail!("closeConn failed");
        teardown.push_related(fail!("flush failed"));
        Failure::record(&mut slot, teardown);

        let failure = slot.unwrap();
        let messages: Vec<&str> = failure.all().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, ["body failed", "closeConn failed", "flush failed"]);
        assert!(failure.related.iter().all(|f| f.related.is_empty()));
    }
}
