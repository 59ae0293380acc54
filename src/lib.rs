//! # suitecraft
//!
//! Declarative, class-based test suites assembled into flat, ordered
//! test-runner registrations.
//!
//! A suite is a class declared in a [`ClassRegistry`](class::ClassRegistry).
//! Builder calls play the role of annotations: they mark members as tests,
//! hooks, parameters or side-table entries. Assembly then happens in four
//! steps:
//!
//! 1. [`aggregate`](aggregate::aggregate) merges the class with its ancestors;
//! 2. [`expand`](expand::expand) turns test entries into named units, using
//!    the [`template`] engine for names;
//! 3. the [`lifecycle`] orchestrator orders hooks around each unit;
//! 4. the [`driver`] hands everything to a [`Registrar`](driver::Registrar),
//!    such as the in-process [`LocalRunner`](runner::LocalRunner).
//!
//! Binaries get a complete harness from [`cli::main`].

pub mod aggregate;
pub mod class;
pub mod cli;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod expand;
pub mod lifecycle;
pub mod logging;
pub mod object;
pub mod params;
pub mod runner;
pub mod template;
pub mod value;

pub use crate::context::TestContext;
pub use crate::diagnostics::{AssemblyError, DeclarationError, ErrorType, Failure, TemplateError};
pub use crate::object::Object;
pub use crate::value::Value;
