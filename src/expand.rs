//! Test expansion: raw test entries to a flat list of named units.
//!
//! ## Expansion Rules
//!
//! - `single` entries produce one unit with an empty argument tuple. The
//!   title passes through as written, except that `$name` keys present in
//!   the parameter registry are replaced. A single title can never fail.
//! - `static-each` entries produce one unit per tuple, in order. The name is
//!   rendered from the tuple's display form; the unit keeps the original
//!   tuple.
//! - `deferred-each` entries call their data provider on a throwaway
//!   instance. The provider must answer immediately: a pending result fails
//!   the whole suite. An empty result produces no units.
//!
//! The throwaway instance is built at most once per expansion, and only if a
//! deferred entry or a known `$name` placeholder needs it. Nothing is returned
//! unless every entry expanded, so a suite is either fully named or not
//! registered at all.

use std::fmt;

use serde::Serialize;

use crate::aggregate::ClassMetadata;
use crate::class::{ProviderOutput, TestEntry, TestKind};
use crate::diagnostics::{AssemblyError, Failure, TemplateError};
use crate::object::Object;
use crate::template::{self, ParamContext};
use crate::value::Value;

/// Identity of a test unit: class index, entry index and tuple ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId {
    pub class: usize,
    pub entry: usize,
    pub ordinal: usize,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.entry, self.ordinal)
    }
}

/// A fully named, independently runnable test.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTestUnit {
    pub display_name: String,
    pub member: String,
    pub args: Vec<Value>,
    pub identity: UnitId,
}

/// Lazily constructed instance used only for naming and data providers.
struct Throwaway<'a, F> {
    factory: &'a F,
    class: &'a str,
    instance: Option<Object>,
}

impl<'a, F> Throwaway<'a, F>
where
    F: Fn() -> Result<Object, Failure>,
{
    fn get(&mut self) -> Result<&Object, AssemblyError> {
        let instance = match self.instance.take() {
            Some(instance) => instance,
            None => {
                tracing::debug!(class = %self.class, "constructing throwaway instance for assembly");
                (self.factory)().map_err(|reason| AssemblyError::AssemblyConstructionFailure {
                    class: self.class.to_string(),
                    reason,
                })?
            }
        };
        Ok(self.instance.insert(instance))
    }
}

/// Expands every test entry of `meta` into units.
///
/// `instance_factory` must build an instance without arguments. It is
/// called at most once.
///
/// # Errors
/// - [`AssemblyError::Template`] when a parameterized name cannot be
///   rendered.
/// - [`AssemblyError::UnsupportedAsyncProvider`] when a data provider
///   returns a pending computation.
/// - [`AssemblyError::ProviderFailure`] when a data provider fails.
/// - [`AssemblyError::AssemblyConstructionFailure`] when the throwaway
///   instance cannot be built.
pub fn expand<F>(meta: &ClassMetadata, instance_factory: F) -> Result<Vec<ResolvedTestUnit>, AssemblyError>
where
    F: Fn() -> Result<Object, Failure>,
{
    let mut throwaway = Throwaway {
        factory: &instance_factory,
        class: &meta.name,
        instance: None,
    };
    let mut units = Vec::new();

    for (entry_index, entry) in meta.tests.iter().enumerate() {
        let tuples = match &entry.kind {
            TestKind::Single => None,
            TestKind::StaticEach(tuples) => Some(tuples.clone()),
            TestKind::DeferredEach(provider) => {
                let instance = throwaway.get()?;
                match provider(instance) {
                    Ok(ProviderOutput::Ready(tuples)) => Some(tuples),
                    Ok(ProviderOutput::Pending(_)) => {
                        return Err(AssemblyError::UnsupportedAsyncProvider {
                            class: meta.name.clone(),
                            member: entry.member.clone(),
                        });
                    }
                    Err(reason) => {
                        return Err(AssemblyError::ProviderFailure {
                            class: meta.name.clone(),
                            member: entry.member.clone(),
                            reason,
                        });
                    }
                }
            }
        };

        let identity = |ordinal| UnitId {
            class: meta.class.index(),
            entry: entry_index,
            ordinal,
        };

        let Some(tuples) = tuples else {
            let knows_a_key = template::named_keys(&entry.name_template)
                .into_iter()
                .any(|key| meta.parameters.get(key).is_some());
            let name = if knows_a_key {
                let named = meta.parameters.context_for(throwaway.get()?);
                template::render_known(&entry.name_template, &named)
            } else {
                entry.name_template.clone()
            };
            units.push(ResolvedTestUnit {
                display_name: name,
                member: entry.member.clone(),
                args: Vec::new(),
                identity: identity(0),
            });
            continue;
        };

        let named = if template::has_named_placeholders(&entry.name_template) {
            meta.parameters.context_for(throwaway.get()?)
        } else {
            ParamContext::new()
        };

        if tuples.is_empty() {
            tracing::debug!(class = %meta.name, member = %entry.member, "parameterized test expanded to zero units");
        }
        for (ordinal, tuple) in tuples.into_iter().enumerate() {
            let name = render_name(meta, entry, &tuple, &named)?;
            units.push(ResolvedTestUnit {
                display_name: name,
                member: entry.member.clone(),
                args: tuple,
                identity: identity(ordinal),
            });
        }
    }

    tracing::debug!(class = %meta.name, units = units.len(), "suite expanded");
    Ok(units)
}

/// Renders a unit name from the display form of its tuple. Positions with a
/// custom formatter receive the original value instead.
fn render_name(
    meta: &ClassMetadata,
    entry: &TestEntry,
    tuple: &[Value],
    named: &ParamContext,
) -> Result<String, AssemblyError> {
    let display: Vec<Value> = tuple
        .iter()
        .enumerate()
        .map(|(i, value)| match entry.formatters.get(i) {
            Some(Some(_)) => value.clone(),
            _ => value.to_display(),
        })
        .collect();
    template::render(&entry.name_template, &display, named, &entry.formatters)
        .map_err(|source: TemplateError| AssemblyError::Template {
            class: meta.name.clone(),
            member: entry.member.clone(),
            source,
        })
}
