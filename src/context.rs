//! The context object injected into every per-test hook and test body.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::class::modifiers::{Annotation, Attachment, ResolvedModifiers};
use crate::diagnostics::TemplateError;
use crate::expand::UnitId;
use crate::object::Object;
use crate::params::ParamRegistry;
use crate::template::{self, ParamContext};
use crate::value::Value;

/// Static description of the test unit being run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestInfo {
    pub suite: String,
    /// Resolved display name.
    pub title: String,
    /// Original member name; side tables are keyed by it.
    pub member: String,
    pub identity: UnitId,
    pub args: Vec<Value>,
}

impl TestInfo {
    /// `"<suite> > <title>"`, the path used for filtering and reporting.
    pub fn full_title(&self) -> String {
        format!("{} > {}", self.suite, self.title)
    }
}

/// Mutable record of what happened during the test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextState {
    pub steps: Vec<String>,
    pub tags: Vec<String>,
    pub skip: Option<String>,
    pub fixme: Option<String>,
    pub slow: bool,
    pub annotations: Vec<Annotation>,
    pub attachments: Vec<Attachment>,
}

struct Binding {
    instance: Object,
    params: Arc<ParamRegistry>,
}

struct ContextInner {
    info: TestInfo,
    binding: OnceCell<Binding>,
    state: Mutex<ContextState>,
}

/// Cloneable handle shared by the hooks and the body of one test unit.
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

impl TestContext {
    pub fn new(info: TestInfo) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                info,
                binding: OnceCell::new(),
                state: Mutex::new(ContextState::default()),
            }),
        }
    }

    pub fn info(&self) -> &TestInfo {
        &self.inner.info
    }

    /// Binds the unit's instance. Returns false if one was already bound.
    pub fn bind(&self, instance: Object, params: Arc<ParamRegistry>) -> bool {
        self.inner.binding.set(Binding { instance, params }).is_ok()
    }

    pub fn instance(&self) -> Option<Object> {
        self.inner.binding.get().map(|b| b.instance.clone())
    }

    /// Parameter context read from the bound instance right now.
    pub fn param_context(&self) -> ParamContext {
        self.inner
            .binding
            .get()
            .map(|b| b.params.context_for(&b.instance))
            .unwrap_or_default()
    }

    /// Renders and records a step label.
    ///
    /// `$0..` refer to `args`; `$name` reads the instance's parameters as
    /// they are at this moment, so field changes made earlier in the test
    /// show up in the label.
    pub fn step(&self, template: &str, args: &[Value]) -> Result<String, TemplateError> {
        let label = template::render(template, args, &self.param_context(), &[])?;
        tracing::info!(test = %self.inner.info.title, step = %label, "step");
        self.state().steps.push(label.clone());
        Ok(label)
    }

    /// Applies side-table state resolved for this unit.
    pub fn apply(&self, resolved: ResolvedModifiers) {
        let mut state = self.state();
        state.tags.extend(resolved.tags);
        if resolved.skip.is_some() {
            state.skip = resolved.skip;
        }
        if resolved.fixme.is_some() {
            state.fixme = resolved.fixme;
        }
        state.slow |= resolved.slow;
        state.annotations.extend(resolved.annotations);
        state.attachments.extend(resolved.attachments);
    }

    pub fn skip(&self, reason: &str) {
        self.state().skip = Some(reason.to_string());
    }

    pub fn fixme(&self, reason: &str) {
        self.state().fixme = Some(reason.to_string());
    }

    pub fn mark_slow(&self) {
        self.state().slow = true;
    }

    pub fn annotate(&self, kind: &str, description: Option<&str>) {
        self.state().annotations.push(Annotation {
            kind: kind.to_string(),
            description: description.map(str::to_string),
        });
    }

    pub fn attach(&self, name: &str, content_type: &str, body: &str) {
        self.state().attachments.push(Attachment {
            name: name.to_string(),
            content_type: content_type.to_string(),
            body: body.to_string(),
        });
    }

    /// Why the body should not run, if a skip or fixme marker applies.
    pub fn skipped_reason(&self) -> Option<String> {
        let state = self.state();
        state.skip.clone().or_else(|| state.fixme.clone())
    }

    pub fn snapshot(&self) -> ContextState {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("info", &self.inner.info)
            .field("bound", &self.inner.binding.get().is_some())
            .finish()
    }
}
