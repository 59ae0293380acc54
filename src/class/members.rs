//! Callable members and the records annotations leave behind.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::TestContext;
use crate::diagnostics::Failure;
use crate::object::Object;
use crate::value::{Formatter, Value};

// ============================================================================
// Callables
// ============================================================================

pub type MethodFuture = BoxFuture<'static, Result<(), Failure>>;

/// Arguments of an instance-side call.
#[derive(Clone)]
pub struct Call {
    /// The argument tuple of the test unit. Empty for single tests and for
    /// class-wide hooks.
    pub args: Vec<Value>,
    pub context: TestContext,
}

impl Call {
    /// Argument at `index`, or nil.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// An instance method: test bodies, per-test hooks and per-test-specific hooks.
pub type InstanceMethod = Arc<dyn Fn(Object, Call) -> MethodFuture + Send + Sync>;

/// A static method, run against the suite's statics object.
pub type StaticMethod = Arc<dyn Fn(Object) -> MethodFuture + Send + Sync>;

/// Runs once per constructed instance, after that level's field initializers.
pub type Constructor = Arc<dyn Fn(&Object) -> Result<(), Failure> + Send + Sync>;

/// Computes argument tuples from a freshly constructed instance.
pub type DataProvider = Arc<dyn Fn(&Object) -> Result<ProviderOutput, Failure> + Send + Sync>;

pub fn instance_method<F, Fut>(f: F) -> InstanceMethod
where
    F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Failure>> + Send + 'static,
{
    Arc::new(move |this, call| f(this, call).boxed())
}

pub fn static_method<F, Fut>(f: F) -> StaticMethod
where
    F: Fn(Object) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Failure>> + Send + 'static,
{
    Arc::new(move |statics| f(statics).boxed())
}

/// What a data provider hands back.
pub enum ProviderOutput {
    Ready(Vec<Vec<Value>>),
    /// A computation that has not finished yet. Assembly rejects it.
    Pending(BoxFuture<'static, Vec<Vec<Value>>>),
}

impl ProviderOutput {
    /// Wraps a future, marking the provider as asynchronous.
    pub fn pending<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Vec<Vec<Value>>> + Send + 'static,
    {
        ProviderOutput::Pending(fut.boxed())
    }
}

impl From<Vec<Vec<Value>>> for ProviderOutput {
    fn from(tuples: Vec<Vec<Value>>) -> Self {
        ProviderOutput::Ready(tuples)
    }
}

pub fn data_provider<F, O>(f: F) -> DataProvider
where
    F: Fn(&Object) -> Result<O, Failure> + Send + Sync + 'static,
    O: Into<ProviderOutput>,
{
    Arc::new(move |this: &Object| f(this).map(Into::into))
}

// ============================================================================
// Hook tiers
// ============================================================================

/// The four class-wide hook tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTier {
    SuiteSetup,
    PerTestSetup,
    PerTestTeardown,
    SuiteTeardown,
}

impl HookTier {
    pub const ALL: [HookTier; 4] = [
        HookTier::SuiteSetup,
        HookTier::PerTestSetup,
        HookTier::PerTestTeardown,
        HookTier::SuiteTeardown,
    ];

    /// Suite tiers resolve on the static surface, per-test tiers on the instance.
    pub fn is_static(&self) -> bool {
        matches!(self, HookTier::SuiteSetup | HookTier::SuiteTeardown)
    }
}

impl fmt::Display for HookTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookTier::SuiteSetup => "before_all",
            HookTier::PerTestSetup => "before_each",
            HookTier::PerTestTeardown => "after_each",
            HookTier::SuiteTeardown => "after_all",
        };
        f.write_str(name)
    }
}

/// Member names annotated for each tier, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookLists {
    pub suite_setup: Vec<String>,
    pub per_test_setup: Vec<String>,
    pub per_test_teardown: Vec<String>,
    pub suite_teardown: Vec<String>,
}

impl HookLists {
    pub fn get(&self, tier: HookTier) -> &[String] {
        match tier {
            HookTier::SuiteSetup => &self.suite_setup,
            HookTier::PerTestSetup => &self.per_test_setup,
            HookTier::PerTestTeardown => &self.per_test_teardown,
            HookTier::SuiteTeardown => &self.suite_teardown,
        }
    }

    pub fn get_mut(&mut self, tier: HookTier) -> &mut Vec<String> {
        match tier {
            HookTier::SuiteSetup => &mut self.suite_setup,
            HookTier::PerTestSetup => &mut self.per_test_setup,
            HookTier::PerTestTeardown => &mut self.per_test_teardown,
            HookTier::SuiteTeardown => &mut self.suite_teardown,
        }
    }

    pub fn is_empty(&self) -> bool {
        HookTier::ALL.iter().all(|tier| self.get(*tier).is_empty())
    }
}

// ============================================================================
// Per-test-specific hooks
// ============================================================================

/// A hook attached to a single test member.
#[derive(Clone)]
pub struct LabeledHook {
    pub label: String,
    pub run: InstanceMethod,
}

impl fmt::Debug for LabeledHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LabeledHook").field(&self.label).finish()
    }
}

/// Hooks wrapped around one test member.
///
/// Annotations are attached in source order, outermost first. A `pre` hook
/// is appended, so outer hooks run before inner ones. A `post` hook is
/// inserted at the front, so inner hooks are released before outer ones.
#[derive(Debug, Clone, Default)]
pub struct PerTestHooks {
    pub pre: Vec<LabeledHook>,
    pub post: Vec<LabeledHook>,
}

impl PerTestHooks {
    pub fn attach_pre(&mut self, hook: LabeledHook) {
        self.pre.push(hook);
    }

    pub fn attach_post(&mut self, hook: LabeledHook) {
        self.post.insert(0, hook);
    }

    pub fn extend(&mut self, other: &PerTestHooks) {
        self.pre.extend(other.pre.iter().cloned());
        self.post.extend(other.post.iter().cloned());
    }

    pub fn pre_labels(&self) -> Vec<&str> {
        self.pre.iter().map(|h| h.label.as_str()).collect()
    }

    pub fn post_labels(&self) -> Vec<&str> {
        self.post.iter().map(|h| h.label.as_str()).collect()
    }
}

// ============================================================================
// Test entries
// ============================================================================

/// How a test entry expands into units.
#[derive(Clone)]
pub enum TestKind {
    Single,
    /// Argument tuples supplied with the annotation.
    StaticEach(Vec<Vec<Value>>),
    /// Argument tuples computed from a throwaway instance during assembly.
    DeferredEach(DataProvider),
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Single => "single",
            TestKind::StaticEach(_) => "static-each",
            TestKind::DeferredEach(_) => "deferred-each",
        }
    }
}

impl fmt::Debug for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::StaticEach(tuples) => write!(f, "StaticEach({} tuples)", tuples.len()),
            other => f.write_str(other.label()),
        }
    }
}

/// Largest positional index a custom formatter can be attached to.
pub const MAX_FORMATTER_INDEX: usize = 255;

/// A test annotation on a member.
#[derive(Clone)]
pub struct TestEntry {
    pub member: String,
    pub name_template: String,
    pub kind: TestKind,
    /// Custom formatters for positional placeholders, indexed like the tuple.
    pub formatters: Vec<Option<Formatter>>,
}

impl TestEntry {
    pub fn new(member: &str, name_template: &str, kind: TestKind) -> Self {
        Self {
            member: member.to_string(),
            name_template: name_template.to_string(),
            kind,
            formatters: Vec::new(),
        }
    }

    /// Attaches a formatter to one position. Returns false, changing
    /// nothing, if `index` is above [`MAX_FORMATTER_INDEX`].
    pub fn set_formatter(&mut self, index: usize, formatter: Formatter) -> bool {
        if index > MAX_FORMATTER_INDEX {
            return false;
        }
        if self.formatters.len() <= index {
            self.formatters.resize(index + 1, None);
        }
        self.formatters[index] = Some(formatter);
        true
    }
}

impl fmt::Debug for TestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestEntry")
            .field("member", &self.member)
            .field("name_template", &self.name_template)
            .field("kind", &self.kind)
            .finish()
    }
}
