//! Class declarations: the annotation surface of a suite.
//!
//! Classes live in a [`ClassRegistry`] arena and refer to their parent by
//! [`ClassId`]. A class is declared with a [`ClassBuilder`]; each builder call
//! corresponds to one annotation on a member or field. Nothing runs at
//! declaration time, the calls only record intent.
//!
//! ```rust
//! use suitecraft::class::ClassRegistry;
//! use suitecraft::args;
//!
//! let mut registry = ClassRegistry::new();
//! let base = registry
//!     .declare("Db")
//!     .before_each("openConn", |this, _call| async move {
//!         this.set("conn", "open");
//!         Ok(())
//!     })
//!     .finish()
//!     .unwrap();
//! let math = registry
//!     .declare("Math")
//!     .extends(base)
//!     .test_each("adds", "$0+$1=$2", vec![args![1, 2, 3], args![2, 2, 4]], |_this, call| async move {
//!         let sum = call.arg(0).as_number().unwrap_or(0.0) + call.arg(1).as_number().unwrap_or(0.0);
//!         assert_eq!(call.arg(2).as_number(), Some(sum));
//!         Ok(())
//!     })
//!     .finish()
//!     .unwrap();
//! assert_eq!(registry.get(math).map(|c| c.chain().len()), Some(2));
//! ```
//!
//! ## Registry Invariant
//! A class's ancestor chain is computed once, when the class is finished,
//! and never changes afterwards. Parents must be finished before children,
//! so chains cannot contain cycles.

pub mod members;
pub mod modifiers;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::diagnostics::{DeclarationError, Failure};
use crate::object::Object;
use crate::params::ParamRegistry;
use crate::value::{Formatter, Value};

pub use members::{
    data_provider, instance_method, static_method, Call, Constructor, DataProvider, HookLists,
    HookTier, InstanceMethod, LabeledHook, MethodFuture, PerTestHooks, ProviderOutput,
    StaticMethod, TestEntry, TestKind, MAX_FORMATTER_INDEX,
};
pub use modifiers::{Condition, Marker, ModifierTables, Modifiers, ResolvedModifiers};

/// Index of a class in its [`ClassRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Everything one class declares itself. Inherited declarations are not
/// copied here; they are merged by [`aggregate`](crate::aggregate::aggregate).
#[derive(Clone)]
pub struct ClassDecl {
    id: ClassId,
    name: String,
    parent: Option<ClassId>,
    chain: Arc<[ClassId]>,
    pub(crate) fields: Vec<(String, Value)>,
    pub(crate) static_fields: Vec<(String, Value)>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) methods: BTreeMap<String, InstanceMethod>,
    pub(crate) static_methods: BTreeMap<String, StaticMethod>,
    pub(crate) hooks: HookLists,
    pub(crate) tests: Vec<TestEntry>,
    pub(crate) per_test_hooks: BTreeMap<String, PerTestHooks>,
    pub(crate) params: ParamRegistry,
    pub(crate) modifiers: ModifierTables,
}

impl ClassDecl {
    fn empty(name: &str) -> Self {
        Self {
            id: ClassId(usize::MAX),
            name: name.to_string(),
            parent: None,
            chain: Arc::from(Vec::new()),
            fields: Vec::new(),
            static_fields: Vec::new(),
            constructor: None,
            methods: BTreeMap::new(),
            static_methods: BTreeMap::new(),
            hooks: HookLists::default(),
            tests: Vec::new(),
            per_test_hooks: BTreeMap::new(),
            params: ParamRegistry::new(),
            modifiers: ModifierTables::default(),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// Ancestor chain, root first, ending with this class.
    pub fn chain(&self) -> &[ClassId] {
        &self.chain
    }

    pub fn own_hooks(&self) -> &HookLists {
        &self.hooks
    }

    pub fn own_tests(&self) -> &[TestEntry] {
        &self.tests
    }

    pub fn declares_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn declares_static_method(&self, name: &str) -> bool {
        self.static_methods.contains_key(name)
    }
}

/// Arena of class declarations.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassDecl>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts declaring a class.
    pub fn declare(&mut self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder {
            registry: self,
            decl: ClassDecl::empty(name),
            pending_parent: None,
            error: None,
        }
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDecl> {
        self.classes.get(id.0)
    }

    /// Finds the most recently declared class with this name.
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.classes.iter().rev().find(|c| c.name == name).map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.iter()
    }
}

/// Records the annotations of one class. Call [`finish`](Self::finish) to
/// add it to the registry.
pub struct ClassBuilder<'r> {
    registry: &'r mut ClassRegistry,
    decl: ClassDecl,
    pending_parent: Option<usize>,
    error: Option<DeclarationError>,
}

impl<'r> ClassBuilder<'r> {
    pub fn extends(mut self, parent: ClassId) -> Self {
        self.pending_parent = Some(parent.0);
        self
    }

    // ------------------------------------------------------------------------
    // Fields and members
    // ------------------------------------------------------------------------

    /// Instance field initializer.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.decl.fields.push((name.to_string(), value.into()));
        self
    }

    /// Static (suite-scoped) field initializer.
    pub fn static_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.decl.static_fields.push((name.to_string(), value.into()));
        self
    }

    /// Constructor body, run after this class's field initializers.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Object) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.decl.constructor = Some(Arc::new(f));
        self
    }

    pub fn method<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.decl
            .methods
            .insert(name.to_string(), instance_method(f));
        self
    }

    pub fn static_method<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Object) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.decl
            .static_methods
            .insert(name.to_string(), static_method(f));
        self
    }

    // ------------------------------------------------------------------------
    // Hook annotations
    // ------------------------------------------------------------------------

    /// Annotates a member, declared here or inherited, as a hook of `tier`.
    pub fn hook(mut self, tier: HookTier, member: &str) -> Self {
        self.decl.hooks.get_mut(tier).push(member.to_string());
        self
    }

    pub fn before_all<F, Fut>(self, member: &str, f: F) -> Self
    where
        F: Fn(Object) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.static_method(member, f)
            .hook(HookTier::SuiteSetup, member)
    }

    pub fn after_all<F, Fut>(self, member: &str, f: F) -> Self
    where
        F: Fn(Object) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.static_method(member, f)
            .hook(HookTier::SuiteTeardown, member)
    }

    pub fn before_each<F, Fut>(self, member: &str, f: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.method(member, f).hook(HookTier::PerTestSetup, member)
    }

    pub fn after_each<F, Fut>(self, member: &str, f: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.method(member, f)
            .hook(HookTier::PerTestTeardown, member)
    }

    // ------------------------------------------------------------------------
    // Test annotations
    // ------------------------------------------------------------------------

    pub fn test<F, Fut>(self, member: &str, name: &str, body: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.method(member, body)
            .push_test(TestEntry::new(member, name, TestKind::Single))
    }

    /// Parameterized test over a literal sequence of argument tuples.
    pub fn test_each<F, Fut>(
        self,
        member: &str,
        name_template: &str,
        tuples: Vec<Vec<Value>>,
        body: F,
    ) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.method(member, body).push_test(TestEntry::new(
            member,
            name_template,
            TestKind::StaticEach(tuples),
        ))
    }

    /// Parameterized test whose tuples come from `provider`, called on a
    /// throwaway instance while the suite is assembled.
    pub fn test_each_with<P, O, F, Fut>(
        self,
        member: &str,
        name_template: &str,
        provider: P,
        body: F,
    ) -> Self
    where
        P: Fn(&Object) -> Result<O, Failure> + Send + Sync + 'static,
        O: Into<ProviderOutput>,
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.method(member, body).push_test(TestEntry::new(
            member,
            name_template,
            TestKind::DeferredEach(data_provider(provider)),
        ))
    }

    /// Custom formatter for positional placeholder `index` of this class's
    /// test entry for `member`.
    pub fn positional_formatter(mut self, member: &str, index: usize, formatter: Formatter) -> Self {
        match self.decl.tests.iter_mut().find(|t| t.member == member) {
            Some(entry) => {
                if !entry.set_formatter(index, formatter) {
                    tracing::warn!(
                        class = %self.decl.name,
                        member,
                        index,
                        max = MAX_FORMATTER_INDEX,
                        "positional formatter index too large, ignored"
                    );
                }
            }
            None => tracing::warn!(
                class = %self.decl.name,
                member,
                "positional formatter for a member with no test entry in this class"
            ),
        }
        self
    }

    fn push_test(mut self, entry: TestEntry) -> Self {
        if self.decl.tests.iter().any(|t| t.member == entry.member) {
            self.record(DeclarationError::DuplicateTest {
                class: self.decl.name.clone(),
                member: entry.member,
            });
            return self;
        }
        self.decl.tests.push(entry);
        self
    }

    // ------------------------------------------------------------------------
    // Per-test-specific hooks
    // ------------------------------------------------------------------------

    /// Hook run before the body of `member`. Calls are listed outermost first.
    pub fn before<F, Fut>(mut self, member: &str, label: &str, f: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.decl
            .per_test_hooks
            .entry(member.to_string())
            .or_default()
            .attach_pre(LabeledHook {
                label: label.to_string(),
                run: instance_method(f),
            });
        self
    }

    /// Hook run after the body of `member`, even if it failed. Calls are
    /// listed outermost first, so the last one listed runs first.
    pub fn after<F, Fut>(mut self, member: &str, label: &str, f: F) -> Self
    where
        F: Fn(Object, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.decl
            .per_test_hooks
            .entry(member.to_string())
            .or_default()
            .attach_post(LabeledHook {
                label: label.to_string(),
                run: instance_method(f),
            });
        self
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    /// Exposes `field` to `$public_name` placeholders.
    pub fn param(self, field: &str, public_name: &str) -> Self {
        self.define_param(field, public_name, None)
    }

    pub fn param_with(self, field: &str, public_name: &str, formatter: Formatter) -> Self {
        self.define_param(field, public_name, Some(formatter))
    }

    fn define_param(mut self, field: &str, public_name: &str, formatter: Option<Formatter>) -> Self {
        if !self.decl.params.define(public_name, field, formatter) {
            self.record(DeclarationError::DuplicateParameter {
                class: self.decl.name.clone(),
                name: public_name.to_string(),
            });
        }
        self
    }

    // ------------------------------------------------------------------------
    // Side tables
    // ------------------------------------------------------------------------

    pub fn tag(mut self, member: &str, tag: &str) -> Self {
        self.decl.modifiers.entry(member).tags.push(tag.to_string());
        self
    }

    pub fn skip(self, member: &str, reason: Option<&str>) -> Self {
        self.skip_if(member, Condition::Always, reason)
    }

    pub fn skip_if(mut self, member: &str, condition: Condition, reason: Option<&str>) -> Self {
        self.decl.modifiers.entry(member).skip = Some(Marker::new(condition, reason));
        self
    }

    pub fn fixme(self, member: &str, reason: Option<&str>) -> Self {
        self.fixme_if(member, Condition::Always, reason)
    }

    pub fn fixme_if(mut self, member: &str, condition: Condition, reason: Option<&str>) -> Self {
        self.decl.modifiers.entry(member).fixme = Some(Marker::new(condition, reason));
        self
    }

    pub fn slow(self, member: &str) -> Self {
        self.slow_if(member, Condition::Always)
    }

    pub fn slow_if(mut self, member: &str, condition: Condition) -> Self {
        self.decl.modifiers.entry(member).slow = Some(Marker::new(condition, None));
        self
    }

    pub fn annotate(mut self, member: &str, kind: &str, description: Option<&str>) -> Self {
        self.decl
            .modifiers
            .entry(member)
            .annotations
            .push(modifiers::Annotation {
                kind: kind.to_string(),
                description: description.map(str::to_string),
            });
        self
    }

    pub fn attach(mut self, member: &str, name: &str, content_type: &str, body: &str) -> Self {
        self.decl
            .modifiers
            .entry(member)
            .attachments
            .push(modifiers::Attachment {
                name: name.to_string(),
                content_type: content_type.to_string(),
                body: body.to_string(),
            });
        self
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    fn record(&mut self, error: DeclarationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validates the declaration, computes its ancestor chain and adds it to
    /// the registry.
    ///
    /// # Errors
    /// Returns the first [`DeclarationError`] recorded by the builder calls,
    /// or [`DeclarationError::UnknownParent`] if `extends` named a class that
    /// is not in the registry.
    pub fn finish(self) -> Result<ClassId, DeclarationError> {
        let ClassBuilder {
            registry,
            mut decl,
            pending_parent,
            error,
        } = self;
        if let Some(error) = error {
            return Err(error);
        }

        let id = ClassId(registry.classes.len());
        let mut chain = Vec::new();
        if let Some(parent) = pending_parent {
            let parent_decl = registry.classes.get(parent).ok_or_else(|| {
                DeclarationError::UnknownParent {
                    class: decl.name.clone(),
                    parent,
                }
            })?;
            chain.extend_from_slice(&parent_decl.chain);
            decl.parent = Some(parent_decl.id);
        }
        chain.push(id);

        decl.id = id;
        decl.chain = Arc::from(chain);
        tracing::debug!(class = %decl.name, depth = decl.chain.len(), "class declared");
        registry.classes.push(decl);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_this: Object, _call: Call) -> Result<(), Failure> {
        Ok(())
    }

    #[test]
    fn test_chain_is_root_first() {
        let mut registry = ClassRegistry::new();
        let a = registry.declare("A").finish().unwrap();
        let b = registry.declare("B").extends(a).finish().unwrap();
        let c = registry.declare("C").extends(b).finish().unwrap();
        assert_eq!(registry.get(c).unwrap().chain(), &[a, b, c]);
        assert_eq!(registry.get(c).unwrap().parent(), Some(b));
        assert_eq!(registry.find("B"), Some(b));
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let mut other = ClassRegistry::new();
        other.declare("X").finish().unwrap();
        let stray = other.declare("Y").finish().unwrap();

        let mut registry = ClassRegistry::new();
        let err = registry.declare("Z").extends(stray).finish().unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UnknownParent {
                class: "Z".to_string(),
                parent: 1
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_test_member_is_rejected() {
        let mut registry = ClassRegistry::new();
        let err = registry
            .declare("Dup")
            .test("a", "first", noop)
            .test("a", "second", noop)
            .finish()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateTest { .. }));
    }

    #[test]
    fn test_duplicate_parameter_is_rejected() {
        let mut registry = ClassRegistry::new();
        let err = registry
            .declare("Dup")
            .param("a", "user")
            .param("b", "user")
            .finish()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateParameter { .. }));
    }

    #[test]
    fn test_post_hooks_are_inserted_in_reverse() {
        let mut registry = ClassRegistry::new();
        let id = registry
            .declare("Tx")
            .before("t", "open", noop)
            .after("t", "release-open", noop)
            .before("t", "begin", noop)
            .after("t", "release-begin", noop)
            .test("t", "tx", noop)
            .finish()
            .unwrap();
        let hooks = &registry.get(id).unwrap().per_test_hooks["t"];
        assert_eq!(hooks.pre_labels(), vec!["open", "begin"]);
        assert_eq!(hooks.post_labels(), vec!["release-begin", "release-open"]);
    }

    #[test]
    fn test_oversized_formatter_index_is_ignored() {
        let mut registry = ClassRegistry::new();
        let id = registry
            .declare("Fmt")
            .test_each("t", "$0", vec![vec![Value::from(1)]], noop)
            .positional_formatter("t", usize::MAX, crate::value::formatter(|v| v.to_string()))
            .positional_formatter("t", MAX_FORMATTER_INDEX + 1, crate::value::formatter(|v| v.to_string()))
            .positional_formatter("t", 1, crate::value::formatter(|v| v.to_string()))
            .finish()
            .unwrap();
        let entry = &registry.get(id).unwrap().own_tests()[0];
        assert_eq!(entry.formatters.len(), 2);
        assert!(entry.formatters[0].is_none());
        assert!(entry.formatters[1].is_some());
    }
}
