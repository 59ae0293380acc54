//! Metadata aggregation over a class's ancestor chain.
//!
//! Every class only records what it declares itself. [`aggregate`] walks the
//! precomputed chain root first and merges those declarations:
//!
//! - hook lists are concatenated, ancestor first, declaration order within a
//!   level;
//! - parameters and side-table markers are replaced by the nearest
//!   declaration; tags, annotations and attachments are concatenated;
//! - test entries are concatenated, and a child entry for a member the
//!   ancestor already tests takes the ancestor entry's place;
//! - members (methods) are overridden by the nearest declaration, the same
//!   way a method lookup would find them.
//!
//! Hook names are then checked against the merged member tables; a name that
//! resolves to nothing is dropped with a warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::class::{
    ClassDecl, ClassId, ClassRegistry, Constructor, HookLists, HookTier, InstanceMethod,
    ModifierTables, PerTestHooks, StaticMethod, TestEntry,
};
use crate::diagnostics::{AssemblyError, Failure};
use crate::object::Object;
use crate::params::ParamRegistry;
use crate::value::Value;

/// Field initializers and constructor of one level of the chain.
#[derive(Clone)]
struct Layer {
    class_name: String,
    fields: Vec<(String, Value)>,
    constructor: Option<Constructor>,
}

/// The merged view of a class and all of its ancestors.
#[derive(Clone)]
pub struct ClassMetadata {
    pub class: ClassId,
    pub name: String,
    pub chain: Arc<[ClassId]>,
    pub tests: Vec<TestEntry>,
    pub hooks: HookLists,
    pub per_test_hooks: BTreeMap<String, PerTestHooks>,
    pub parameters: ParamRegistry,
    pub modifiers: ModifierTables,
    methods: BTreeMap<String, InstanceMethod>,
    static_methods: BTreeMap<String, StaticMethod>,
    static_fields: BTreeMap<String, Value>,
    layers: Vec<Layer>,
}

impl ClassMetadata {
    /// Resolves an instance member, child-most declaration first.
    pub fn method(&self, name: &str) -> Option<&InstanceMethod> {
        self.methods.get(name)
    }

    /// Resolves a static member, child-most declaration first.
    pub fn static_method(&self, name: &str) -> Option<&StaticMethod> {
        self.static_methods.get(name)
    }

    /// Per-test-specific hooks of a member; empty if none were declared.
    pub fn per_test_hooks_for(&self, member: &str) -> PerTestHooks {
        self.per_test_hooks.get(member).cloned().unwrap_or_default()
    }

    /// Creates the suite's statics object from the merged static fields.
    pub fn construct_statics(&self) -> Object {
        let statics = Object::new_static(&self.name);
        for (name, value) in &self.static_fields {
            statics.set(name, value.clone());
        }
        statics
    }

    /// Constructs a fresh instance without arguments: for each level, root
    /// first, the field initializers run and then that level's constructor.
    ///
    /// # Errors
    /// Returns the first constructor failure, annotated with the class whose
    /// constructor failed.
    pub fn construct(&self, statics: &Object) -> Result<Object, Failure> {
        let instance = Object::new_instance(&self.name, statics);
        for layer in &self.layers {
            for (name, value) in &layer.fields {
                instance.set(name, value.clone());
            }
            if let Some(constructor) = &layer.constructor {
                constructor(&instance).map_err(|failure| Failure {
                    message: format!("{}: {}", layer.class_name, failure.message),
                    ..failure
                })?;
            }
        }
        Ok(instance)
    }
}

impl std::fmt::Debug for ClassMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("name", &self.name)
            .field("chain", &self.chain)
            .field("tests", &self.tests)
            .field("hooks", &self.hooks)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Merges the declarations of `class` and its ancestors.
///
/// # Errors
/// Returns [`AssemblyError::UnknownClass`] if `class` (or a class in its
/// chain) is not part of `registry`.
pub fn aggregate(registry: &ClassRegistry, class: ClassId) -> Result<ClassMetadata, AssemblyError> {
    let target = lookup(registry, class)?;
    let chain: Arc<[ClassId]> = Arc::from(target.chain());

    let mut meta = ClassMetadata {
        class,
        name: target.name().to_string(),
        chain: chain.clone(),
        tests: Vec::new(),
        hooks: HookLists::default(),
        per_test_hooks: BTreeMap::new(),
        parameters: ParamRegistry::new(),
        modifiers: ModifierTables::default(),
        methods: BTreeMap::new(),
        static_methods: BTreeMap::new(),
        static_fields: BTreeMap::new(),
        layers: Vec::with_capacity(chain.len()),
    };

    for id in chain.iter() {
        let level = lookup(registry, *id)?;
        tracing::debug!(class = %meta.name, level = %level.name(), "merging declarations");
        merge_level(&mut meta, level);
    }

    drop_unresolved_hooks(&mut meta);
    drop_unresolved_tests(&mut meta);
    Ok(meta)
}

fn lookup(registry: &ClassRegistry, id: ClassId) -> Result<&ClassDecl, AssemblyError> {
    registry
        .get(id)
        .filter(|decl| decl.id() == id)
        .ok_or(AssemblyError::UnknownClass { index: id.index() })
}

fn merge_level(meta: &mut ClassMetadata, level: &ClassDecl) {
    for tier in HookTier::ALL {
        meta.hooks
            .get_mut(tier)
            .extend(level.hooks.get(tier).iter().cloned());
    }

    for entry in &level.tests {
        match meta.tests.iter_mut().find(|t| t.member == entry.member) {
            Some(existing) => *existing = entry.clone(),
            None => meta.tests.push(entry.clone()),
        }
    }

    for (member, hooks) in &level.per_test_hooks {
        meta.per_test_hooks
            .entry(member.clone())
            .or_default()
            .extend(hooks);
    }

    meta.parameters.overlay(&level.params);
    meta.modifiers.overlay(&level.modifiers);

    for (name, method) in &level.methods {
        meta.methods.insert(name.clone(), method.clone());
    }
    for (name, method) in &level.static_methods {
        meta.static_methods.insert(name.clone(), method.clone());
    }
    for (name, value) in &level.static_fields {
        meta.static_fields.insert(name.clone(), value.clone());
    }

    meta.layers.push(Layer {
        class_name: level.name().to_string(),
        fields: level.fields.clone(),
        constructor: level.constructor.clone(),
    });
}

fn drop_unresolved_hooks(meta: &mut ClassMetadata) {
    for tier in HookTier::ALL {
        let names = std::mem::take(meta.hooks.get_mut(tier));
        let resolved: Vec<String> = names
            .into_iter()
            .filter(|name| {
                let found = if tier.is_static() {
                    meta.static_methods.contains_key(name)
                } else {
                    meta.methods.contains_key(name)
                };
                if !found {
                    tracing::warn!(class = %meta.name, %tier, hook = %name, "dropping hook that resolves to no member");
                }
                found
            })
            .collect();
        *meta.hooks.get_mut(tier) = resolved;
    }
}

fn drop_unresolved_tests(meta: &mut ClassMetadata) {
    let methods = &meta.methods;
    let name = &meta.name;
    meta.tests.retain(|entry| {
        let found = methods.contains_key(&entry.member);
        if !found {
            tracing::warn!(class = %name, member = %entry.member, "dropping test whose body resolves to no member");
        }
        found
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Call;
    use crate::fail;

    async fn noop(_this: Object, _call: Call) -> Result<(), Failure> {
        Ok(())
    }

    #[test]
    fn test_construction_runs_levels_root_first() {
        let mut registry = ClassRegistry::new();
        let base = registry
            .declare("Base")
            .field("trace", "base-field")
            .constructor(|this| {
                let prior = this.get_or_nil("trace");
                this.set("trace", format!("{}>base-ctor", prior));
                Ok(())
            })
            .finish()
            .unwrap();
        let child = registry
            .declare("Child")
            .extends(base)
            .constructor(|this| {
                let prior = this.get_or_nil("trace");
                this.set("trace", format!("{}>child-ctor", prior));
                Ok(())
            })
            .finish()
            .unwrap();
        let meta = aggregate(&registry, child).unwrap();
        let instance = meta.construct(&meta.construct_statics()).unwrap();
        assert_eq!(
            instance.get_or_nil("trace"),
            Value::from("base-field>base-ctor>child-ctor")
        );
    }

    #[test]
    fn test_constructor_failure_names_the_level() {
        let mut registry = ClassRegistry::new();
        let id = registry
            .declare("Broken")
            .constructor(|_| Err(fail!("no database")))
            .finish()
            .unwrap();
        let meta = aggregate(&registry, id).unwrap();
        let err = meta.construct(&meta.construct_statics()).unwrap_err();
        assert_eq!(err.message, "Broken: no database");
    }

    #[test]
    fn test_child_test_entry_replaces_in_place() {
        let mut registry = ClassRegistry::new();
        let base = registry
            .declare("Base")
            .test("first", "base first", noop)
            .test("second", "base second", noop)
            .finish()
            .unwrap();
        let child = registry
            .declare("Child")
            .extends(base)
            .test("first", "child first", noop)
            .test("third", "child third", noop)
            .finish()
            .unwrap();
        let meta = aggregate(&registry, child).unwrap();
        let names: Vec<_> = meta.tests.iter().map(|t| t.name_template.as_str()).collect();
        assert_eq!(names, vec!["child first", "base second", "child third"]);
    }

    #[test]
    fn test_static_fields_nearest_wins() {
        let mut registry = ClassRegistry::new();
        let base = registry
            .declare("Base")
            .static_field("url", "http://base")
            .static_field("retries", 1)
            .finish()
            .unwrap();
        let child = registry
            .declare("Child")
            .extends(base)
            .static_field("url", "http://child")
            .finish()
            .unwrap();
        let statics = aggregate(&registry, child).unwrap().construct_statics();
        assert_eq!(statics.get_or_nil("url"), Value::from("http://child"));
        assert_eq!(statics.get_or_nil("retries"), Value::from(1));
    }
}
