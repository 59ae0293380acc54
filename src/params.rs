//! Parameter registry: public names for instance fields.
//!
//! A field annotated as a parameter becomes available to `$name`
//! placeholders in test names and step labels. The registry only stores the
//! mapping; values are read from an instance every time a context is built.

use std::collections::BTreeMap;
use std::fmt;

use crate::object::Object;
use crate::template::{NamedParam, ParamContext};
use crate::value::Formatter;

/// Where a public parameter name reads its value from.
#[derive(Clone)]
pub struct ParamDef {
    pub field: String,
    pub formatter: Option<Formatter>,
}

impl fmt::Debug for ParamDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDef")
            .field("field", &self.field)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Maps public names to [`ParamDef`]s.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    entries: BTreeMap<String, ParamDef>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter. Returns false if the public name was already
    /// taken in this registry, in which case nothing changes.
    pub fn define(
        &mut self,
        public_name: &str,
        field: &str,
        formatter: Option<Formatter>,
    ) -> bool {
        if self.entries.contains_key(public_name) {
            return false;
        }
        self.entries.insert(
            public_name.to_string(),
            ParamDef {
                field: field.to_string(),
                formatter,
            },
        );
        true
    }

    /// Layers a more derived class's parameters over this one. Entries of
    /// `child` replace entries with the same public name.
    pub fn overlay(&mut self, child: &ParamRegistry) {
        for (name, def) in &child.entries {
            self.entries.insert(name.clone(), def.clone());
        }
    }

    pub fn get(&self, public_name: &str) -> Option<&ParamDef> {
        self.entries.get(public_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a context by reading every registered field from `instance`
    /// now. Fields that were never set read as nil.
    pub fn context_for(&self, instance: &Object) -> ParamContext {
        self.entries
            .iter()
            .map(|(name, def)| {
                let param = NamedParam {
                    value: instance.get_or_nil(&def.field),
                    formatter: def.formatter.clone(),
                };
                (name.clone(), param)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::render;
    use crate::value::{formatter, Value};

    #[test]
    fn test_child_overrides_by_public_name() {
        let mut base = ParamRegistry::new();
        base.define("user", "userName", None);
        base.define("env", "environment", None);
        let mut child = ParamRegistry::new();
        child.define("user", "login", None);

        base.overlay(&child);
        assert_eq!(base.get("user").map(|d| d.field.as_str()), Some("login"));
        assert_eq!(base.get("env").map(|d| d.field.as_str()), Some("environment"));
    }

    #[test]
    fn test_duplicate_define_is_rejected() {
        let mut params = ParamRegistry::new();
        assert!(params.define("user", "a", None));
        assert!(!params.define("user", "b", None));
        assert_eq!(params.get("user").map(|d| d.field.as_str()), Some("a"));
    }

    #[test]
    fn test_context_reads_live_values() {
        let mut params = ParamRegistry::new();
        params.define(
            "user",
            "userName",
            Some(formatter(|v| format!("<{}>", v))),
        );
        let statics = Object::new_static("Login");
        let instance = Object::new_instance("Login", &statics);
        instance.set("userName", "ann");
        let first = render("as $user", &[], &params.context_for(&instance), &[]).unwrap();
        instance.set("userName", Value::from("bob"));
        let second = render("as $user", &[], &params.context_for(&instance), &[]).unwrap();
        assert_eq!(first, "as <ann>");
        assert_eq!(second, "as <bob>");
    }
}
