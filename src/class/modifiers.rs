//! Per-test side tables: tags, skip, fixme, slow, annotations, attachments.
//!
//! Tables are keyed by the test's member name, never by its display name.
//! Conditions are evaluated against the live instance right before the body
//! runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::object::Object;

pub type Predicate = Arc<dyn Fn(&Object) -> bool + Send + Sync>;

/// When a marker applies.
#[derive(Clone)]
pub enum Condition {
    Always,
    When(Predicate),
}

impl Condition {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&Object) -> bool + Send + Sync + 'static,
    {
        Condition::When(Arc::new(predicate))
    }

    pub fn holds(&self, instance: &Object) -> bool {
        match self {
            Condition::Always => true,
            Condition::When(predicate) => predicate(instance),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("Always"),
            Condition::When(_) => f.write_str("When(..)"),
        }
    }
}

/// A skip, fixme or slow marker.
#[derive(Debug, Clone)]
pub struct Marker {
    pub condition: Condition,
    pub reason: Option<String>,
}

impl Marker {
    pub fn new(condition: Condition, reason: Option<&str>) -> Self {
        Self {
            condition,
            reason: reason.map(str::to_string),
        }
    }

    fn resolve(&self, instance: &Object, default_reason: &str) -> Option<String> {
        if !self.condition.holds(instance) {
            return None;
        }
        Some(
            self.reason
                .clone()
                .unwrap_or_else(|| default_reason.to_string()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub body: String,
}

/// Everything declared for one member.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    pub tags: Vec<String>,
    pub skip: Option<Marker>,
    pub fixme: Option<Marker>,
    pub slow: Option<Marker>,
    pub annotations: Vec<Annotation>,
    pub attachments: Vec<Attachment>,
}

impl Modifiers {
    /// Layers a more derived class's declarations on top. Lists are
    /// concatenated, markers are replaced.
    pub fn overlay(&mut self, child: &Modifiers) {
        self.tags.extend(child.tags.iter().cloned());
        if child.skip.is_some() {
            self.skip = child.skip.clone();
        }
        if child.fixme.is_some() {
            self.fixme = child.fixme.clone();
        }
        if child.slow.is_some() {
            self.slow = child.slow.clone();
        }
        self.annotations.extend(child.annotations.iter().cloned());
        self.attachments.extend(child.attachments.iter().cloned());
    }

    pub fn resolve(&self, instance: &Object) -> ResolvedModifiers {
        ResolvedModifiers {
            tags: self.tags.clone(),
            skip: self.skip.as_ref().and_then(|m| m.resolve(instance, "skipped")),
            fixme: self.fixme.as_ref().and_then(|m| m.resolve(instance, "fixme")),
            slow: self
                .slow
                .as_ref()
                .is_some_and(|m| m.condition.holds(instance)),
            annotations: self.annotations.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Side-table state for one test unit, after conditions were evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedModifiers {
    pub tags: Vec<String>,
    pub skip: Option<String>,
    pub fixme: Option<String>,
    pub slow: bool,
    pub annotations: Vec<Annotation>,
    pub attachments: Vec<Attachment>,
}

/// Side tables of a class, keyed by member name.
#[derive(Debug, Clone, Default)]
pub struct ModifierTables {
    by_member: BTreeMap<String, Modifiers>,
}

impl ModifierTables {
    pub fn entry(&mut self, member: &str) -> &mut Modifiers {
        self.by_member.entry(member.to_string()).or_default()
    }

    pub fn get(&self, member: &str) -> Option<&Modifiers> {
        self.by_member.get(member)
    }

    pub fn overlay(&mut self, child: &ModifierTables) {
        for (member, modifiers) in &child.by_member {
            self.entry(member).overlay(modifiers);
        }
    }

    /// Looks up `member` and evaluates its conditions against `instance`.
    pub fn resolve(&self, member: &str, instance: &Object) -> ResolvedModifiers {
        self.get(member)
            .map(|m| m.resolve(instance))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_concatenates_lists_and_replaces_markers() {
        let mut base = ModifierTables::default();
        base.entry("login").tags.push("@smoke".to_string());
        base.entry("login").skip = Some(Marker::new(Condition::Always, Some("base reason")));

        let mut child = ModifierTables::default();
        child.entry("login").tags.push("@auth".to_string());
        child.entry("login").skip = Some(Marker::new(Condition::Always, Some("child reason")));

        base.overlay(&child);
        let statics = Object::new_static("Login");
        let resolved = base.resolve("login", &Object::new_instance("Login", &statics));
        assert_eq!(resolved.tags, vec!["@smoke", "@auth"]);
        assert_eq!(resolved.skip.as_deref(), Some("child reason"));
    }

    #[test]
    fn test_conditions_read_live_state() {
        let mut tables = ModifierTables::default();
        tables.entry("upload").skip = Some(Marker::new(
            Condition::when(|this| this.get("offline").and_then(|v| v.as_bool()) == Some(true)),
            None,
        ));
        let statics = Object::new_static("Upload");
        let instance = Object::new_instance("Upload", &statics);
        assert_eq!(tables.resolve("upload", &instance).skip, None);
        instance.set("offline", true);
        assert_eq!(
            tables.resolve("upload", &instance).skip.as_deref(),
            Some("skipped")
        );
    }
}
