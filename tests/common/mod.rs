//! Shared helpers for the integration tests: a call journal and a one-call
//! way to assemble and run suites on the local runner.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures::future::{ready, Ready};
use suitecraft::class::{Call, ClassId, ClassRegistry};
use suitecraft::driver::register_all;
use suitecraft::runner::{LocalRunner, RunOptions, RunSummary};
use suitecraft::{fail, AssemblyError, Failure, Object};

/// Records the order in which hooks and bodies are called.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// An instance-side hook that records `entry`.
    pub fn hook(&self, entry: &str) -> impl Fn(Object, Call) -> Ready<Result<(), Failure>> + Send + Sync + 'static {
        let journal = self.clone();
        let entry = entry.to_string();
        move |_this, _call| {
            journal.push(&entry);
            ready(Ok(()))
        }
    }

    /// An instance-side hook that records `entry` and then fails.
    pub fn failing(&self, entry: &str) -> impl Fn(Object, Call) -> Ready<Result<(), Failure>> + Send + Sync + 'static {
        let journal = self.clone();
        let entry = entry.to_string();
        move |_this, _call| {
            journal.push(&entry);
            ready(Err(fail!("{} failed", entry)))
        }
    }

    /// A static-side hook that records `entry`.
    pub fn static_hook(&self, entry: &str) -> impl Fn(Object) -> Ready<Result<(), Failure>> + Send + Sync + 'static {
        let journal = self.clone();
        let entry = entry.to_string();
        move |_statics| {
            journal.push(&entry);
            ready(Ok(()))
        }
    }

    /// A static-side hook that records `entry` and then fails.
    pub fn static_failing(&self, entry: &str) -> impl Fn(Object) -> Ready<Result<(), Failure>> + Send + Sync + 'static {
        let journal = self.clone();
        let entry = entry.to_string();
        move |_statics| {
            journal.push(&entry);
            ready(Err(fail!("{} failed", entry)))
        }
    }
}

/// Assembles `classes`, registers them on a fresh local runner and runs them.
pub fn run_suites(registry: &ClassRegistry, classes: &[ClassId], options: RunOptions) -> (RunSummary, Vec<AssemblyError>) {
    let mut runner = LocalRunner::new(options);
    let errors = register_all(registry, classes, &mut runner);
    (runner.run(), errors)
}

pub fn run_all(registry: &ClassRegistry, classes: &[ClassId]) -> RunSummary {
    let (summary, errors) = run_suites(registry, classes, RunOptions::default());
    assert!(errors.is_empty(), "unexpected assembly errors: {:?}", errors);
    summary
}
