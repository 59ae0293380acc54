//! In-process runner implementing the [`Registrar`] surface.
//!
//! Suites run in registration order, tests in registration order, and every
//! hook is awaited before the next one starts. The runner is what the
//! harness CLI and the integration tests drive; any other runner only has
//! to implement [`Registrar`].
//!
//! ```rust
//! use suitecraft::class::ClassRegistry;
//! use suitecraft::driver::register_all;
//! use suitecraft::runner::{LocalRunner, RunOptions};
//!
//! let mut registry = ClassRegistry::new();
//! let id = registry
//!     .declare("Smoke")
//!     .test("ok", "passes", |_this, _call| async move { Ok(()) })
//!     .finish()
//!     .unwrap();
//!
//! let mut runner = LocalRunner::new(RunOptions::default());
//! assert!(register_all(&registry, &[id], &mut runner).is_empty());
//! let summary = runner.run();
//! assert_eq!(summary.passed, 1);
//! ```

pub mod summary;

use std::time::Instant;

use futures::executor::block_on;
use regex::Regex;
use tracing::Instrument;

use crate::context::{TestContext, TestInfo};
use crate::diagnostics::Failure;
use crate::driver::{EachHook, Registrar, SuiteHook};

pub use summary::{AssemblyReport, RunSummary, Status, SuiteFailure, TestOutcome};

/// Selection and stopping rules for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only tests whose `"<suite> > <title>"` matches are run.
    pub filter: Option<Regex>,
    /// Stop after the first failing test; the rest are reported skipped.
    pub fail_fast: bool,
}

impl RunOptions {
    fn selects(&self, info: &TestInfo) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |re| re.is_match(&info.full_title()))
    }
}

#[derive(Default)]
struct SuiteRecord {
    title: String,
    before_all: Vec<SuiteHook>,
    after_all: Vec<SuiteHook>,
    before_each: Vec<EachHook>,
    after_each: Vec<EachHook>,
    tests: Vec<(TestInfo, EachHook)>,
}

/// Collects registrations, then runs them with [`run`](Self::run).
#[derive(Default)]
pub struct LocalRunner {
    options: RunOptions,
    suites: Vec<SuiteRecord>,
    open: Option<SuiteRecord>,
}

impl LocalRunner {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Full titles of every selected test, in run order.
    pub fn listing(&self) -> Vec<String> {
        self.suites
            .iter()
            .flat_map(|suite| suite.tests.iter())
            .filter(|(info, _)| self.options.selects(info))
            .map(|(info, _)| info.full_title())
            .collect()
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    /// Runs everything registered so far on the current thread.
    pub fn run(self) -> RunSummary {
        block_on(self.run_async())
    }

    pub async fn run_async(mut self) -> RunSummary {
        self.close_suite();
        let mut summary = RunSummary::default();
        let mut stopped = false;

        for suite in std::mem::take(&mut self.suites) {
            let span = tracing::info_span!("suite", suite = %suite.title);
            stopped = self
                .run_suite(suite, stopped, &mut summary)
                .instrument(span)
                .await;
        }

        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
        summary
    }

    /// Returns whether fail-fast has been triggered.
    async fn run_suite(&self, suite: SuiteRecord, mut stopped: bool, summary: &mut RunSummary) -> bool {
        let selected: Vec<&(TestInfo, EachHook)> = suite
            .tests
            .iter()
            .filter(|(info, _)| self.options.selects(info))
            .collect();
        if selected.is_empty() {
            tracing::debug!("no selected tests, suite hooks not run");
            return stopped;
        }
        if stopped {
            for (info, _) in selected {
                summary.record(skipped(info, "not run after an earlier failure"));
            }
            return stopped;
        }

        let setup = run_suite_hooks(&suite.before_all, true).await;
        match setup {
            Err(failure) => {
                tracing::warn!(%failure, "suite setup failed");
                for (info, _) in selected {
                    let mut outcome = TestOutcome::new(info, Status::Failed);
                    outcome.failure = Some(failure.clone());
                    summary.record(outcome);
                }
                stopped = self.options.fail_fast;
            }
            Ok(()) => {
                for (info, body) in selected {
                    if stopped {
                        summary.record(skipped(info, "not run after an earlier failure"));
                        continue;
                    }
                    let span = tracing::info_span!("test", test = %info.title);
                    let outcome = run_test(&suite, info, body).instrument(span).await;
                    if outcome.status == Status::Failed && self.options.fail_fast {
                        stopped = true;
                    }
                    summary.record(outcome);
                }
            }
        }

        if let Err(failure) = run_suite_hooks(&suite.after_all, false).await {
            tracing::warn!(%failure, "suite teardown failed");
            summary.suite_failures.push(SuiteFailure {
                suite: suite.title.clone(),
                failure,
            });
        }
        stopped
    }
}

fn skipped(info: &TestInfo, reason: &str) -> TestOutcome {
    let mut outcome = TestOutcome::new(info, Status::Skipped);
    outcome.skip_reason = Some(reason.to_string());
    outcome
}

async fn run_suite_hooks(hooks: &[SuiteHook], stop_on_failure: bool) -> Result<(), Failure> {
    let mut first = None;
    for hook in hooks {
        if let Err(failure) = hook().await {
            if stop_on_failure {
                return Err(failure);
            }
            Failure::record(&mut first, failure);
        }
    }
    first.map_or(Ok(()), Err)
}

async fn run_test(suite: &SuiteRecord, info: &TestInfo, body: &EachHook) -> TestOutcome {
    let started = Instant::now();
    let ctx = TestContext::new(info.clone());
    let mut failure = None;

    for hook in &suite.before_each {
        if let Err(err) = hook(ctx.clone()).await {
            failure = Some(err);
            break;
        }
    }
    if failure.is_none() {
        if let Err(err) = body(ctx.clone()).await {
            failure = Some(err);
        }
    }
    for hook in &suite.after_each {
        if let Err(err) = hook(ctx.clone()).await {
            Failure::record(&mut failure, err);
        }
    }

    let state = ctx.snapshot();
    let skip_reason = ctx.skipped_reason();
    let status = match (&failure, &skip_reason) {
        (Some(_), _) => Status::Failed,
        (None, Some(_)) => Status::Skipped,
        (None, None) => Status::Passed,
    };
    match &failure {
        Some(err) => tracing::info!(failure = %err, "test failed"),
        None => tracing::info!(?status, "test finished"),
    }

    let mut outcome = TestOutcome::new(info, status);
    outcome.failure = failure;
    outcome.skip_reason = skip_reason;
    outcome.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    outcome.state = state;
    outcome
}

impl Registrar for LocalRunner {
    fn open_suite(&mut self, title: &str) {
        self.close_suite();
        self.open = Some(SuiteRecord {
            title: title.to_string(),
            ..SuiteRecord::default()
        });
    }

    fn before_all(&mut self, hook: SuiteHook) {
        self.current().before_all.push(hook);
    }

    fn after_all(&mut self, hook: SuiteHook) {
        self.current().after_all.push(hook);
    }

    fn before_each(&mut self, hook: EachHook) {
        self.current().before_each.push(hook);
    }

    fn after_each(&mut self, hook: EachHook) {
        self.current().after_each.push(hook);
    }

    fn test(&mut self, info: TestInfo, body: EachHook) {
        self.current().tests.push((info, body));
    }

    fn close_suite(&mut self) {
        if let Some(suite) = self.open.take() {
            self.suites.push(suite);
        }
    }
}

impl LocalRunner {
    /// Registrations outside an open suite go to an anonymous one.
    fn current(&mut self) -> &mut SuiteRecord {
        self.open.get_or_insert_with(SuiteRecord::default)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::FutureExt;

    use super::*;
    use crate::expand::UnitId;
    use crate::fail;

    fn info(suite: &str, title: &str) -> TestInfo {
        TestInfo {
            suite: suite.to_string(),
            title: title.to_string(),
            member: title.to_string(),
            identity: UnitId {
                class: 0,
                entry: 0,
                ordinal: 0,
            },
            args: Vec::new(),
        }
    }

    fn passing() -> EachHook {
        Arc::new(|_ctx: TestContext| async { Ok::<(), Failure>(()) }.boxed())
    }

    fn failing(message: &'static str) -> EachHook {
        Arc::new(move |_ctx: TestContext| async move { Err::<(), Failure>(fail!(message)) }.boxed())
    }

    #[test]
    fn test_filter_selects_by_full_title() {
        let mut runner = LocalRunner::new(RunOptions {
            filter: Some(Regex::new("Math > add").unwrap()),
            fail_fast: false,
        });
        runner.open_suite("Math");
        runner.test(info("Math", "adds"), passing());
        runner.test(info("Math", "subtracts"), passing());
        runner.close_suite();
        assert_eq!(runner.listing(), vec!["Math > adds"]);
        let summary = runner.run();
        assert_eq!(summary.total(), 1);
    }

    #[test]
    fn test_suite_without_selected_tests_runs_no_hooks() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut runner = LocalRunner::new(RunOptions {
            filter: Some(Regex::new("nothing").unwrap()),
            fail_fast: false,
        });
        runner.open_suite("S");
        runner.before_all(Arc::new(move || {
            *counter.lock().unwrap() += 1;
            async { Ok::<(), Failure>(()) }.boxed()
        }));
        runner.test(info("S", "t"), passing());
        runner.close_suite();
        runner.run();
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_fail_fast_skips_the_rest() {
        let mut runner = LocalRunner::new(RunOptions {
            filter: None,
            fail_fast: true,
        });
        runner.open_suite("S");
        runner.test(info("S", "first"), failing("nope"));
        runner.test(info("S", "second"), passing());
        runner.close_suite();
        let summary = runner.run();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.outcome("second").unwrap().status, Status::Skipped);
    }

    #[test]
    fn test_suite_setup_failure_fails_every_test() {
        let torn_down = Arc::new(Mutex::new(false));
        let flag = torn_down.clone();
        let mut runner = LocalRunner::new(RunOptions::default());
        runner.open_suite("S");
        runner.before_all(Arc::new(|| async { Err::<(), Failure>(fail!("no server")) }.boxed()));
        runner.after_all(Arc::new(move || {
            *flag.lock().unwrap() = true;
            async { Ok::<(), Failure>(()) }.boxed()
        }));
        runner.test(info("S", "a"), passing());
        runner.test(info("S", "b"), passing());
        runner.close_suite();
        let summary = runner.run();
        assert_eq!(summary.failed, 2);
        assert!(*torn_down.lock().unwrap());
    }

    #[test]
    fn test_every_after_each_failure_is_kept() {
        let mut runner = LocalRunner::new(RunOptions::default());
        runner.open_suite("S");
        runner.after_each(failing("closeConn failed"));
        runner.after_each(failing("flush failed"));
        runner.test(info("S", "t"), failing("body failed"));
        runner.close_suite();
        let summary = runner.run();
        let failure = summary.outcome("t").unwrap().failure.clone().unwrap();
        let messages: Vec<&str> = failure.all().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, ["body failed", "closeConn failed", "flush failed"]);
    }

    #[test]
    fn test_every_suite_teardown_failure_is_kept() {
        let mut runner = LocalRunner::new(RunOptions::default());
        runner.open_suite("S");
        runner.after_all(Arc::new(|| async { Err::<(), Failure>(fail!("drain failed")) }.boxed()));
        runner.after_all(Arc::new(|| async { Err::<(), Failure>(fail!("close failed")) }.boxed()));
        runner.test(info("S", "t"), passing());
        runner.close_suite();
        let summary = runner.run();
        assert_eq!(summary.suite_failures.len(), 1);
        let failure = &summary.suite_failures[0].failure;
        assert_eq!(failure.message, "drain failed");
        assert_eq!(failure.related[0].message, "close failed");
    }
}
