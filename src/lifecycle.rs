//! Hook ordering and tier execution.
//!
//! An [`Orchestrator`] turns the aggregated hook lists of a class into two
//! plans: the once-per-suite [`SuitePlan`] and one [`UnitPlan`] per test
//! unit. The order of a unit's calls is fixed:
//!
//! ```text
//! suite setup (once)
//!   per-test setup      ancestor first, declaration order
//!   pre-test hooks      outermost first
//!   test body
//!   post-test hooks     innermost first, always run
//!   per-test teardown   always run
//! suite teardown (once)
//! ```
//!
//! Setup tiers stop at the first failing hook. Teardown tiers run every
//! hook. The first failure of a unit is its primary failure and every later
//! one is kept in [`Failure::related`]. Hooks of one tier never overlap: each
//! is awaited before the next one starts.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;

use crate::aggregate::ClassMetadata;
use crate::class::{
    instance_method, Call, HookTier, InstanceMethod, LabeledHook, Modifiers, StaticMethod,
};
use crate::context::TestContext;
use crate::diagnostics::Failure;
use crate::expand::ResolvedTestUnit;
use crate::fail;
use crate::object::Object;

// ============================================================================
// Phases
// ============================================================================

/// Where in a unit's lifecycle a call happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SuiteSetup,
    PerTestSetup,
    PerTestPre,
    TestBody,
    PerTestPost,
    PerTestTeardown,
    SuiteTeardown,
}

impl Phase {
    fn of_tier(tier: HookTier) -> Self {
        match tier {
            HookTier::SuiteSetup => Phase::SuiteSetup,
            HookTier::PerTestSetup => Phase::PerTestSetup,
            HookTier::PerTestTeardown => Phase::PerTestTeardown,
            HookTier::SuiteTeardown => Phase::SuiteTeardown,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SuiteSetup => "suite setup",
            Phase::PerTestSetup => "per-test setup",
            Phase::PerTestPre => "pre-test hook",
            Phase::TestBody => "test body",
            Phase::PerTestPost => "post-test hook",
            Phase::PerTestTeardown => "per-test teardown",
            Phase::SuiteTeardown => "suite teardown",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Plans
// ============================================================================

/// A call on the suite's statics object.
#[derive(Clone)]
pub struct StaticStep {
    pub label: String,
    pub phase: Phase,
    run: StaticMethod,
}

/// A call on a unit's instance.
#[derive(Clone)]
pub struct InstanceStep {
    pub label: String,
    pub phase: Phase,
    run: InstanceMethod,
}

impl fmt::Debug for StaticStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.phase, self.label)
    }
}

impl fmt::Debug for InstanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.phase, self.label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuitePlan {
    pub setup: Vec<StaticStep>,
    pub teardown: Vec<StaticStep>,
}

impl SuitePlan {
    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.teardown.is_empty()
    }
}

/// Everything one test unit calls on its instance, in order.
#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub member: String,
    pub setup: Vec<InstanceStep>,
    pub pre: Vec<InstanceStep>,
    pub body: InstanceStep,
    pub post: Vec<InstanceStep>,
    pub teardown: Vec<InstanceStep>,
    /// Side-table declarations, resolved right before the body runs.
    pub modifiers: Modifiers,
}

/// Builds suite and unit plans for one aggregated class.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    meta: Arc<ClassMetadata>,
}

impl Orchestrator {
    pub fn new(meta: Arc<ClassMetadata>) -> Self {
        Self { meta }
    }

    pub fn metadata(&self) -> &ClassMetadata {
        &self.meta
    }

    pub fn suite_plan(&self) -> SuitePlan {
        SuitePlan {
            setup: self.static_steps(HookTier::SuiteSetup),
            teardown: self.static_steps(HookTier::SuiteTeardown),
        }
    }

    pub fn unit_plan(&self, unit: &ResolvedTestUnit) -> UnitPlan {
        self.member_plan(&unit.member)
    }

    /// Units of the same member share their plan; only arguments differ.
    pub fn member_plan(&self, member: &str) -> UnitPlan {
        let specific = self.meta.per_test_hooks_for(member);
        let labeled = |phase: Phase, hooks: &[LabeledHook]| -> Vec<InstanceStep> {
            hooks
                .iter()
                .map(|hook| InstanceStep {
                    label: hook.label.clone(),
                    phase,
                    run: hook.run.clone(),
                })
                .collect()
        };

        let body = match self.meta.method(member) {
            Some(run) => run.clone(),
            None => {
                let message = format!("test body `{}` resolves to no member", member);
                instance_method(move |_, _| {
                    let failure = fail!(message.clone());
                    async move { Err(failure) }
                })
            }
        };

        UnitPlan {
            member: member.to_string(),
            setup: self.instance_steps(HookTier::PerTestSetup),
            pre: labeled(Phase::PerTestPre, specific.pre.as_slice()),
            body: InstanceStep {
                label: member.to_string(),
                phase: Phase::TestBody,
                run: body,
            },
            post: labeled(Phase::PerTestPost, specific.post.as_slice()),
            teardown: self.instance_steps(HookTier::PerTestTeardown),
            modifiers: self.meta.modifiers.get(member).cloned().unwrap_or_default(),
        }
    }

    /// The complete ordered call sequence of one unit, suite tiers included.
    pub fn call_sequence(&self, unit: &ResolvedTestUnit) -> Vec<(Phase, String)> {
        let suite = self.suite_plan();
        let plan = self.unit_plan(unit);
        let statics = |steps: &[StaticStep]| {
            steps
                .iter()
                .map(|s| (s.phase, s.label.clone()))
                .collect::<Vec<_>>()
        };
        let instance = |steps: &[InstanceStep]| {
            steps
                .iter()
                .map(|s| (s.phase, s.label.clone()))
                .collect::<Vec<_>>()
        };

        let mut sequence = statics(suite.setup.as_slice());
        sequence.extend(instance(plan.setup.as_slice()));
        sequence.extend(instance(plan.pre.as_slice()));
        sequence.push((plan.body.phase, plan.body.label.clone()));
        sequence.extend(instance(plan.post.as_slice()));
        sequence.extend(instance(plan.teardown.as_slice()));
        sequence.extend(statics(suite.teardown.as_slice()));
        sequence
    }

    fn static_steps(&self, tier: HookTier) -> Vec<StaticStep> {
        self.meta
            .hooks
            .get(tier)
            .iter()
            .filter_map(|name| {
                self.meta.static_method(name).map(|run| StaticStep {
                    label: name.clone(),
                    phase: Phase::of_tier(tier),
                    run: run.clone(),
                })
            })
            .collect()
    }

    fn instance_steps(&self, tier: HookTier) -> Vec<InstanceStep> {
        self.meta
            .hooks
            .get(tier)
            .iter()
            .filter_map(|name| {
                self.meta.method(name).map(|run| InstanceStep {
                    label: name.clone(),
                    phase: Phase::of_tier(tier),
                    run: run.clone(),
                })
            })
            .collect()
    }
}

// ============================================================================
// Execution
// ============================================================================

/// How a tier reacts to a failing hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierMode {
    /// Setup tiers: later hooks of the tier are not run.
    StopOnFailure,
    /// Teardown tiers: every hook runs; every failure is reported.
    RunAll,
}

/// Awaits a hook or body, turning a panic into a failure.
async fn invoke<F>(fut: F) -> Result<(), Failure>
where
    F: std::future::Future<Output = Result<(), Failure>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Failure::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

async fn run_static_steps(steps: &[StaticStep], statics: &Object, mode: TierMode) -> Result<(), Failure> {
    let mut first = None;
    for step in steps {
        tracing::debug!(phase = %step.phase, hook = %step.label, "running hook");
        if let Err(failure) = invoke((step.run)(statics.clone())).await {
            let failure = failure.located(step.phase, &step.label);
            tracing::debug!(%failure, "hook failed");
            if mode == TierMode::StopOnFailure {
                return Err(failure);
            }
            Failure::record(&mut first, failure);
        }
    }
    first.map_or(Ok(()), Err)
}

async fn run_instance_steps(
    steps: &[InstanceStep],
    instance: &Object,
    call: &Call,
    mode: TierMode,
) -> Result<(), Failure> {
    let mut first = None;
    for step in steps {
        tracing::debug!(phase = %step.phase, hook = %step.label, "running hook");
        if let Err(failure) = invoke((step.run)(instance.clone(), call.clone())).await {
            let failure = failure.located(step.phase, &step.label);
            tracing::debug!(%failure, "hook failed");
            if mode == TierMode::StopOnFailure {
                return Err(failure);
            }
            Failure::record(&mut first, failure);
        }
    }
    first.map_or(Ok(()), Err)
}

pub async fn run_suite_setup(plan: &SuitePlan, statics: &Object) -> Result<(), Failure> {
    run_static_steps(&plan.setup, statics, TierMode::StopOnFailure).await
}

pub async fn run_suite_teardown(plan: &SuitePlan, statics: &Object) -> Result<(), Failure> {
    run_static_steps(&plan.teardown, statics, TierMode::RunAll).await
}

/// Class-wide hooks receive the context but no arguments.
fn hook_call(ctx: &TestContext) -> Call {
    Call {
        args: Vec::new(),
        context: ctx.clone(),
    }
}

pub async fn run_unit_setup(plan: &UnitPlan, instance: &Object, ctx: &TestContext) -> Result<(), Failure> {
    run_instance_steps(&plan.setup, instance, &hook_call(ctx), TierMode::StopOnFailure).await
}

pub async fn run_unit_teardown(plan: &UnitPlan, instance: &Object, ctx: &TestContext) -> Result<(), Failure> {
    run_instance_steps(&plan.teardown, instance, &hook_call(ctx), TierMode::RunAll).await
}

/// Runs the pre-test hooks, the body and the post-test hooks.
///
/// Side tables are resolved against the live instance after the pre-test
/// hooks, so conditions see their effects. A skipped body still runs the
/// post-test hooks. The first failure is primary and later ones are kept as
/// related failures; post-test hooks always run.
pub async fn run_unit_body(plan: &UnitPlan, instance: &Object, ctx: &TestContext) -> Result<(), Failure> {
    let call = Call {
        args: ctx.info().args.clone(),
        context: ctx.clone(),
    };

    let mut first = None;
    match run_instance_steps(&plan.pre, instance, &call, TierMode::StopOnFailure).await {
        Ok(()) => {
            ctx.apply(plan.modifiers.resolve(instance));
            match ctx.skipped_reason() {
                Some(reason) => {
                    tracing::debug!(test = %ctx.info().title, %reason, "body skipped");
                }
                None => {
                    tracing::debug!(test = %ctx.info().title, "running body");
                    if let Err(failure) = invoke((plan.body.run)(instance.clone(), call.clone())).await {
                        Failure::record(&mut first, failure.located(Phase::TestBody, &plan.body.label));
                    }
                }
            }
        }
        Err(failure) => Failure::record(&mut first, failure),
    }

    if let Err(failure) = run_instance_steps(&plan.post, instance, &call, TierMode::RunAll).await {
        Failure::record(&mut first, failure);
    }
    first.map_or(Ok(()), Err)
}

/// Runs one unit end to end on an already constructed instance: setup,
/// body (only if setup succeeded) and teardown (always).
pub async fn execute_unit(plan: &UnitPlan, instance: &Object, ctx: &TestContext) -> Result<(), Failure> {
    let mut first = None;
    match run_unit_setup(plan, instance, ctx).await {
        Ok(()) => {
            if let Err(failure) = run_unit_body(plan, instance, ctx).await {
                Failure::record(&mut first, failure);
            }
        }
        Err(failure) => Failure::record(&mut first, failure),
    }
    if let Err(failure) = run_unit_teardown(plan, instance, ctx).await {
        Failure::record(&mut first, failure);
    }
    first.map_or(Ok(()), Err)
}
