//! Suite registration: feeds assembled suites to a runner.
//!
//! A suite is assembled completely (aggregation, expansion, plans) before a
//! single registration call is made. If assembly fails, nothing from that
//! suite reaches the runner.
//!
//! Registration order per suite:
//!
//! 1. `open_suite`
//! 2. `before_all` (suite setup tier, if any hooks resolved)
//! 3. `before_each` (constructs the unit's instance, then per-test setup)
//! 4. one `test` per resolved unit, in expansion order
//! 5. `after_each` (per-test teardown)
//! 6. `after_all` (suite teardown tier, if any hooks resolved)
//! 7. `close_suite`

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;

use crate::aggregate::{aggregate, ClassMetadata};
use crate::class::{ClassId, ClassRegistry, MethodFuture};
use crate::context::{TestContext, TestInfo};
use crate::diagnostics::{AssemblyError, Failure};
use crate::expand::{expand, ResolvedTestUnit};
use crate::fail;
use crate::lifecycle::{self, Orchestrator, Phase, SuitePlan, UnitPlan};
use crate::object::Object;

/// A once-per-suite hook handed to the runner.
pub type SuiteHook = Arc<dyn Fn() -> MethodFuture + Send + Sync>;

/// A per-test hook or test body handed to the runner. It receives the
/// context of the unit being run.
pub type EachHook = Arc<dyn Fn(TestContext) -> MethodFuture + Send + Sync>;

/// The registration surface of a test runner.
///
/// The runner decides when and how to call what it is given. It must keep
/// the order of hooks registered for the same tier.
pub trait Registrar {
    fn open_suite(&mut self, title: &str);
    fn before_all(&mut self, hook: SuiteHook);
    fn after_all(&mut self, hook: SuiteHook);
    fn before_each(&mut self, hook: EachHook);
    fn after_each(&mut self, hook: EachHook);
    fn test(&mut self, info: TestInfo, body: EachHook);
    fn close_suite(&mut self);
}

/// A suite that is ready to be registered.
#[derive(Debug)]
pub struct SuiteAssembly {
    pub meta: Arc<ClassMetadata>,
    pub units: Vec<ResolvedTestUnit>,
    pub suite_plan: SuitePlan,
    plans: BTreeMap<String, Arc<UnitPlan>>,
    statics: Object,
}

impl SuiteAssembly {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The suite-scoped statics object shared by all units.
    pub fn statics(&self) -> &Object {
        &self.statics
    }

    pub fn plan_for(&self, member: &str) -> Option<&UnitPlan> {
        self.plans.get(member).map(Arc::as_ref)
    }
}

/// Aggregates and expands `class`, and builds every plan its units need.
///
/// # Errors
/// Any [`AssemblyError`] from aggregation or expansion. The suite must not
/// be registered in that case.
pub fn assemble(registry: &ClassRegistry, class: ClassId) -> Result<SuiteAssembly, AssemblyError> {
    let meta = Arc::new(aggregate(registry, class)?);
    let statics = meta.construct_statics();
    let units = expand(&meta, || meta.construct(&statics))?;

    let orchestrator = Orchestrator::new(meta.clone());
    let suite_plan = orchestrator.suite_plan();
    let mut plans = BTreeMap::new();
    for unit in &units {
        plans
            .entry(unit.member.clone())
            .or_insert_with(|| Arc::new(orchestrator.member_plan(&unit.member)));
    }

    tracing::debug!(suite = %meta.name, units = units.len(), "suite assembled");
    Ok(SuiteAssembly {
        meta,
        units,
        suite_plan,
        plans,
        statics,
    })
}

/// Registers an assembled suite with `registrar`.
pub fn register<R: Registrar + ?Sized>(assembly: SuiteAssembly, registrar: &mut R) {
    let SuiteAssembly {
        meta,
        units,
        suite_plan,
        plans,
        statics,
    } = assembly;
    let suite_plan = Arc::new(suite_plan);
    let plans = Arc::new(plans);
    let params = Arc::new(meta.parameters.clone());

    registrar.open_suite(&meta.name);

    if !suite_plan.setup.is_empty() {
        let plan = suite_plan.clone();
        let statics = statics.clone();
        registrar.before_all(Arc::new(move || {
            let plan = plan.clone();
            let statics = statics.clone();
            async move { lifecycle::run_suite_setup(&plan, &statics).await }.boxed()
        }));
    }

    {
        let meta = meta.clone();
        let plans = plans.clone();
        let statics = statics.clone();
        let params = params.clone();
        registrar.before_each(Arc::new(move |ctx: TestContext| {
            let meta = meta.clone();
            let plans = plans.clone();
            let statics = statics.clone();
            let params = params.clone();
            async move {
                let plan = plan_of(&plans, &ctx)?;
                let instance = meta
                    .construct(&statics)
                    .map_err(|failure| failure.located(Phase::PerTestSetup, "constructor"))?;
                if !ctx.bind(instance.clone(), params) {
                    return Err(fail!("test `{}` already has an instance", ctx.info().title));
                }
                lifecycle::run_unit_setup(&plan, &instance, &ctx).await
            }
            .boxed()
        }));
    }

    for unit in units {
        let info = TestInfo {
            suite: meta.name.clone(),
            title: unit.display_name,
            member: unit.member,
            identity: unit.identity,
            args: unit.args,
        };
        let plans = plans.clone();
        registrar.test(
            info,
            Arc::new(move |ctx: TestContext| {
                let plans = plans.clone();
                async move {
                    let plan = plan_of(&plans, &ctx)?;
                    let instance = ctx
                        .instance()
                        .ok_or_else(|| fail!("test `{}` has no instance", ctx.info().title))?;
                    lifecycle::run_unit_body(&plan, &instance, &ctx).await
                }
                .boxed()
            }),
        );
    }

    {
        let plans = plans.clone();
        registrar.after_each(Arc::new(move |ctx: TestContext| {
            let plans = plans.clone();
            async move {
                // Construction failed in before_each: nothing to tear down.
                let Some(instance) = ctx.instance() else {
                    return Ok(());
                };
                let plan = plan_of(&plans, &ctx)?;
                lifecycle::run_unit_teardown(&plan, &instance, &ctx).await
            }
            .boxed()
        }));
    }

    if !suite_plan.teardown.is_empty() {
        let plan = suite_plan.clone();
        registrar.after_all(Arc::new(move || {
            let plan = plan.clone();
            let statics = statics.clone();
            async move { lifecycle::run_suite_teardown(&plan, &statics).await }.boxed()
        }));
    }

    registrar.close_suite();
}

fn plan_of(plans: &BTreeMap<String, Arc<UnitPlan>>, ctx: &TestContext) -> Result<Arc<UnitPlan>, Failure> {
    plans
        .get(&ctx.info().member)
        .cloned()
        .ok_or_else(|| fail!("no plan for test member `{}`", ctx.info().member))
}

/// Assembles and registers several suites in order.
///
/// Each suite is assembled before any of its registrations are made. A
/// suite that fails to assemble is skipped and its error returned; the
/// others are still registered.
pub fn register_all<R: Registrar + ?Sized>(
    registry: &ClassRegistry,
    classes: &[ClassId],
    registrar: &mut R,
) -> Vec<AssemblyError> {
    let mut errors = Vec::new();
    for class in classes {
        match assemble(registry, *class) {
            Ok(assembly) => register(assembly, registrar),
            Err(err) => {
                tracing::error!(class = class.index(), error = %err, "suite failed to assemble");
                errors.push(err);
            }
        }
    }
    errors
}

