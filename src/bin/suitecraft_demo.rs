// Demo harness: a handful of declarative suites run through the local runner.
// Usage: cargo run --bin suitecraft-demo -- [filter] [--list] [--format json]
//
// Setting SUITECRAFT_DEMO_BROKEN=1 adds a failing test and a suite whose
// test names cannot be rendered.

use std::process::ExitCode;

use suitecraft::class::{ClassId, ClassRegistry, Condition, ProviderOutput};
use suitecraft::value::{formatter, Value};
use suitecraft::{args, fail, DeclarationError};

fn main() -> ExitCode {
    suitecraft::cli::main(build)
}

fn build(registry: &mut ClassRegistry) -> Result<Vec<ClassId>, DeclarationError> {
    let mut suites = vec![math(registry)?, inventory(registry)?, transfers(registry)?];
    if std::env::var_os("SUITECRAFT_DEMO_BROKEN").is_some() {
        suites.extend(broken(registry)?);
    }
    Ok(suites)
}

/// Connection handling shared by the database-backed suites.
fn db(registry: &mut ClassRegistry) -> Result<ClassId, DeclarationError> {
    registry
        .declare("Db")
        .static_field("url", "memory://demo")
        .before_all("connectPool", |statics| async move {
            statics.set("pool", "ready");
            Ok(())
        })
        .before_each("openConn", |this, _call| async move {
            this.set("conn", "open");
            Ok(())
        })
        .after_all("drainPool", |statics| async move {
            statics.set("pool", "drained");
            Ok(())
        })
        .finish()
}

fn math(registry: &mut ClassRegistry) -> Result<ClassId, DeclarationError> {
    let base = db(registry)?;
    registry
        .declare("Math")
        .extends(base)
        .after_each("closeConn", |this, _call| async move {
            this.set("conn", "closed");
            Ok(())
        })
        .test_each(
            "adds",
            "$0+$1=$2",
            vec![args![1, 2, 3], args![2, 2, 4]],
            |this, call| async move {
                if this.get("conn") != Some(Value::from("open")) {
                    return Err(fail!("connection is not open"));
                }
                let sum = call.arg(0).as_number().unwrap_or(0.0) + call.arg(1).as_number().unwrap_or(0.0);
                if call.arg(2).as_number() != Some(sum) {
                    return Err(fail!("expected {}, got {}", call.arg(2), sum));
                }
                Ok(())
            },
        )
        .tag("adds", "@smoke")
        .finish()
}

fn inventory(registry: &mut ClassRegistry) -> Result<ClassId, DeclarationError> {
    registry
        .declare("Inventory")
        .field("warehouse", "north")
        .field("items", vec!["bolt", "nut"])
        .param("warehouse", "site")
        .test_each_with(
            "stocks",
            "$site stocks $0",
            |this| {
                let items = match this.get_or_nil("items") {
                    Value::List(items) => items,
                    _ => Vec::new(),
                };
                Ok(items.into_iter().map(|item| vec![item]).collect::<Vec<_>>())
            },
            |this, call| async move {
                call.context
                    .step("checking $site for $0", &call.args)
                    .map_err(suitecraft::Failure::from_error)?;
                this.set("warehouse", "south");
                call.context
                    .step("moved to $site", &[])
                    .map_err(suitecraft::Failure::from_error)?;
                Ok(())
            },
        )
        .test_each_with(
            "discontinued",
            "discontinued $0",
            |_this| Ok(ProviderOutput::Ready(Vec::new())),
            |_this, _call| async move { Ok(()) },
        )
        .test("audit", "audit of $site", |_this, _call| async move { Ok(()) })
        .skip_if(
            "audit",
            Condition::when(|this| this.get_or_nil("warehouse") == Value::from("north")),
            Some("audits only run in the south"),
        )
        .finish()
}

fn transfers(registry: &mut ClassRegistry) -> Result<ClassId, DeclarationError> {
    registry
        .declare("Transfers")
        .field("journal", Vec::<Value>::new())
        .before("moves", "open", journal("open"))
        .after("moves", "release-open", journal("release-open"))
        .before("moves", "begin", journal("begin"))
        .after("moves", "release-begin", journal("release-begin"))
        .before("moves", "acquire", journal("acquire"))
        .after("moves", "release-acquire", journal("release-acquire"))
        .test_each("moves", "moves $0", vec![args![Value::from(250)]], |this, call| async move {
            let steps = this.get_or_nil("journal");
            call.context
                .step("journal before transfer: $0", &[steps])
                .map_err(suitecraft::Failure::from_error)?;
            Ok(())
        })
        .positional_formatter("moves", 0, formatter(|v| format!("{} EUR", v)))
        .annotate("moves", "issue", Some("per-test hooks wrap the body"))
        .finish()
}

fn journal(
    entry: &'static str,
) -> impl Fn(suitecraft::Object, suitecraft::class::Call) -> futures::future::Ready<Result<(), suitecraft::Failure>>
       + Send
       + Sync
       + 'static {
    move |this, _call| {
        this.update("journal", |value| match value {
            Value::List(entries) => entries.push(Value::from(entry)),
            other => *other = Value::from(vec![entry]),
        });
        futures::future::ready(Ok(()))
    }
}

fn broken(registry: &mut ClassRegistry) -> Result<Vec<ClassId>, DeclarationError> {
    let failing = registry
        .declare("Broken")
        .test("fails", "always fails", |_this, _call| async move {
            Err(fail!("this test is meant to fail"))
        })
        .finish()?;
    let unnamed = registry
        .declare("Unnamed")
        .test_each("t", "needs $3", vec![args![1]], |_this, _call| async move { Ok(()) })
        .finish()?;
    Ok(vec![failing, unnamed])
}
