use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use suitecraft::aggregate::aggregate;
use suitecraft::class::{Call, ClassId, ClassRegistry, ProviderOutput};
use suitecraft::expand::{expand, ResolvedTestUnit};
use suitecraft::value::{formatter, Describe};
use suitecraft::{args, fail, AssemblyError, ErrorType, Failure, Object, Value};

async fn noop(_this: Object, _call: Call) -> Result<(), Failure> {
    Ok(())
}

fn expand_class(registry: &ClassRegistry, id: ClassId) -> Result<Vec<ResolvedTestUnit>, AssemblyError> {
    let meta = aggregate(registry, id)?;
    let statics = meta.construct_statics();
    expand(&meta, || meta.construct(&statics))
}

fn names(units: &[ResolvedTestUnit]) -> Vec<&str> {
    units.iter().map(|u| u.display_name.as_str()).collect()
}

#[derive(Debug)]
struct Point(i32, i32);

impl Describe for Point {
    fn describe(&self) -> String {
        format!("({}, {})", self.0, self.1)
    }
}

#[test]
fn single_entry_is_one_unit_without_arguments() {
    let mut registry = ClassRegistry::new();
    let id = registry.declare("S").test("works", "it works", noop).finish().unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].display_name, "it works");
    assert_eq!(units[0].member, "works");
    assert!(units[0].args.is_empty());
}

#[test]
fn static_each_yields_one_unit_per_tuple_in_order() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Math")
        .test_each("adds", "$0+$1=$2", vec![args![1, 2, 3], args![2, 2, 4]], noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["1+2=3", "2+2=4"]);
    assert_eq!(units[1].args, args![2, 2, 4]);
    assert_eq!(units[0].identity.ordinal, 0);
    assert_eq!(units[1].identity.ordinal, 1);
    assert_ne!(units[0].identity, units[1].identity);
}

#[test]
fn names_use_converted_values_but_units_keep_originals() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Geo")
        .test_each("moves", "moves to $0", vec![vec![Value::custom(Point(1, 2))]], noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(units[0].display_name, "moves to (1, 2)");
    assert!(matches!(units[0].args[0], Value::Custom(_)));
}

#[test]
fn positional_formatter_receives_the_original_value() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Geo")
        .test_each("moves", "moves by $0", vec![vec![Value::custom(Point(3, 4))]], noop)
        .positional_formatter("moves", 0, formatter(|v| format!("{}:{}", v.type_name(), v)))
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert!(units[0].display_name.starts_with("moves by Custom:"));
}

#[test]
fn deferred_provider_reads_the_throwaway_instance() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Users")
        .field("roles", vec!["admin", "guest"])
        .test_each_with(
            "login",
            "logs in as $0",
            |this| match this.get_or_nil("roles") {
                Value::List(roles) => Ok(roles.into_iter().map(|r| vec![r]).collect::<Vec<_>>()),
                _ => Err(fail!("roles missing")),
            },
            noop,
        )
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["logs in as admin", "logs in as guest"]);
}

#[test]
fn empty_provider_yields_zero_units() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Empty")
        .test_each_with("nothing", "never $0", |_this| Ok(Vec::<Vec<Value>>::new()), noop)
        .test("after", "still here", noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["still here"]);
}

#[test]
fn pending_provider_is_rejected() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Async")
        .test("first", "first", noop)
        .test_each_with(
            "later",
            "later $0",
            |_this| Ok(ProviderOutput::pending(async { vec![args![1]] })),
            noop,
        )
        .finish()
        .unwrap();
    let err = expand_class(&registry, id).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UnsupportedAsyncProvider);
    assert!(matches!(err, AssemblyError::UnsupportedAsyncProvider { ref member, .. } if member == "later"));
}

#[test]
fn failing_provider_fails_the_suite() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Broken")
        .test_each_with("t", "t $0", |_this| Err::<Vec<Vec<Value>>, _>(fail!("no data")), noop)
        .finish()
        .unwrap();
    let err = expand_class(&registry, id).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::ProviderFailure);
}

#[test]
fn construction_failure_is_fatal_for_assembly() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Fragile")
        .constructor(|_this| Err(fail!("needs a database")))
        .test_each_with("t", "t $0", |_this| Ok(vec![args![1]]), noop)
        .finish()
        .unwrap();
    let err = expand_class(&registry, id).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::AssemblyConstructionFailure);
    match err {
        AssemblyError::AssemblyConstructionFailure { class, reason } => {
            assert_eq!(class, "Fragile");
            assert_eq!(reason.message, "Fragile: needs a database");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn throwaway_instance_is_built_at_most_once() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Counted")
        .field("who", "ann")
        .param("who", "who")
        .constructor(move |_this| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .test_each_with("a", "a $0", |_this| Ok(vec![args![1]]), noop)
        .test_each_with("b", "b $0 by $who", |_this| Ok(vec![args![2]]), noop)
        .test("c", "c by $who", noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["a 1", "b 2 by ann", "c by ann"]);
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}

#[test]
fn plain_suites_never_construct_an_instance() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Plain")
        .constructor(move |_this| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .test("one", "one", noop)
        .test_each("two", "two $0", vec![args![2]], noop)
        .finish()
        .unwrap();
    expand_class(&registry, id).unwrap();
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn bad_template_fails_the_whole_suite() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Bad")
        .test("fine", "fine", noop)
        .test_each("short", "$0 and $1", vec![args!["only one"]], noop)
        .finish()
        .unwrap();
    let err = expand_class(&registry, id).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::OutOfRange);
}

#[test]
fn single_titles_keep_dollar_signs_as_written() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Pricing")
        .constructor(move |_this| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .test("cheap", "costs $5", noop)
        .test("store", "uses $store", noop)
        .test("plain", "plain", noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["costs $5", "uses $store", "plain"]);
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn single_titles_resolve_only_registered_parameters() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("Shop")
        .field("site", "north")
        .param("site", "site")
        .test("t", "$5 at $site for $nobody", noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, id).unwrap();
    assert_eq!(names(&units), vec!["$5 at north for $nobody"]);
}

#[test]
fn unknown_named_parameter_in_a_parameterized_name_is_missing() {
    let mut registry = ClassRegistry::new();
    let id = registry
        .declare("S")
        .test_each("t", "$0 as $nobody", vec![args![1]], noop)
        .finish()
        .unwrap();
    let err = expand_class(&registry, id).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::MissingParameter);
}

#[test]
fn inherited_entries_come_first_and_child_replaces_in_place() {
    let mut registry = ClassRegistry::new();
    let base = registry
        .declare("Base")
        .test("a", "base a", noop)
        .test_each("b", "base b $0", vec![args![1]], noop)
        .finish()
        .unwrap();
    let child = registry
        .declare("Child")
        .extends(base)
        .test_each("a", "child a $0", vec![args![1], args![2]], noop)
        .test("c", "child c", noop)
        .finish()
        .unwrap();
    let units = expand_class(&registry, child).unwrap();
    assert_eq!(
        names(&units),
        vec!["child a 1", "child a 2", "base b 1", "child c"]
    );
}
