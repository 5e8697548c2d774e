mod common;

use parking_lot::Mutex;
use proxykit::{
    prefix_hook, suffix_hook, CallerScope, ClassDef, ClassRegistry, FieldDef, MethodDef, Object, PrefixOutcome,
    ProxyError, ProxyFactory, ProxyKind, Value,
};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

/// A class whose `run` method records the real call in `log`
fn logging_factory(log: &Log) -> ProxyFactory {
    let log = log.clone();
    let registry = ClassRegistry::new();
    registry.register(
        ClassDef::new("Task")
            .field(FieldDef::public("status", "idle"))
            .method(MethodDef::new("run", move |ctx, _| {
                log.lock().push("real".to_string());
                ctx.set("status", "done")?;
                Ok(Value::str("result"))
            })),
    );
    ProxyFactory::new(Arc::new(registry))
}

fn recording_prefix(log: &Log, tag: &'static str, outcome: PrefixOutcome) -> proxykit::proxy::PrefixHook {
    let log = log.clone();
    prefix_hook(move |_, _, _| {
        log.lock().push(tag.to_string());
        Ok(outcome.clone())
    })
}

fn recording_suffix(log: &Log, tag: &'static str) -> proxykit::proxy::SuffixHook {
    let log = log.clone();
    suffix_hook(move |_, _, _, value| {
        log.lock().push(tag.to_string());
        *value = Value::str(format!("{}+{}", value.as_str().unwrap_or_default(), tag));
        Ok(())
    })
}

#[test]
fn test_prefixes_run_before_real_call_and_suffixes_after() {
    let log: Log = Arc::default();
    let factory = logging_factory(&log);
    let mut proxy = factory
        .create_interceptor(factory.instance("Task", &[]).unwrap())
        .unwrap();

    proxy.add_interceptor(
        "run",
        Some(recording_prefix(&log, "A", PrefixOutcome::Proceed)),
        Some(recording_suffix(&log, "C")),
    );
    proxy.add_interceptor(
        "run",
        Some(recording_prefix(&log, "B", PrefixOutcome::Proceed)),
        Some(recording_suffix(&log, "D")),
    );

    let value = proxy.call_method(&CallerScope::Outside, "run", &[]).unwrap();

    assert_eq!(*log.lock(), vec!["A", "B", "real", "C", "D"]);
    assert_eq!(value, Value::str("result+C+D"));
    assert_eq!(
        proxy.get_property(&CallerScope::Outside, "status").unwrap(),
        Value::str("done")
    );
}

#[test]
fn test_prefix_return_early_skips_real_call_but_not_suffixes() {
    let log: Log = Arc::default();
    let factory = logging_factory(&log);
    let mut proxy = factory
        .create_interceptor(factory.instance("Task", &[]).unwrap())
        .unwrap();

    proxy.add_interceptor(
        "run",
        Some(recording_prefix(&log, "A", PrefixOutcome::ReturnEarly(Value::str("early")))),
        Some(recording_suffix(&log, "C")),
    );
    proxy.add_interceptor(
        "run",
        Some(recording_prefix(&log, "B", PrefixOutcome::Proceed)),
        Some(recording_suffix(&log, "D")),
    );

    let value = proxy.call_method(&CallerScope::Outside, "run", &[]).unwrap();

    assert_eq!(*log.lock(), vec!["A", "C", "D"]);
    assert_eq!(value, Value::str("early+C+D"));
    assert_eq!(
        proxy.get_property(&CallerScope::Outside, "status").unwrap(),
        Value::str("idle")
    );
}

#[test]
fn test_set_interceptor_replaces_previous_hooks() {
    let log: Log = Arc::default();
    let factory = logging_factory(&log);
    let mut proxy = factory
        .create_interceptor(factory.instance("Task", &[]).unwrap())
        .unwrap();

    proxy.set_method_prefix_interceptor("run", Some(recording_prefix(&log, "old", PrefixOutcome::Proceed)));
    proxy.set_method_prefix_interceptor("run", Some(recording_prefix(&log, "new", PrefixOutcome::Proceed)));
    proxy.set_method_suffix_interceptor("run", Some(recording_suffix(&log, "after")));
    proxy.call_method(&CallerScope::Outside, "run", &[]).unwrap();
    assert_eq!(*log.lock(), vec!["new", "real", "after"]);

    log.lock().clear();
    proxy.set_method_prefix_interceptor("run", None);
    proxy.set_method_suffix_interceptor("run", None);
    assert_eq!(
        proxy.call_method(&CallerScope::Outside, "run", &[]).unwrap(),
        Value::str("result")
    );
    assert_eq!(*log.lock(), vec!["real"]);
}

#[test]
fn test_prefix_can_rewrite_arguments_and_inspect_target() {
    let factory = common::factory();
    let mut proxy = factory
        .create_interceptor(factory.instance("BaseClass", &[]).unwrap())
        .unwrap();

    proxy.set_method_prefix_interceptor(
        "publicTypeHintedMethod",
        Some(prefix_hook(|target, method, args| {
            assert_eq!(method, "publicTypeHintedMethod");
            args[0] = target.get_property(&CallerScope::Outside, "publicProperty")?;
            Ok(PrefixOutcome::Proceed)
        })),
    );

    let value = proxy
        .call_method(&CallerScope::Outside, "publicTypeHintedMethod", &[Value::Int(1)])
        .unwrap();
    assert_eq!(
        value,
        Value::str("publicTypeHintedMethodDefault:\"publicPropertyDefault\"")
    );
}

#[test]
fn test_final_methods_are_not_intercepted() {
    let factory = common::factory();
    let mut proxy = factory
        .create_interceptor(factory.instance("BaseClass", &[]).unwrap())
        .unwrap();

    proxy.set_method_prefix_interceptor(
        "finalMethod",
        Some(prefix_hook(|_, _, _| Ok(PrefixOutcome::ReturnEarly(Value::Null)))),
    );
    assert_eq!(
        proxy.call_method(&CallerScope::Outside, "finalMethod", &[]).unwrap(),
        Value::str("finalMethodDefault")
    );
}

#[test]
fn test_scope_localizer_works_on_original_state() {
    let factory = common::factory();
    let mut instance = factory.instance("BaseClass", &[]).unwrap();

    {
        let mut localizer = factory.create_scope_localizer(&mut instance).unwrap();
        localizer.set_method_suffix_interceptor(
            "publicMethod",
            Some(suffix_hook(|target, _, _, value| {
                target.set_property(&CallerScope::Outside, "publicProperty", value.clone())
            })),
        );

        localizer
            .set_property(&CallerScope::class("BaseClass"), "privateProperty", Value::str("localized"))
            .unwrap();
        localizer.call_method(&CallerScope::Outside, "publicMethod", &[]).unwrap();
        assert_eq!(localizer.definition().kind(), ProxyKind::ScopeLocalizer);
    }

    assert_eq!(
        instance
            .call_method(&CallerScope::Outside, "getPrivateProperty", &[])
            .unwrap(),
        Value::str("localized")
    );
    assert_eq!(
        instance
            .get_property(&CallerScope::Outside, "publicProperty")
            .unwrap(),
        Value::str("publicMethodDefault")
    );
}

#[test]
fn test_unsuitable_types_are_rejected_at_generation() {
    let factory = common::factory();

    for kind in [
        ProxyKind::Ghost,
        ProxyKind::ValueHolder,
        ProxyKind::Interceptor,
        ProxyKind::ScopeLocalizer,
    ] {
        assert!(matches!(
            factory.definition(kind, "FinalClass"),
            Err(ProxyError::Shape { .. })
        ));
    }
    assert!(matches!(
        factory.definition(ProxyKind::ScopeLocalizer, "BaseInterface"),
        Err(ProxyError::Shape { .. })
    ));
    assert!(factory.definition(ProxyKind::Interceptor, "BaseInterface").is_ok());
}

#[test]
fn test_interceptor_rejects_unrelated_instance() {
    let factory = common::factory();
    let definition = factory
        .definition(ProxyKind::Interceptor, "ClassWithPublicProperties")
        .unwrap();
    let instance = factory.instance("BaseClass", &[]).unwrap();

    assert!(matches!(
        proxykit::InterceptorProxy::value_holder(definition, instance),
        Err(ProxyError::Shape { .. })
    ));
}
