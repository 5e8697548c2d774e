//! Shared class fixtures for the integration suites

#![allow(dead_code)]

use proxykit::{ClassDef, ClassRegistry, FieldDef, MethodDef, ProxyFactory, Value};
use std::sync::Arc;

/// Getter reading `$this->property` from the declaring class's scope
pub fn getter(method: &str, property: &'static str) -> MethodDef {
    MethodDef::new(method, move |ctx, _| ctx.get(property))
}

/// Setter assigning its first argument to `$this->property`
pub fn setter(method: &str, property: &'static str) -> MethodDef {
    MethodDef::new(method, move |ctx, args| {
        ctx.set(property, args[0].clone())?;
        Ok(Value::Null)
    })
    .with_param("value")
}

pub fn base_class() -> ClassDef {
    ClassDef::new("BaseClass")
        .implements("BaseInterface")
        .field(FieldDef::public("publicProperty", "publicPropertyDefault"))
        .field(FieldDef::protected("protectedProperty", "protectedPropertyDefault"))
        .field(FieldDef::private("privateProperty", "privatePropertyDefault"))
        .method(MethodDef::new("publicMethod", |_, _| Ok(Value::str("publicMethodDefault"))))
        .method(
            MethodDef::new("protectedMethod", |_, _| Ok(Value::str("protectedMethodDefault")))
                .with_visibility(proxykit::Visibility::Protected),
        )
        .method(
            MethodDef::new("privateMethod", |_, _| Ok(Value::str("privateMethodDefault")))
                .with_visibility(proxykit::Visibility::Private),
        )
        .method(
            MethodDef::new("publicTypeHintedMethod", |_, args| {
                Ok(Value::str(format!("publicTypeHintedMethodDefault:{}", args[0])))
            })
            .with_param("param"),
        )
        .method(
            MethodDef::new("publicByReferenceMethod", |_, _| {
                Ok(Value::str("publicByReferenceMethodDefault"))
            })
            .returning_ref(),
        )
        .method(getter("getPublicProperty", "publicProperty"))
        .method(getter("getProtectedProperty", "protectedProperty"))
        .method(getter("getPrivateProperty", "privateProperty"))
        .method(
            MethodDef::new("finalMethod", |_, _| Ok(Value::str("finalMethodDefault"))).final_method(),
        )
}

pub fn base_interface() -> ClassDef {
    ClassDef::interface("BaseInterface").method(MethodDef::signature("publicMethod"))
}

pub fn class_with_private_properties() -> ClassDef {
    let mut class = ClassDef::new("ClassWithPrivateProperties");
    for i in 0..3 {
        class = class.field(FieldDef::private(format!("property{}", i), format!("property{}", i)));
    }
    class
        .method(getter("getProperty0", "property0"))
        .method(setter("setProperty0", "property0"))
}

pub fn class_with_colliding_private_inherited_properties() -> ClassDef {
    ClassDef::new("ClassWithCollidingPrivateInheritedProperties")
        .extends("ClassWithPrivateProperties")
        .field(FieldDef::private("property0", "childClassProperty0"))
        .method(getter("getChildProperty0", "property0"))
        .method(setter("setChildProperty0", "property0"))
}

pub fn class_with_mixed_properties() -> ClassDef {
    let mut class = ClassDef::new("ClassWithMixedProperties");
    for i in 0..3 {
        class = class
            .field(FieldDef::public(format!("publicProperty{}", i), format!("publicProperty{}", i)))
            .field(FieldDef::protected(
                format!("protectedProperty{}", i),
                format!("protectedProperty{}", i),
            ))
            .field(FieldDef::private(format!("privateProperty{}", i), format!("privateProperty{}", i)));
    }
    class
}

pub fn class_with_mixed_properties_and_accessor_methods() -> ClassDef {
    class_with_mixed_properties()
        .method(MethodDef::new("get", |ctx, args| {
            let name = args[0].as_str().unwrap_or_default().to_string();
            ctx.get(&name)
        }).with_param("name"))
        .method(MethodDef::new("set", |ctx, args| {
            let name = args[0].as_str().unwrap_or_default().to_string();
            ctx.set(&name, args[1].clone())?;
            Ok(Value::Null)
        }).with_param("name").with_param("value"))
        .method(MethodDef::new("has", |ctx, args| {
            let name = args[0].as_str().unwrap_or_default().to_string();
            Ok(Value::Bool(ctx.isset(&name)?))
        }).with_param("name"))
        .method(MethodDef::new("remove", |ctx, args| {
            let name = args[0].as_str().unwrap_or_default().to_string();
            ctx.unset(&name)?;
            Ok(Value::Null)
        }).with_param("name"))
}

pub fn class_with_counter_constructor() -> ClassDef {
    ClassDef::new("ClassWithCounterConstructor")
        .field(FieldDef::public("amount", 0i64))
        .method(
            MethodDef::new("__construct", |ctx, args| {
                let amount = ctx.get("amount")?.as_int().unwrap_or_default();
                let increment = args[0].as_int().unwrap_or_default();
                ctx.set("amount", amount + increment)?;
                Ok(Value::Null)
            })
            .with_param("increment"),
        )
        .method(getter("getAmount", "amount"))
}

pub fn class_with_public_array_property() -> ClassDef {
    ClassDef::new("ClassWithPublicArrayProperty").field(FieldDef::public("arrayProperty", Value::List(Vec::new())))
}

pub fn class_with_public_properties() -> ClassDef {
    let mut class = ClassDef::new("ClassWithPublicProperties");
    for i in 0..3 {
        class = class.field(FieldDef::public(format!("property{}", i), format!("property{}", i)));
    }
    class
}

pub fn final_class() -> ClassDef {
    ClassDef::new("FinalClass").final_class()
}

/// Every fixture class in one registry
pub fn registry() -> Arc<ClassRegistry> {
    let registry = ClassRegistry::new();
    for class in [
        base_interface(),
        base_class(),
        class_with_private_properties(),
        class_with_colliding_private_inherited_properties(),
        class_with_mixed_properties_and_accessor_methods(),
        class_with_counter_constructor(),
        class_with_public_array_property(),
        class_with_public_properties(),
        final_class(),
    ] {
        registry.register(class);
    }
    Arc::new(registry)
}

pub fn factory() -> ProxyFactory {
    ProxyFactory::new(registry())
}
