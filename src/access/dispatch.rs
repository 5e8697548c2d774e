//! GET / SET / EXISTS / REMOVE / CALL dispatch for plain instances and proxies
//!
//! Every access runs the same pipeline:
//!
//! 1. `Dispatchable::before_access` (where lazy proxies fire their gate)
//! 2. caller-scope resolution of the name
//! 3. the scoped accessor, or the real method for CALL
//! 4. the class's own `__get`/`__set`/`__isset`/`__unset`/`__call`, if any
//! 5. the outsider default: `Null`, a dynamic property, `false` or a no-op
//!
//! A user fallback never re-enters itself for the same (operation, name): a
//! nested access inside `__get('foo')` to `foo` takes step 5 directly.

use crate::access::scope::{AccessResolution, CallerScopeResolver, ScopePolicy};
use crate::core::class::{ClassDef, ClassRegistry, ResolvedMethod, Visibility};
use crate::core::object::{CallerScope, MethodContext, Object, ObjectState};
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use crate::shape::OriginalTypeShape;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Get,
    Set,
    Exists,
    Remove,
    Call,
}

impl AccessKind {
    /// Name of the user-defined fallback for this access kind
    pub fn magic_name(self) -> &'static str {
        match self {
            AccessKind::Get => "__get",
            AccessKind::Set => "__set",
            AccessKind::Exists => "__isset",
            AccessKind::Remove => "__unset",
            AccessKind::Call => "__call",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessKind::Get => "get",
            AccessKind::Set => "set",
            AccessKind::Exists => "exists",
            AccessKind::Remove => "remove",
            AccessKind::Call => "call",
        };
        f.write_str(name)
    }
}

/// One access as seen by `before_access`
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'r> {
    pub kind: AccessKind,
    pub scope: &'r CallerScope,
    /// Property name, or method name for CALL
    pub name: &'r str,
    pub value: Option<&'r Value>,
    pub args: &'r [Value],
}

impl<'r> AccessRequest<'r> {
    pub fn new(kind: AccessKind, scope: &'r CallerScope, name: &'r str) -> Self {
        Self {
            kind,
            scope,
            name,
            value: None,
            args: &[],
        }
    }

    pub fn set(scope: &'r CallerScope, name: &'r str, value: &'r Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(AccessKind::Set, scope, name)
        }
    }

    pub fn call(scope: &'r CallerScope, name: &'r str, args: &'r [Value]) -> Self {
        Self {
            args,
            ..Self::new(AccessKind::Call, scope, name)
        }
    }
}

/// An object whose accesses are routed through an `AccessDispatcher`
pub trait Dispatchable: Object {
    fn access_dispatcher(&self) -> Arc<AccessDispatcher>;

    fn state_mut(&mut self) -> &mut ObjectState;

    /// Hook run before resolution; lazy proxies initialize here
    fn before_access(&mut self, _request: &AccessRequest<'_>) -> Result<()> {
        Ok(())
    }

    /// `$this` handed to method bodies
    fn as_object(&mut self) -> &mut dyn Object;
}

/// Per-class dispatch tables: the class, its classified shape and the scope policy
pub struct AccessDispatcher {
    registry: Arc<ClassRegistry>,
    class: Arc<ClassDef>,
    shape: Arc<OriginalTypeShape>,
    policy: Arc<ScopePolicy>,
}

impl AccessDispatcher {
    pub fn new(
        registry: Arc<ClassRegistry>,
        class_name: &str,
        policy: Arc<ScopePolicy>,
    ) -> Result<Self> {
        let class = registry.require(class_name)?;
        let shape = Arc::new(OriginalTypeShape::classify(&registry, class_name)?);
        Ok(Self::with_shape(registry, class, shape, policy))
    }

    /// Builds a dispatcher over an already classified shape
    pub fn with_shape(
        registry: Arc<ClassRegistry>,
        class: Arc<ClassDef>,
        shape: Arc<OriginalTypeShape>,
        policy: Arc<ScopePolicy>,
    ) -> Self {
        Self {
            registry,
            class,
            shape,
            policy,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn shape(&self) -> &Arc<OriginalTypeShape> {
        &self.shape
    }

    pub fn policy(&self) -> &Arc<ScopePolicy> {
        &self.policy
    }

    pub fn resolver(&self) -> CallerScopeResolver<'_> {
        CallerScopeResolver::new(&self.registry, &self.shape, &self.policy)
    }

    pub fn get(&self, obj: &mut dyn Dispatchable, scope: &CallerScope, name: &str) -> Result<Value> {
        obj.before_access(&AccessRequest::new(AccessKind::Get, scope, name))?;

        match self.resolver().resolve(scope, name) {
            AccessResolution::Slot(accessor) => {
                if let Some(value) = accessor.get(&obj.state_mut().slots) {
                    return Ok(value);
                }
                if let Some(value) = self.fallback(obj, AccessKind::Get, name, &[Value::str(name)])? {
                    return Ok(value);
                }
                Ok(self
                    .shape
                    .field(accessor.key())
                    .map(|field| field.default.clone())
                    .unwrap_or_default())
            }
            AccessResolution::Undeclared => {
                if let Some(value) = obj.state_mut().dynamic.get(name) {
                    return Ok(value.clone());
                }
                let fallback = self.fallback(obj, AccessKind::Get, name, &[Value::str(name)])?;
                Ok(fallback.unwrap_or(Value::Null))
            }
            AccessResolution::Inaccessible {
                visibility,
                declaring_class,
            } => match self.fallback(obj, AccessKind::Get, name, &[Value::str(name)])? {
                Some(value) => Ok(value),
                None => Err(self.violation(scope, name, visibility, declaring_class)),
            },
        }
    }

    /// By-reference read. The path is decided before the object is borrowed for
    /// the returned lifetime.
    pub fn property_mut<'o>(
        &self,
        obj: &'o mut dyn Dispatchable,
        scope: &CallerScope,
        name: &str,
    ) -> Result<&'o mut Value> {
        obj.before_access(&AccessRequest::new(AccessKind::Get, scope, name))?;

        match self.resolver().resolve(scope, name) {
            AccessResolution::Slot(accessor) => {
                let key = accessor.key().clone();
                accessor
                    .get_mut(&mut obj.state_mut().slots)
                    .ok_or_else(|| ProxyError::shape(self.class_name(), format!("missing slot {}", key)))
            }
            AccessResolution::Undeclared => {
                let state = obj.state_mut();
                let present = state.dynamic.contains_key(name);
                let overridden = self.fallback_available(state, AccessKind::Get, name);

                if !present {
                    if overridden {
                        return Err(ProxyError::IndirectModification {
                            class: self.class_name().to_string(),
                            member: name.to_string(),
                        });
                    }
                    if !self.policy.allow_dynamic_properties {
                        return Err(self.dynamic_rejected(name));
                    }
                }
                Ok(obj
                    .state_mut()
                    .dynamic
                    .entry(name.to_string())
                    .or_insert(Value::Null))
            }
            AccessResolution::Inaccessible {
                visibility,
                declaring_class,
            } => {
                if self.fallback_available(obj.state_mut(), AccessKind::Get, name) {
                    return Err(ProxyError::IndirectModification {
                        class: self.class_name().to_string(),
                        member: name.to_string(),
                    });
                }
                Err(self.violation(scope, name, visibility, declaring_class))
            }
        }
    }

    pub fn set(
        &self,
        obj: &mut dyn Dispatchable,
        scope: &CallerScope,
        name: &str,
        value: Value,
    ) -> Result<()> {
        obj.before_access(&AccessRequest::set(scope, name, &value))?;

        match self.resolver().resolve(scope, name) {
            AccessResolution::Slot(accessor) => {
                accessor.set(&mut obj.state_mut().slots, value);
                Ok(())
            }
            AccessResolution::Undeclared => {
                if let Some(existing) = obj.state_mut().dynamic.get_mut(name) {
                    *existing = value;
                    return Ok(());
                }
                let args = [Value::str(name), value];
                if self.fallback(obj, AccessKind::Set, name, &args)?.is_some() {
                    return Ok(());
                }
                if !self.policy.allow_dynamic_properties {
                    return Err(self.dynamic_rejected(name));
                }
                let [_, value] = args;
                obj.state_mut().dynamic.insert(name.to_string(), value);
                Ok(())
            }
            AccessResolution::Inaccessible {
                visibility,
                declaring_class,
            } => {
                let args = [Value::str(name), value];
                match self.fallback(obj, AccessKind::Set, name, &args)? {
                    Some(_) => Ok(()),
                    None => Err(self.violation(scope, name, visibility, declaring_class)),
                }
            }
        }
    }

    pub fn exists(&self, obj: &mut dyn Dispatchable, scope: &CallerScope, name: &str) -> Result<bool> {
        obj.before_access(&AccessRequest::new(AccessKind::Exists, scope, name))?;

        let args = [Value::str(name)];
        match self.resolver().resolve(scope, name) {
            AccessResolution::Slot(accessor) => {
                let slots = &obj.state_mut().slots;
                if accessor.exists(slots) {
                    return Ok(true);
                }
                if slots.is_present(accessor.key()) {
                    // Present but Null
                    return Ok(false);
                }
                let fallback = self.fallback(obj, AccessKind::Exists, name, &args)?;
                Ok(fallback.map_or(false, |v| v.is_truthy()))
            }
            AccessResolution::Undeclared => {
                if let Some(value) = obj.state_mut().dynamic.get(name) {
                    return Ok(value.is_set());
                }
                let fallback = self.fallback(obj, AccessKind::Exists, name, &args)?;
                Ok(fallback.map_or(false, |v| v.is_truthy()))
            }
            AccessResolution::Inaccessible { .. } => {
                let fallback = self.fallback(obj, AccessKind::Exists, name, &args)?;
                Ok(fallback.map_or(false, |v| v.is_truthy()))
            }
        }
    }

    pub fn remove(&self, obj: &mut dyn Dispatchable, scope: &CallerScope, name: &str) -> Result<()> {
        obj.before_access(&AccessRequest::new(AccessKind::Remove, scope, name))?;

        let args = [Value::str(name)];
        match self.resolver().resolve(scope, name) {
            AccessResolution::Slot(accessor) => {
                accessor.remove(&mut obj.state_mut().slots);
                Ok(())
            }
            AccessResolution::Undeclared => {
                if obj.state_mut().dynamic.remove(name).is_some() {
                    return Ok(());
                }
                self.fallback(obj, AccessKind::Remove, name, &args)?;
                Ok(())
            }
            AccessResolution::Inaccessible {
                visibility,
                declaring_class,
            } => match self.fallback(obj, AccessKind::Remove, name, &args)? {
                Some(_) => Ok(()),
                None => Err(self.violation(scope, name, visibility, declaring_class)),
            },
        }
    }

    pub fn call(
        &self,
        obj: &mut dyn Dispatchable,
        scope: &CallerScope,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        obj.before_access(&AccessRequest::call(scope, name, args))?;

        let fallback_args = || [Value::str(name), Value::List(args.to_vec())];

        let Some(method) = self.resolve_method(scope, name) else {
            return match self.fallback(obj, AccessKind::Call, name, &fallback_args())? {
                Some(value) => Ok(value),
                None => Err(ProxyError::UnknownMethod {
                    class: self.class_name().to_string(),
                    method: name.to_string(),
                }),
            };
        };

        if !self.method_visible(scope, &method) {
            return match self.fallback(obj, AccessKind::Call, name, &fallback_args())? {
                Some(value) => Ok(value),
                None => {
                    debug!(
                        event = "access_violation",
                        class = %method.declaring_class,
                        method = %name,
                        scope = %scope,
                        "Method not visible from caller scope"
                    );
                    Err(ProxyError::MethodAccessViolation {
                        class: method.declaring_class.clone(),
                        method: name.to_string(),
                        visibility: method.def.visibility,
                        scope: scope.to_string(),
                    })
                }
            };
        }

        self.invoke(obj, &method, args)
    }

    /// Runs a resolved method body with `$this` bound to `obj` and the caller
    /// scope set to the declaring class. No visibility check, no gate.
    pub fn invoke(
        &self,
        obj: &mut dyn Dispatchable,
        method: &ResolvedMethod,
        args: &[Value],
    ) -> Result<Value> {
        let Some(body) = method.def.body.clone() else {
            return Err(ProxyError::AbstractMethod {
                class: method.declaring_class.clone(),
                method: method.def.name.clone(),
            });
        };

        let expected = method.def.required_params();
        if args.len() < expected {
            return Err(ProxyError::ArgumentCount {
                class: method.declaring_class.clone(),
                method: method.def.name.clone(),
                expected,
                found: args.len(),
            });
        }

        trace!(class = %method.declaring_class, method = %method.def.name, "Invoking method");
        let scope = CallerScope::class(method.declaring_class.clone());
        let mut context = MethodContext::new(obj.as_object(), scope, method.def.name.clone());
        body(&mut context, args)
    }

    /// The caller's own private declaration first, then the most-derived one
    fn resolve_method(&self, scope: &CallerScope, name: &str) -> Option<ResolvedMethod> {
        scope
            .class_name()
            .and_then(|caller| self.registry.find_private_method(self.class_name(), caller, name))
            .or_else(|| self.registry.find_method(self.class_name(), name))
    }

    /// Invokes `name` when the class defines it; `None` otherwise
    pub fn invoke_if_defined(
        &self,
        obj: &mut dyn Dispatchable,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        match self.registry.find_method(self.class_name(), name) {
            Some(method) => self.invoke(obj, &method, args).map(Some),
            None => Ok(None),
        }
    }

    fn method_visible(&self, scope: &CallerScope, method: &ResolvedMethod) -> bool {
        match method.def.visibility {
            Visibility::Public => true,
            Visibility::Protected => scope
                .class_name()
                .map_or(false, |caller| self.registry.is_compatible(caller, &method.declaring_class)),
            Visibility::Private => scope.class_name() == Some(method.declaring_class.as_str()),
        }
    }

    fn fallback_available(&self, state: &ObjectState, kind: AccessKind, name: &str) -> bool {
        !state.guards.contains(&(kind, name.to_string()))
            && self.registry.has_method(self.class_name(), kind.magic_name())
    }

    /// Runs the class's own fallback for `kind`, unless one is already running for `name`
    fn fallback(
        &self,
        obj: &mut dyn Dispatchable,
        kind: AccessKind,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let Some(method) = self.registry.find_method(self.class_name(), kind.magic_name()) else {
            return Ok(None);
        };

        let guard = (kind, name.to_string());
        if !obj.state_mut().guards.insert(guard.clone()) {
            trace!(operation = %kind, property = %name, "Fallback already active, using default");
            return Ok(None);
        }

        let result = self.invoke(obj, &method, args);
        obj.state_mut().guards.remove(&guard);
        result.map(Some)
    }

    fn violation(
        &self,
        scope: &CallerScope,
        name: &str,
        visibility: Visibility,
        declaring_class: String,
    ) -> ProxyError {
        debug!(
            event = "access_violation",
            class = %declaring_class,
            property = %name,
            visibility = %visibility,
            scope = %scope,
            "Property not visible from caller scope"
        );
        ProxyError::AccessViolation {
            class: declaring_class,
            member: name.to_string(),
            visibility,
            scope: scope.to_string(),
        }
    }

    fn dynamic_rejected(&self, name: &str) -> ProxyError {
        ProxyError::DynamicProperty {
            class: self.class_name().to_string(),
            member: name.to_string(),
        }
    }
}

impl fmt::Debug for AccessDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessDispatcher")
            .field("class", &self.class.name)
            .field("slots", &self.shape.slot_count())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::class::{ClassDef, FieldDef, MethodDef};
    use crate::core::object::Instance;

    fn registry() -> Arc<ClassRegistry> {
        let registry = ClassRegistry::new();
        registry.register(
            ClassDef::new("Plain")
                .field(FieldDef::public("name", "default"))
                .field(FieldDef::private("secret", "hidden"))
                .method(
                    MethodDef::new("reveal", |ctx, _| ctx.get("secret"))
                        .with_visibility(Visibility::Public),
                )
                .method(
                    MethodDef::new("internal", |_, _| Ok(Value::Int(1)))
                        .with_visibility(Visibility::Private),
                ),
        );
        registry.register(
            ClassDef::new("Magic")
                .field(FieldDef::private("store", Value::empty_map()))
                .method(MethodDef::new("__get", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    // Re-reading the same name must not recurse
                    let nested = ctx.get(&name)?;
                    let store = ctx.get("store")?;
                    Ok(store.get(&name).cloned().unwrap_or(nested))
                }).with_param("name"))
                .method(MethodDef::new("__set", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    let slot = ctx.get_mut("store")?;
                    slot.insert(name, args[1].clone());
                    Ok(Value::Null)
                }).with_param("name").with_param("value")),
        );
        registry.register(
            ClassDef::new("Base")
                .method(
                    MethodDef::new("helper", |_, _| Ok(Value::str("base")))
                        .with_visibility(Visibility::Private),
                )
                .method(MethodDef::new("callHelper", |ctx, _| ctx.call("helper", &[]))),
        );
        registry.register(
            ClassDef::new("Child")
                .extends("Base")
                .method(
                    MethodDef::new("helper", |_, _| Ok(Value::str("child")))
                        .with_visibility(Visibility::Private),
                )
                .method(MethodDef::new("callOwnHelper", |ctx, _| ctx.call("helper", &[]))),
        );
        registry.register(
            ClassDef::new("Tracked")
                .field(FieldDef::private("store", Value::empty_map()))
                .field(FieldDef::private("removed", Value::List(Vec::new())))
                .method(MethodDef::new("remember", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    ctx.get_mut("store")?.insert(name, args[1].clone());
                    Ok(Value::Null)
                }).with_param("name").with_param("value"))
                .method(
                    MethodDef::new("hidden", |_, _| Ok(Value::str("hidden")))
                        .with_visibility(Visibility::Private),
                )
                .method(MethodDef::new("__isset", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    // Same name again: answered without the fallback
                    let nested = ctx.isset(&name)?;
                    let store = ctx.get("store")?;
                    Ok(store.get(&name).cloned().unwrap_or(Value::Bool(nested)))
                }).with_param("name"))
                .method(MethodDef::new("__unset", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    ctx.unset(&name)?;
                    if let Value::List(items) = ctx.get_mut("removed")? {
                        items.push(Value::str(name));
                    }
                    Ok(Value::Null)
                }).with_param("name"))
                .method(MethodDef::new("__call", |ctx, args| {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    let count = match &args[1] {
                        Value::List(items) => items.len(),
                        _ => 0,
                    };
                    match ctx.call(&name, &[]) {
                        Ok(value) => Ok(value),
                        Err(ProxyError::UnknownMethod { .. }) => {
                            Ok(Value::str(format!("{}/{}", name, count)))
                        }
                        Err(e) => Err(e),
                    }
                }).with_param("name").with_param("arguments")),
        );
        Arc::new(registry)
    }

    #[test]
    fn test_private_property_requires_declaring_scope() {
        let mut obj = Instance::create(registry(), "Plain", &[]).unwrap();

        let err = obj.get_property(&CallerScope::Outside, "secret").unwrap_err();
        assert!(err.is_access_violation());
        assert_eq!(
            obj.call_method(&CallerScope::Outside, "reveal", &[]).unwrap(),
            Value::str("hidden")
        );
        assert!(!obj.has_property(&CallerScope::Outside, "secret").unwrap());
    }

    #[test]
    fn test_private_method_is_not_callable_from_outside() {
        let mut obj = Instance::create(registry(), "Plain", &[]).unwrap();
        assert!(matches!(
            obj.call_method(&CallerScope::Outside, "internal", &[]),
            Err(ProxyError::MethodAccessViolation { .. })
        ));
        assert!(matches!(
            obj.call_method(&CallerScope::Outside, "nope", &[]),
            Err(ProxyError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_private_method_binds_to_calling_class() {
        let mut obj = Instance::create(registry(), "Child", &[]).unwrap();
        let outside = CallerScope::Outside;

        assert_eq!(obj.call_method(&outside, "callHelper", &[]).unwrap(), Value::str("base"));
        assert_eq!(obj.call_method(&outside, "callOwnHelper", &[]).unwrap(), Value::str("child"));
        assert_eq!(
            obj.call_method(&CallerScope::class("Base"), "helper", &[]).unwrap(),
            Value::str("base")
        );
        assert!(matches!(
            obj.call_method(&outside, "helper", &[]),
            Err(ProxyError::MethodAccessViolation { .. })
        ));
    }

    #[test]
    fn test_isset_fallback_converts_result_to_bool() {
        let mut obj = Instance::create(registry(), "Tracked", &[]).unwrap();
        let outside = CallerScope::Outside;

        obj.call_method(&outside, "remember", &[Value::str("count"), Value::Int(0)]).unwrap();
        obj.call_method(&outside, "remember", &[Value::str("label"), Value::str("x")]).unwrap();
        obj.call_method(&outside, "remember", &[Value::str("zero"), Value::str("0")]).unwrap();

        assert!(!obj.has_property(&outside, "count").unwrap());
        assert!(obj.has_property(&outside, "label").unwrap());
        assert!(!obj.has_property(&outside, "zero").unwrap());
        // Nested check of the same name inside __isset does not re-enter it
        assert!(!obj.has_property(&outside, "absent").unwrap());
        // Private slot seen from outside also goes through __isset
        assert!(obj.has_property(&outside, "store").unwrap());
        assert!(obj.state().guards.is_empty());
    }

    #[test]
    fn test_unset_fallback_runs_once_per_name() {
        let mut obj = Instance::create(registry(), "Tracked", &[]).unwrap();
        let outside = CallerScope::Outside;

        obj.remove_property(&outside, "phantom").unwrap();
        obj.call_method(&outside, "remember", &[Value::str("kept"), Value::Int(1)]).unwrap();
        // Private slot from outside: __unset's nested unset clears the real slot
        obj.remove_property(&outside, "store").unwrap();
        assert_eq!(
            obj.get_property(&CallerScope::class("Tracked"), "removed").unwrap(),
            Value::List(vec![Value::str("phantom"), Value::str("store")])
        );
        assert_eq!(
            obj.get_property(&CallerScope::class("Tracked"), "store").unwrap(),
            Value::empty_map()
        );

        // Dynamic properties are removed directly
        obj.set_property(&outside, "extra", Value::Int(1)).unwrap();
        obj.remove_property(&outside, "extra").unwrap();
        assert_eq!(
            obj.get_property(&CallerScope::class("Tracked"), "removed").unwrap(),
            Value::List(vec![Value::str("phantom"), Value::str("store")])
        );
    }

    #[test]
    fn test_call_fallback_handles_unknown_and_hidden_methods() {
        let mut obj = Instance::create(registry(), "Tracked", &[]).unwrap();
        let outside = CallerScope::Outside;

        // Nested call of the same unknown name fails instead of recursing
        assert_eq!(
            obj.call_method(&outside, "frobnicate", &[Value::Int(1), Value::Int(2)]).unwrap(),
            Value::str("frobnicate/2")
        );
        // Not visible from outside; __call runs it from the class scope
        assert_eq!(obj.call_method(&outside, "hidden", &[]).unwrap(), Value::str("hidden"));
        assert!(obj.state().guards.is_empty());
    }

    #[test]
    fn test_undeclared_names_become_dynamic_properties() {
        let mut obj = Instance::create(registry(), "Plain", &[]).unwrap();
        let outside = CallerScope::Outside;

        assert_eq!(obj.get_property(&outside, "extra").unwrap(), Value::Null);
        assert!(!obj.has_property(&outside, "extra").unwrap());

        obj.set_property(&outside, "extra", Value::Int(3)).unwrap();
        assert_eq!(obj.get_property(&outside, "extra").unwrap(), Value::Int(3));

        obj.remove_property(&outside, "extra").unwrap();
        assert!(!obj.has_property(&outside, "extra").unwrap());
        obj.remove_property(&outside, "extra").unwrap();
    }

    #[test]
    fn test_dynamic_properties_can_be_disabled() {
        let policy = Arc::new(ScopePolicy::default().with_dynamic_properties(false));
        let dispatcher = AccessDispatcher::new(registry(), "Plain", policy).unwrap();
        let mut obj = Instance::new(Arc::new(dispatcher), &[]).unwrap();

        assert!(matches!(
            obj.set_property(&CallerScope::Outside, "extra", Value::Int(1)),
            Err(ProxyError::DynamicProperty { .. })
        ));
    }

    #[test]
    fn test_removed_slot_reads_declared_default() {
        let mut obj = Instance::create(registry(), "Plain", &[]).unwrap();
        let outside = CallerScope::Outside;

        obj.set_property(&outside, "name", Value::str("changed")).unwrap();
        obj.remove_property(&outside, "name").unwrap();
        assert!(!obj.has_property(&outside, "name").unwrap());
        assert_eq!(obj.get_property(&outside, "name").unwrap(), Value::str("default"));
    }

    #[test]
    fn test_magic_fallbacks_with_recursion_guard() {
        let mut obj = Instance::create(registry(), "Magic", &[]).unwrap();
        let outside = CallerScope::Outside;

        assert_eq!(obj.get_property(&outside, "missing").unwrap(), Value::Null);

        obj.set_property(&outside, "color", Value::str("red")).unwrap();
        assert_eq!(obj.get_property(&outside, "color").unwrap(), Value::str("red"));
        assert!(obj.state().dynamic.is_empty());

        // Private slot from outside goes through __get instead of failing
        assert_eq!(
            obj.get_property(&outside, "store").unwrap(),
            Value::map([("color", Value::str("red"))])
        );
        assert!(matches!(
            obj.property_mut(&outside, "store"),
            Err(ProxyError::IndirectModification { .. })
        ));
    }

    #[test]
    fn test_property_mut_writes_through() {
        let mut obj = Instance::create(registry(), "Plain", &[]).unwrap();
        let outside = CallerScope::Outside;

        *obj.property_mut(&outside, "name").unwrap() = Value::List(vec![Value::Int(1)]);
        if let Value::List(items) = obj.property_mut(&outside, "name").unwrap() {
            items.push(Value::Int(2));
        }
        assert_eq!(
            obj.get_property(&outside, "name").unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }
}
