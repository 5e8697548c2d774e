//! Object protocol shared by plain instances and every proxy kind

use crate::access::dispatch::{AccessDispatcher, AccessKind, Dispatchable};
use crate::access::scope::ScopePolicy;
use crate::core::class::ClassRegistry;
use crate::core::value::Value;
use crate::errors::Result;
use crate::shape::PropertyTable;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// The class context an access originates from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerScope {
    /// Code outside any class, or a caller that cannot be determined
    Outside,
    Class(String),
}

impl CallerScope {
    pub fn class(name: impl Into<String>) -> Self {
        CallerScope::Class(name.into())
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            CallerScope::Outside => None,
            CallerScope::Class(name) => Some(name),
        }
    }
}

impl fmt::Display for CallerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerScope::Outside => write!(f, "global scope"),
            CallerScope::Class(name) => write!(f, "scope {}", name),
        }
    }
}

/// Property and method access as seen from a caller scope.
///
/// Reads take `&mut self` because the first access on a lazy proxy may run its
/// initializer.
pub trait Object {
    fn class_name(&self) -> &str;

    /// By-value read; later writes to the result never reach the object
    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value>;

    /// By-reference read; writes through the returned reference land in the object
    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value>;

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()>;

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool>;

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()>;

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value>;
}

impl<T: Object + ?Sized> Object for &mut T {
    fn class_name(&self) -> &str {
        (**self).class_name()
    }

    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value> {
        (**self).get_property(scope, name)
    }

    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value> {
        (**self).property_mut(scope, name)
    }

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()> {
        (**self).set_property(scope, name, value)
    }

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool> {
        (**self).has_property(scope, name)
    }

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()> {
        (**self).remove_property(scope, name)
    }

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value> {
        (**self).call_method(scope, name, args)
    }
}

/// `$this` as seen from inside a method body
pub struct MethodContext<'a> {
    this: &'a mut dyn Object,
    scope: CallerScope,
    method: String,
}

impl<'a> MethodContext<'a> {
    pub fn new(this: &'a mut dyn Object, scope: CallerScope, method: impl Into<String>) -> Self {
        Self {
            this,
            scope,
            method: method.into(),
        }
    }

    pub fn this(&mut self) -> &mut dyn Object {
        &mut *self.this
    }

    pub fn scope(&self) -> &CallerScope {
        &self.scope
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn get(&mut self, name: &str) -> Result<Value> {
        self.this.get_property(&self.scope, name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Value> {
        self.this.property_mut(&self.scope, name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.this.set_property(&self.scope, name, value.into())
    }

    pub fn isset(&mut self, name: &str) -> Result<bool> {
        self.this.has_property(&self.scope, name)
    }

    pub fn unset(&mut self, name: &str) -> Result<()> {
        self.this.remove_property(&self.scope, name)
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        self.this.call_method(&self.scope, name, args)
    }
}

/// Physical state of one object: declared slots, dynamic properties and the
/// re-entrancy guards for user-defined fallback accessors
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    pub slots: PropertyTable,
    pub dynamic: BTreeMap<String, Value>,
    pub(crate) guards: HashSet<(AccessKind, String)>,
}

impl ObjectState {
    pub fn new(slots: PropertyTable) -> Self {
        Self {
            slots,
            dynamic: BTreeMap::new(),
            guards: HashSet::new(),
        }
    }
}

/// A plain, non-proxied instance of a registered class
#[derive(Debug, Clone)]
pub struct Instance {
    dispatcher: Arc<AccessDispatcher>,
    state: ObjectState,
}

impl Instance {
    /// Allocates the object and runs `__construct` when the class has one
    pub fn new(dispatcher: Arc<AccessDispatcher>, args: &[Value]) -> Result<Self> {
        let mut instance = Self::without_constructor(dispatcher);
        let has_constructor = instance
            .dispatcher
            .registry()
            .has_method(instance.dispatcher.class_name(), "__construct");
        if has_constructor {
            let scope = CallerScope::class(instance.dispatcher.class_name().to_string());
            instance.call_method(&scope, "__construct", args)?;
        }
        Ok(instance)
    }

    /// Allocates the object with declared defaults, skipping user construction code
    pub fn without_constructor(dispatcher: Arc<AccessDispatcher>) -> Self {
        let slots = PropertyTable::with_defaults(dispatcher.shape().clone());
        Self {
            dispatcher,
            state: ObjectState::new(slots),
        }
    }

    /// Convenience constructor with the default scope policy
    pub fn create(registry: Arc<ClassRegistry>, class_name: &str, args: &[Value]) -> Result<Self> {
        let dispatcher = AccessDispatcher::new(registry, class_name, Arc::new(ScopePolicy::default()))?;
        Self::new(Arc::new(dispatcher), args)
    }

    pub fn dispatcher(&self) -> &Arc<AccessDispatcher> {
        &self.dispatcher
    }

    pub fn properties(&self) -> &PropertyTable {
        &self.state.slots
    }

    pub fn properties_mut(&mut self) -> &mut PropertyTable {
        &mut self.state.slots
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub(crate) fn from_state(dispatcher: Arc<AccessDispatcher>, state: ObjectState) -> Self {
        Self { dispatcher, state }
    }
}

impl Dispatchable for Instance {
    fn access_dispatcher(&self) -> Arc<AccessDispatcher> {
        self.dispatcher.clone()
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn as_object(&mut self) -> &mut dyn Object {
        self
    }
}

impl Object for Instance {
    fn class_name(&self) -> &str {
        self.dispatcher.class_name()
    }

    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.get(self, scope, name)
    }

    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.property_mut(self, scope, name)
    }

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.set(self, scope, name, value)
    }

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.exists(self, scope, name)
    }

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.remove(self, scope, name)
    }

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value> {
        let dispatcher = self.dispatcher.clone();
        dispatcher.call(self, scope, name, args)
    }
}
