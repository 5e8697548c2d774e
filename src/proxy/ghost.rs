//! Lazy-loading ghost objects
//!
//! A ghost embeds the full state of its original class but starts with every
//! slot unset. The first gated access runs the initializer, which fills the
//! slots in place; from then on the ghost behaves exactly like a plain
//! instance of the original class.

use crate::access::dispatch::{AccessDispatcher, AccessKind, AccessRequest, Dispatchable};
use crate::core::object::{CallerScope, Object, ObjectState};
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use crate::proxy::definition::ProxyDefinition;
use crate::proxy::gate::{InitializationGate, InitializerControl};
use crate::shape::{OriginalTypeShape, PropertyTable, SlotKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

pub type GhostInitializer = Arc<dyn Fn(&mut GhostInitialization<'_>) -> Result<()> + Send + Sync>;

/// Per-ghost behavior switches
#[derive(Debug, Clone, Default)]
pub struct GhostOptions {
    /// Slots that never trigger initialization and are never reset
    pub skipped: HashSet<SlotKey>,
    /// Whether method calls fire the gate themselves, not just the state they touch
    pub initialize_on_method_call: bool,
}

impl GhostOptions {
    /// Resolves skipped property names against a shape.
    ///
    /// `name` matches a public or protected slot, `Class::name` a private one.
    pub fn with_skipped<S: AsRef<str>>(mut self, shape: &OriginalTypeShape, names: &[S]) -> Result<Self> {
        for raw in names {
            let raw = raw.as_ref();
            let key = match raw.split_once("::") {
                Some((class, name)) => SlotKey::private(class, name),
                None if shape.is_public(raw) => SlotKey::public(raw),
                None => SlotKey::protected(raw),
            };
            if shape.slot_index(&key).is_none() {
                return Err(ProxyError::Config(format!(
                    "skipped property '{}' is not declared by {}",
                    raw,
                    shape.class_name()
                )));
            }
            self.skipped.insert(key);
        }
        Ok(self)
    }

    pub fn initialize_on_method_call(mut self, enabled: bool) -> Self {
        self.initialize_on_method_call = enabled;
        self
    }
}

/// Everything a running ghost initializer can see and touch
pub struct GhostInitialization<'g> {
    proxy: &'g mut GhostObject,
    operation: &'g str,
    parameters: Value,
    control: &'g mut InitializerControl<GhostInitializer>,
}

impl<'g> GhostInitialization<'g> {
    /// The ghost itself; accesses made through it are not gated again
    pub fn proxy(&mut self) -> &mut GhostObject {
        &mut *self.proxy
    }

    /// `__get`, `__set`, `__isset`, `__unset`, `__clone`, `__sleep`,
    /// `initializeProxy`, or the name of the called method
    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Parameters of the triggering operation, keyed by name
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn control(&mut self) -> &mut InitializerControl<GhostInitializer> {
        &mut *self.control
    }

    /// Every slot of the ghost, declared defaults already in place
    pub fn properties(&mut self) -> &mut PropertyTable {
        &mut self.proxy.state.slots
    }
}

/// Serialized form of a proxy's state. Initializers never survive serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySnapshot {
    pub class: String,
    pub slots: Vec<(SlotKey, Option<Value>)>,
    pub dynamic: BTreeMap<String, Value>,
}

impl ProxySnapshot {
    pub fn capture(class: &str, state: &ObjectState) -> Self {
        Self {
            class: class.to_string(),
            slots: state.slots.snapshot(),
            dynamic: state.dynamic.clone(),
        }
    }

    pub fn into_state(self, shape: Arc<OriginalTypeShape>) -> ObjectState {
        let mut state = ObjectState::new(PropertyTable::from_snapshot(shape, self.slots));
        state.dynamic = self.dynamic;
        state
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[derive(Debug)]
pub struct GhostObject {
    definition: Arc<ProxyDefinition>,
    state: ObjectState,
    gate: InitializationGate<GhostInitializer>,
    options: Arc<GhostOptions>,
}

impl GhostObject {
    /// Allocates an uninitialized ghost without running the original constructor
    pub fn lazy<F>(definition: Arc<ProxyDefinition>, initializer: F) -> Self
    where
        F: Fn(&mut GhostInitialization<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::lazy_with_options(definition, Arc::new(initializer), GhostOptions::default())
    }

    pub fn lazy_with_options(
        definition: Arc<ProxyDefinition>,
        initializer: GhostInitializer,
        options: GhostOptions,
    ) -> Self {
        let mut slots = PropertyTable::with_defaults(definition.shape().clone());
        let unset: Vec<SlotKey> = definition
            .shape()
            .fields()
            .iter()
            .map(|f| f.key.clone())
            .filter(|key| !options.skipped.contains(key))
            .collect();
        for key in &unset {
            slots.remove(key);
        }

        Self {
            definition,
            state: ObjectState::new(slots),
            gate: InitializationGate::armed(initializer),
            options: Arc::new(options),
        }
    }

    /// Runs the original `__construct` on the ghost; the result is already initialized
    pub fn construct(definition: Arc<ProxyDefinition>, args: &[Value]) -> Result<Self> {
        let slots = PropertyTable::with_defaults(definition.shape().clone());
        let class = definition.class_name().to_string();
        let mut ghost = Self {
            definition,
            state: ObjectState::new(slots),
            gate: InitializationGate::initialized(),
            options: Arc::new(GhostOptions::default()),
        };
        let dispatcher = ghost.definition.dispatcher().clone();
        if dispatcher.registry().has_method(&class, "__construct") {
            ghost.call_method(&CallerScope::class(class), "__construct", args)?;
        }
        Ok(ghost)
    }

    /// Rebuilds an initialized ghost from serialized state
    pub fn restore(definition: Arc<ProxyDefinition>, snapshot: ProxySnapshot) -> Result<Self> {
        if snapshot.class != definition.class_name() {
            return Err(ProxyError::Serialization(format!(
                "snapshot of {} cannot restore a ghost of {}",
                snapshot.class,
                definition.class_name()
            )));
        }
        let state = snapshot.into_state(definition.shape().clone());
        let mut ghost = Self {
            definition,
            state,
            gate: InitializationGate::initialized(),
            options: Arc::new(GhostOptions::default()),
        };
        let dispatcher = ghost.definition.dispatcher().clone();
        dispatcher.invoke_if_defined(&mut ghost, "__wakeup", &[])?;
        Ok(ghost)
    }

    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }

    pub fn properties(&self) -> &PropertyTable {
        &self.state.slots
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn is_proxy_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    /// Forces initialization; returns whether the initializer ran
    pub fn initialize_proxy(&mut self) -> Result<bool> {
        self.initialize("initializeProxy", Value::empty_map())
    }

    pub fn proxy_initializer(&self) -> Option<GhostInitializer> {
        self.gate.initializer().cloned()
    }

    /// Re-arms the ghost with `initializer`, or marks it initialized with `None`
    pub fn set_proxy_initializer(&mut self, initializer: Option<GhostInitializer>) {
        self.gate.set_initializer(initializer);
    }

    /// Initializes the ghost, then copies it. The original `__clone` runs on the copy.
    pub fn try_clone(&mut self) -> Result<Self> {
        self.initialize("__clone", Value::empty_map())?;
        let mut copy = Self {
            definition: self.definition.clone(),
            state: self.state.clone(),
            gate: self.gate.clone(),
            options: self.options.clone(),
        };
        copy.state.guards.clear();
        let dispatcher = copy.definition.dispatcher().clone();
        dispatcher.invoke_if_defined(&mut copy, "__clone", &[])?;
        Ok(copy)
    }

    /// Initializes the ghost and captures every slot and dynamic property
    pub fn snapshot(&mut self) -> Result<ProxySnapshot> {
        self.initialize("__sleep", Value::empty_map())?;
        Ok(ProxySnapshot::capture(self.definition.class_name(), &self.state))
    }

    fn initialize(&mut self, operation: &str, parameters: Value) -> Result<bool> {
        let Some(mut pending) = self.gate.begin(operation) else {
            return Ok(false);
        };

        self.state.slots.reset_to_defaults(&self.options.skipped);
        let initializer = pending.initializer().clone();
        let result = {
            let mut initialization = GhostInitialization {
                proxy: self,
                operation,
                parameters,
                control: &mut pending.control,
            };
            initializer(&mut initialization)
        };

        self.gate.complete(pending, result)?;
        debug!(
            event = "ghost_initialized",
            class = %self.definition.class_name(),
            operation = %operation,
            "Ghost object initialized"
        );
        Ok(true)
    }

    /// Operation name and parameters passed to the initializer for one access
    fn describe(&self, request: &AccessRequest<'_>) -> (String, Value) {
        let name = Value::str(request.name);
        match request.kind {
            AccessKind::Get | AccessKind::Exists | AccessKind::Remove => (
                request.kind.magic_name().to_string(),
                Value::map([("name", name)]),
            ),
            AccessKind::Set => (
                request.kind.magic_name().to_string(),
                Value::map([("name", name), ("value", request.value.cloned().unwrap_or_default())]),
            ),
            AccessKind::Call => {
                let registry = self.definition.registry();
                match registry.find_method(self.definition.class_name(), request.name) {
                    Some(method) => {
                        let params = method
                            .def
                            .params
                            .iter()
                            .zip(request.args.iter())
                            .map(|(param, arg)| (param.name.clone(), arg.clone()));
                        (request.name.to_string(), Value::map(params))
                    }
                    None => (
                        request.kind.magic_name().to_string(),
                        Value::map([
                            ("name", name),
                            ("arguments", Value::List(request.args.to_vec())),
                        ]),
                    ),
                }
            }
        }
    }

    fn is_skipped(&self, request: &AccessRequest<'_>) -> bool {
        if self.options.skipped.is_empty() {
            return false;
        }
        self.definition
            .dispatcher()
            .resolver()
            .resolve(request.scope, request.name)
            .slot_key()
            .map_or(false, |key| self.options.skipped.contains(key))
    }
}

impl Dispatchable for GhostObject {
    fn access_dispatcher(&self) -> Arc<AccessDispatcher> {
        self.definition.dispatcher().clone()
    }

    fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    fn before_access(&mut self, request: &AccessRequest<'_>) -> Result<()> {
        if self.gate.is_initialized() {
            return Ok(());
        }
        let exempt = match request.kind {
            AccessKind::Call => !self.options.initialize_on_method_call,
            _ => self.is_skipped(request),
        };
        if exempt {
            return Ok(());
        }
        let (operation, parameters) = self.describe(request);
        self.initialize(&operation, parameters).map(|_| ())
    }

    fn as_object(&mut self) -> &mut dyn Object {
        self
    }
}

impl Object for GhostObject {
    fn class_name(&self) -> &str {
        self.definition.class_name()
    }

    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value> {
        let dispatcher = self.access_dispatcher();
        dispatcher.get(self, scope, name)
    }

    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value> {
        let dispatcher = self.access_dispatcher();
        dispatcher.property_mut(self, scope, name)
    }

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()> {
        let dispatcher = self.access_dispatcher();
        dispatcher.set(self, scope, name, value)
    }

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool> {
        let dispatcher = self.access_dispatcher();
        dispatcher.exists(self, scope, name)
    }

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()> {
        let dispatcher = self.access_dispatcher();
        dispatcher.remove(self, scope, name)
    }

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value> {
        let dispatcher = self.access_dispatcher();
        dispatcher.call(self, scope, name, args)
    }
}
