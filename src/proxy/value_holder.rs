//! Lazy value holders
//!
//! Unlike a ghost, a value holder embeds no state of its own. Its initializer
//! produces a real instance of the original class, and every access after the
//! gate fires is forwarded to that instance with the caller scope unchanged.

use crate::access::dispatch::AccessDispatcher;
use crate::core::object::{CallerScope, Instance, Object};
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use crate::proxy::definition::ProxyDefinition;
use crate::proxy::gate::{InitializationGate, InitializerControl};
use crate::proxy::ghost::ProxySnapshot;
use std::sync::Arc;
use tracing::debug;

pub type ValueHolderInitializer =
    Arc<dyn Fn(&mut ValueHolderInitialization<'_>) -> Result<()> + Send + Sync>;

pub struct ValueHolderInitialization<'h> {
    definition: &'h ProxyDefinition,
    wrapped: &'h mut Option<Instance>,
    operation: &'h str,
    parameters: Value,
    control: &'h mut InitializerControl<ValueHolderInitializer>,
}

impl<'h> ValueHolderInitialization<'h> {
    pub fn definition(&self) -> &ProxyDefinition {
        self.definition
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn control(&mut self) -> &mut InitializerControl<ValueHolderInitializer> {
        &mut *self.control
    }

    pub fn wrapped(&mut self) -> Option<&mut Instance> {
        self.wrapped.as_mut()
    }

    /// Installs the real instance; it must be the proxied class or a subclass of it
    pub fn set_wrapped(&mut self, instance: Instance) -> Result<()> {
        let registry = self.definition.registry();
        if !registry.is_a(instance.class_name(), self.definition.class_name()) {
            return Err(ProxyError::shape(
                self.definition.class_name(),
                format!("{} is not a {}", instance.class_name(), self.definition.class_name()),
            ));
        }
        *self.wrapped = Some(instance);
        Ok(())
    }

    /// Builds and installs a fresh instance of the proxied class
    pub fn construct(&mut self, args: &[Value]) -> Result<()> {
        let instance = Instance::new(self.definition.dispatcher().clone(), args)?;
        self.set_wrapped(instance)
    }
}

#[derive(Debug)]
pub struct LazyValueHolder {
    definition: Arc<ProxyDefinition>,
    wrapped: Option<Instance>,
    gate: InitializationGate<ValueHolderInitializer>,
}

impl LazyValueHolder {
    pub fn new<F>(definition: Arc<ProxyDefinition>, initializer: F) -> Self
    where
        F: Fn(&mut ValueHolderInitialization<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_initializer(definition, Arc::new(initializer))
    }

    pub fn with_initializer(definition: Arc<ProxyDefinition>, initializer: ValueHolderInitializer) -> Self {
        Self {
            definition,
            wrapped: None,
            gate: InitializationGate::armed(initializer),
        }
    }

    /// An initialized holder around a snapshot of the wrapped instance
    pub fn restore(definition: Arc<ProxyDefinition>, snapshot: ProxySnapshot) -> Result<Self> {
        let dispatcher = if snapshot.class == definition.class_name() {
            definition.dispatcher().clone()
        } else {
            let registry = definition.registry().clone();
            if !registry.is_a(&snapshot.class, definition.class_name()) {
                return Err(ProxyError::Serialization(format!(
                    "snapshot of {} cannot restore a holder of {}",
                    snapshot.class,
                    definition.class_name()
                )));
            }
            let policy = definition.dispatcher().policy().clone();
            Arc::new(AccessDispatcher::new(registry, &snapshot.class, policy)?)
        };
        let state = snapshot.into_state(dispatcher.shape().clone());
        Ok(Self {
            definition,
            wrapped: Some(Instance::from_state(dispatcher, state)),
            gate: InitializationGate::initialized(),
        })
    }

    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }

    /// The wrapped instance, without triggering initialization
    pub fn wrapped_value(&self) -> Option<&Instance> {
        self.wrapped.as_ref()
    }

    pub fn is_proxy_initialized(&self) -> bool {
        self.gate.is_initialized() && self.wrapped.is_some()
    }

    pub fn initialize_proxy(&mut self) -> Result<bool> {
        self.initialize("initializeProxy", Value::empty_map())
    }

    pub fn proxy_initializer(&self) -> Option<ValueHolderInitializer> {
        self.gate.initializer().cloned()
    }

    pub fn set_proxy_initializer(&mut self, initializer: Option<ValueHolderInitializer>) {
        self.gate.set_initializer(initializer);
    }

    /// Initializes the holder, then clones it together with its wrapped instance
    pub fn try_clone(&mut self) -> Result<Self> {
        self.initialize("__clone", Value::empty_map())?;
        let mut wrapped = self.wrapped.clone();
        if let Some(instance) = wrapped.as_mut() {
            let dispatcher = instance.dispatcher().clone();
            dispatcher.invoke_if_defined(instance, "__clone", &[])?;
        }
        Ok(Self {
            definition: self.definition.clone(),
            wrapped,
            gate: self.gate.clone(),
        })
    }

    pub fn snapshot(&mut self) -> Result<ProxySnapshot> {
        let instance = self.target("__sleep", Value::empty_map())?;
        Ok(ProxySnapshot::capture(instance.class_name(), instance.state()))
    }

    fn initialize(&mut self, operation: &str, parameters: Value) -> Result<bool> {
        let Some(mut pending) = self.gate.begin(operation) else {
            return Ok(false);
        };

        let initializer = pending.initializer().clone();
        let result = {
            let mut initialization = ValueHolderInitialization {
                definition: &self.definition,
                wrapped: &mut self.wrapped,
                operation,
                parameters,
                control: &mut pending.control,
            };
            initializer(&mut initialization)
        };

        self.gate.complete(pending, result)?;
        debug!(
            event = "value_holder_initialized",
            class = %self.definition.class_name(),
            operation = %operation,
            wrapped = self.wrapped.is_some(),
            "Value holder initialized"
        );
        Ok(true)
    }

    /// Fires the gate, then yields the wrapped instance
    fn target(&mut self, operation: &str, parameters: Value) -> Result<&mut Instance> {
        self.initialize(operation, parameters)?;
        self.wrapped
            .as_mut()
            .ok_or_else(|| ProxyError::MissingWrappedValue {
                class: self.definition.class_name().to_string(),
            })
    }
}

fn named(name: &str) -> Value {
    Value::map([("name", Value::str(name))])
}

impl Object for LazyValueHolder {
    fn class_name(&self) -> &str {
        self.definition.class_name()
    }

    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value> {
        self.target("__get", named(name))?.get_property(scope, name)
    }

    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value> {
        self.target("__get", named(name))?.property_mut(scope, name)
    }

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()> {
        let parameters = Value::map([("name", Value::str(name)), ("value", value.clone())]);
        self.target("__set", parameters)?.set_property(scope, name, value)
    }

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool> {
        self.target("__isset", named(name))?.has_property(scope, name)
    }

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()> {
        self.target("__unset", named(name))?.remove_property(scope, name)
    }

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value> {
        let parameters = match self.definition.wrapper(name) {
            Some(wrapper) => Value::map(
                wrapper
                    .params
                    .iter()
                    .zip(args.iter())
                    .map(|(param, arg)| (param.name.clone(), arg.clone())),
            ),
            None => Value::map([
                ("name", Value::str(name)),
                ("arguments", Value::List(args.to_vec())),
            ]),
        };
        self.target(name, parameters)?.call_method(scope, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::scope::ScopePolicy;
    use crate::core::class::{ClassDef, ClassRegistry, FieldDef, MethodDef};
    use crate::proxy::definition::{ProxyGenerator, ProxyKind};

    fn definition() -> Arc<ProxyDefinition> {
        let registry = ClassRegistry::new();
        registry.register(
            ClassDef::new("Greeter")
                .field(FieldDef::public("greeting", "hello"))
                .method(
                    MethodDef::new("greet", |ctx, args| {
                        let greeting = ctx.get("greeting")?;
                        let who = args[0].as_str().unwrap_or_default();
                        Ok(Value::str(format!("{} {}", greeting.as_str().unwrap_or_default(), who)))
                    })
                    .with_param("who"),
                ),
        );
        registry.register(ClassDef::new("Other"));
        let generator = ProxyGenerator::new(Arc::new(registry), Arc::new(ScopePolicy::default()));
        Arc::new(generator.generate(ProxyKind::ValueHolder, "Greeter").unwrap())
    }

    #[test]
    fn test_call_initializes_and_delegates() {
        let mut holder = LazyValueHolder::new(definition(), |init| {
            assert_eq!(init.operation(), "greet");
            assert_eq!(init.parameters().get("who"), Some(&Value::str("bob")));
            init.construct(&[])?;
            init.control().clear();
            Ok(())
        });

        assert!(holder.wrapped_value().is_none());
        let greeting = holder
            .call_method(&CallerScope::Outside, "greet", &[Value::str("bob")])
            .unwrap();
        assert_eq!(greeting, Value::str("hello bob"));
        assert!(holder.is_proxy_initialized());
        assert!(holder.wrapped_value().is_some());
    }

    #[test]
    fn test_missing_wrapped_value_is_reported() {
        let mut holder = LazyValueHolder::new(definition(), |_| Ok(()));
        assert!(matches!(
            holder.get_property(&CallerScope::Outside, "greeting"),
            Err(ProxyError::MissingWrappedValue { .. })
        ));
    }

    #[test]
    fn test_wrapped_instance_must_match_class() {
        let definition = definition();
        let mut holder = LazyValueHolder::new(definition.clone(), |init| {
            let registry = init.definition().registry().clone();
            let other = Instance::create(registry, "Other", &[])?;
            init.set_wrapped(other)
        });
        assert!(matches!(
            holder.initialize_proxy(),
            Err(ProxyError::Shape { .. })
        ));
    }

    #[test]
    fn test_clone_copies_wrapped_state() {
        let mut holder = LazyValueHolder::new(definition(), |init| init.construct(&[]));
        holder
            .set_property(&CallerScope::Outside, "greeting", Value::str("hi"))
            .unwrap();

        let mut copy = holder.try_clone().unwrap();
        copy.set_property(&CallerScope::Outside, "greeting", Value::str("hey"))
            .unwrap();

        assert_eq!(
            holder.get_property(&CallerScope::Outside, "greeting").unwrap(),
            Value::str("hi")
        );
        assert_eq!(
            copy.get_property(&CallerScope::Outside, "greeting").unwrap(),
            Value::str("hey")
        );
    }
}
