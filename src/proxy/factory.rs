//! Proxy factory: one generated definition per (kind, class), shared by every
//! instance built from it.

use crate::access::dispatch::AccessDispatcher;
use crate::access::scope::ScopePolicy;
use crate::core::class::ClassRegistry;
use crate::core::object::{Instance, Object};
use crate::core::value::Value;
use crate::errors::Result;
use crate::frontend::config::ProxyConfig;
use crate::proxy::definition::{ProxyDefinition, ProxyGenerator, ProxyKind};
use crate::proxy::ghost::{GhostInitialization, GhostObject, GhostOptions};
use crate::proxy::interceptor::InterceptorProxy;
use crate::proxy::value_holder::{LazyValueHolder, ValueHolderInitialization};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

type DefinitionKey = (ProxyKind, String);

pub struct ProxyFactory {
    registry: Arc<ClassRegistry>,
    config: RwLock<ProxyConfig>,
    policy: RwLock<Arc<ScopePolicy>>,
    definitions: DashMap<DefinitionKey, Arc<ProxyDefinition>>,
}

impl ProxyFactory {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::with_config(registry, ProxyConfig::default())
    }

    pub fn with_config(registry: Arc<ClassRegistry>, config: ProxyConfig) -> Self {
        let policy = Arc::new(config.scope_policy());
        Self {
            registry,
            config: RwLock::new(config),
            policy: RwLock::new(policy),
            definitions: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn config(&self) -> ProxyConfig {
        self.config.read().clone()
    }

    /// Swaps the configuration; definitions generated under the old one are dropped
    pub fn set_config(&self, config: ProxyConfig) {
        *self.policy.write() = Arc::new(config.scope_policy());
        *self.config.write() = config;
        self.definitions.clear();
    }

    pub fn policy(&self) -> Arc<ScopePolicy> {
        self.policy.read().clone()
    }

    /// Generated definition for (kind, class), built on first request
    pub fn definition(&self, kind: ProxyKind, class: &str) -> Result<Arc<ProxyDefinition>> {
        let key = (kind, class.to_string());
        if let Some(definition) = self.definitions.get(&key) {
            trace!(kind = %kind, class = %class, "Definition cache hit");
            return Ok(definition.value().clone());
        }

        let namespace = self.config.read().naming.namespace.clone();
        let generator = ProxyGenerator::new(self.registry.clone(), self.policy()).with_namespace(namespace);
        let definition = Arc::new(generator.generate(kind, class)?);

        let cached = self
            .definitions
            .entry(key)
            .or_insert(definition)
            .value()
            .clone();
        debug!(kind = %kind, class = %class, cached = self.definitions.len(), "Definition cached");
        Ok(cached)
    }

    pub fn cached_definitions(&self) -> usize {
        self.definitions.len()
    }

    pub fn clear_cache(&self) {
        self.definitions.clear();
    }

    /// A plain instance under the factory's scope policy
    pub fn instance(&self, class: &str, args: &[Value]) -> Result<Instance> {
        let dispatcher = AccessDispatcher::new(self.registry.clone(), class, self.policy())?;
        Instance::new(Arc::new(dispatcher), args)
    }

    /// Uninitialized ghost, with skipped properties and gating taken from the config
    pub fn create_ghost<F>(&self, class: &str, initializer: F) -> Result<GhostObject>
    where
        F: Fn(&mut GhostInitialization<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let definition = self.definition(ProxyKind::Ghost, class)?;
        let options = {
            let config = self.config.read();
            GhostOptions::default()
                .initialize_on_method_call(config.ghost.initialize_on_method_call)
                .with_skipped(definition.shape(), config.skipped_for(class))?
        };
        Ok(GhostObject::lazy_with_options(definition, Arc::new(initializer), options))
    }

    pub fn create_ghost_with_options<F>(
        &self,
        class: &str,
        initializer: F,
        options: GhostOptions,
    ) -> Result<GhostObject>
    where
        F: Fn(&mut GhostInitialization<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let definition = self.definition(ProxyKind::Ghost, class)?;
        Ok(GhostObject::lazy_with_options(definition, Arc::new(initializer), options))
    }

    /// Ghost built through the original constructor
    pub fn construct_ghost(&self, class: &str, args: &[Value]) -> Result<GhostObject> {
        GhostObject::construct(self.definition(ProxyKind::Ghost, class)?, args)
    }

    pub fn create_value_holder<F>(&self, class: &str, initializer: F) -> Result<LazyValueHolder>
    where
        F: Fn(&mut ValueHolderInitialization<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let definition = self.definition(ProxyKind::ValueHolder, class)?;
        Ok(LazyValueHolder::new(definition, initializer))
    }

    /// Interceptor proxy that owns `instance`
    pub fn create_interceptor(&self, instance: Instance) -> Result<InterceptorProxy<Instance>> {
        let definition = self.definition(ProxyKind::Interceptor, instance.class_name())?;
        InterceptorProxy::value_holder(definition, instance)
    }

    /// Interceptor proxy operating on the state of an existing instance
    pub fn create_scope_localizer<'a>(
        &self,
        instance: &'a mut Instance,
    ) -> Result<InterceptorProxy<&'a mut Instance>> {
        let definition = self.definition(ProxyKind::ScopeLocalizer, instance.class_name())?;
        InterceptorProxy::scope_localizer(definition, instance)
    }
}
