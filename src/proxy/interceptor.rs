//! Method interception around real calls
//!
//! Each wrapped method carries an ordered list of (prefix, suffix) hook pairs.
//! Prefixes run in order and may rewrite the arguments or return early with a
//! substitute value, which skips the real call and the remaining prefixes.
//! Suffixes always run in order and may overwrite the value the caller gets.

use crate::core::object::{CallerScope, Instance, Object};
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use crate::proxy::definition::{ProxyDefinition, ProxyKind};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What a prefix hook decided
#[derive(Debug, Clone, PartialEq)]
pub enum PrefixOutcome {
    Proceed,
    /// Skip the real call and use this value instead
    ReturnEarly(Value),
}

pub type PrefixHook =
    Arc<dyn Fn(&mut dyn Object, &str, &mut Vec<Value>) -> Result<PrefixOutcome> + Send + Sync>;

pub type SuffixHook =
    Arc<dyn Fn(&mut dyn Object, &str, &[Value], &mut Value) -> Result<()> + Send + Sync>;

pub fn prefix_hook<F>(hook: F) -> PrefixHook
where
    F: Fn(&mut dyn Object, &str, &mut Vec<Value>) -> Result<PrefixOutcome> + Send + Sync + 'static,
{
    Arc::new(hook)
}

pub fn suffix_hook<F>(hook: F) -> SuffixHook
where
    F: Fn(&mut dyn Object, &str, &[Value], &mut Value) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(hook)
}

#[derive(Clone, Default)]
pub struct HookPair {
    pub prefix: Option<PrefixHook>,
    pub suffix: Option<SuffixHook>,
}

impl HookPair {
    fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.suffix.is_none()
    }
}

/// Hook pairs for one method, in registration order
#[derive(Clone, Default)]
pub struct InterceptorRecord {
    pairs: SmallVec<[HookPair; 2]>,
}

impl InterceptorRecord {
    pub fn push(&mut self, pair: HookPair) {
        if !pair.is_empty() {
            self.pairs.push(pair);
        }
    }

    /// Drops every prefix and installs `hook` as the only one
    pub fn replace_prefix(&mut self, hook: Option<PrefixHook>) {
        for pair in self.pairs.iter_mut() {
            pair.prefix = None;
        }
        if let Some(hook) = hook {
            match self.pairs.first_mut() {
                Some(first) => first.prefix = Some(hook),
                None => self.pairs.push(HookPair {
                    prefix: Some(hook),
                    suffix: None,
                }),
            }
        }
        self.pairs.retain(|pair| !pair.is_empty());
    }

    /// Drops every suffix and installs `hook` as the only one
    pub fn replace_suffix(&mut self, hook: Option<SuffixHook>) {
        for pair in self.pairs.iter_mut() {
            pair.suffix = None;
        }
        if let Some(hook) = hook {
            match self.pairs.first_mut() {
                Some(first) => first.suffix = Some(hook),
                None => self.pairs.push(HookPair {
                    prefix: None,
                    suffix: Some(hook),
                }),
            }
        }
        self.pairs.retain(|pair| !pair.is_empty());
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &PrefixHook> {
        self.pairs.iter().filter_map(|pair| pair.prefix.as_ref())
    }

    pub fn suffixes(&self) -> impl Iterator<Item = &SuffixHook> {
        self.pairs.iter().filter_map(|pair| pair.suffix.as_ref())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Debug for InterceptorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRecord")
            .field("prefixes", &self.prefixes().count())
            .field("suffixes", &self.suffixes().count())
            .finish()
    }
}

/// Interceptor records keyed by method name
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    records: HashMap<String, InterceptorRecord>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, method: &str) -> Option<&InterceptorRecord> {
        self.records.get(method)
    }

    pub fn add(&mut self, method: &str, pair: HookPair) {
        self.record_mut(method).push(pair);
    }

    pub fn set_prefix(&mut self, method: &str, hook: Option<PrefixHook>) {
        self.record_mut(method).replace_prefix(hook);
    }

    pub fn set_suffix(&mut self, method: &str, hook: Option<SuffixHook>) {
        self.record_mut(method).replace_suffix(hook);
    }

    fn record_mut(&mut self, method: &str) -> &mut InterceptorRecord {
        self.records.entry(method.to_string()).or_default()
    }

    /// Runs prefixes, the real call unless a prefix returned early, then suffixes
    pub fn invoke(
        &self,
        target: &mut dyn Object,
        scope: &CallerScope,
        method: &str,
        args: &[Value],
    ) -> Result<Value> {
        let record = match self.records.get(method) {
            Some(record) if !record.is_empty() => record,
            _ => return target.call_method(scope, method, args),
        };

        let mut args = args.to_vec();
        let mut early = None;
        for prefix in record.prefixes() {
            if let PrefixOutcome::ReturnEarly(value) = prefix(&mut *target, method, &mut args)? {
                trace!(event = "interceptor_return_early", method = %method, "Prefix hook returned early");
                early = Some(value);
                break;
            }
        }

        let mut value = match early {
            Some(value) => value,
            None => target.call_method(scope, method, &args)?,
        };

        for suffix in record.suffixes() {
            suffix(&mut *target, method, &args, &mut value)?;
        }

        Ok(value)
    }
}

/// Hooks around the wrapped methods of `T`; property access passes straight through.
///
/// Over an owned `Instance` this is the value-holder flavor. Over `&mut Instance`
/// it is the scope localizer: the proxy works on the original object's state.
#[derive(Debug)]
pub struct InterceptorProxy<T: Object> {
    definition: Arc<ProxyDefinition>,
    target: T,
    chain: InterceptorChain,
}

impl<T: Object> InterceptorProxy<T> {
    pub fn new(definition: Arc<ProxyDefinition>, target: T) -> Result<Self> {
        let registry = definition.registry();
        if !registry.is_a(target.class_name(), definition.class_name()) {
            return Err(ProxyError::shape(
                definition.class_name(),
                format!("cannot intercept an instance of {}", target.class_name()),
            ));
        }
        Ok(Self {
            definition,
            target,
            chain: InterceptorChain::new(),
        })
    }

    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Replaces the prefix hook of `method`; `None` removes it
    pub fn set_method_prefix_interceptor(&mut self, method: &str, hook: Option<PrefixHook>) {
        self.chain.set_prefix(method, hook);
    }

    /// Replaces the suffix hook of `method`; `None` removes it
    pub fn set_method_suffix_interceptor(&mut self, method: &str, hook: Option<SuffixHook>) {
        self.chain.set_suffix(method, hook);
    }

    /// Appends a hook pair after the ones already registered for `method`
    pub fn add_interceptor(
        &mut self,
        method: &str,
        prefix: Option<PrefixHook>,
        suffix: Option<SuffixHook>,
    ) {
        self.chain.add(method, HookPair { prefix, suffix });
    }
}

impl InterceptorProxy<Instance> {
    pub fn value_holder(definition: Arc<ProxyDefinition>, instance: Instance) -> Result<Self> {
        expect_kind(&definition, ProxyKind::Interceptor)?;
        Self::new(definition, instance)
    }
}

impl<'a> InterceptorProxy<&'a mut Instance> {
    pub fn scope_localizer(definition: Arc<ProxyDefinition>, instance: &'a mut Instance) -> Result<Self> {
        expect_kind(&definition, ProxyKind::ScopeLocalizer)?;
        Self::new(definition, instance)
    }
}

fn expect_kind(definition: &ProxyDefinition, kind: ProxyKind) -> Result<()> {
    if definition.kind() != kind {
        return Err(ProxyError::shape(
            definition.class_name(),
            format!("expected a {} definition, got {}", kind, definition.kind()),
        ));
    }
    Ok(())
}

impl<T: Object> Object for InterceptorProxy<T> {
    fn class_name(&self) -> &str {
        self.target.class_name()
    }

    fn get_property(&mut self, scope: &CallerScope, name: &str) -> Result<Value> {
        self.target.get_property(scope, name)
    }

    fn property_mut(&mut self, scope: &CallerScope, name: &str) -> Result<&mut Value> {
        self.target.property_mut(scope, name)
    }

    fn set_property(&mut self, scope: &CallerScope, name: &str, value: Value) -> Result<()> {
        self.target.set_property(scope, name, value)
    }

    fn has_property(&mut self, scope: &CallerScope, name: &str) -> Result<bool> {
        self.target.has_property(scope, name)
    }

    fn remove_property(&mut self, scope: &CallerScope, name: &str) -> Result<()> {
        self.target.remove_property(scope, name)
    }

    fn call_method(&mut self, scope: &CallerScope, name: &str, args: &[Value]) -> Result<Value> {
        if !self.definition.is_wrapped(name) {
            return self.target.call_method(scope, name, args);
        }
        self.chain.invoke(&mut self.target, scope, name, args)
    }
}
