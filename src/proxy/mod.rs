//! Proxy kinds and the machinery they share
//!
//! - `gate`: one-shot initialization state machine
//! - `definition`: per-(kind, class) proxy type definitions
//! - `ghost`, `value_holder`: lazy-loading proxies
//! - `interceptor`: prefix/suffix hooks around method calls
//! - `factory`: definition cache and instance constructors

pub mod definition;
pub mod factory;
pub mod gate;
pub mod ghost;
pub mod interceptor;
pub mod value_holder;

pub use definition::{ConstructorVariant, DefinitionSummary, MethodWrapper, ProxyDefinition, ProxyGenerator, ProxyKind};
pub use factory::ProxyFactory;
pub use gate::{InitializationGate, InitializerControl};
pub use ghost::{GhostInitialization, GhostInitializer, GhostObject, GhostOptions, ProxySnapshot};
pub use interceptor::{
    prefix_hook, suffix_hook, HookPair, InterceptorChain, InterceptorProxy, InterceptorRecord,
    PrefixHook, PrefixOutcome, SuffixHook,
};
pub use value_holder::{LazyValueHolder, ValueHolderInitialization, ValueHolderInitializer};
