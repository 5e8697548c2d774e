//! proxykit: lazy-loading and access-intercepting proxies over a dynamic class model
//!
//! Classes are registered in a [`ClassRegistry`] (by hand or from a [`Schema`]),
//! then a [`ProxyFactory`] generates one definition per (proxy kind, class) and
//! builds ghosts, value holders, interceptors and scope localizers from it.

// Core modules
pub mod access;
pub mod core;
pub mod errors;
pub mod frontend;
pub mod infrastructure;
pub mod proxy;
pub mod shape;

// Re-export commonly used items
pub use access::{AccessDispatcher, AccessKind, AccessResolution, CallerScopeResolver, ScopePolicy};
pub use core::{
    CallerScope, ClassDef, ClassKind, ClassRegistry, FieldDef, Instance, MethodDef, Object, ParamDef, Value,
    Visibility,
};
pub use errors::{ProxyError, Result};
pub use frontend::{cli_main, ProxyConfig, Schema};
pub use infrastructure::{init_dev_logging, init_logging, LogConfig};
pub use proxy::{
    prefix_hook, suffix_hook, GhostObject, GhostOptions, InitializerControl, InterceptorProxy, LazyValueHolder,
    PrefixOutcome, ProxyDefinition, ProxyFactory, ProxyKind, ProxySnapshot,
};
pub use shape::{OriginalTypeShape, PropertyTable, SlotKey};
