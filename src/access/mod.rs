//! Visibility-aware access to object state
//!
//! `accessor` holds the scoped slot capabilities, `scope` maps a bare name and a
//! caller class onto one of them, and `dispatch` runs the full access pipeline.

pub mod accessor;
pub mod dispatch;
pub mod scope;

pub use accessor::{AccessorCache, SlotAccessor, VisibilityAccessor};
pub use dispatch::{AccessDispatcher, AccessKind, AccessRequest, Dispatchable};
pub use scope::{AccessResolution, CallerScopeResolver, ScopePolicy};
