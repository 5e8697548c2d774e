//! Object model shared by plain instances and generated proxies
//!
//! Values, class definitions with their registry, and the `Object` protocol
//! every access goes through.

pub mod class;
pub mod object;
pub mod value;

pub use class::{ClassDef, ClassKind, ClassRegistry, FieldDef, MethodDef, ParamDef, Visibility};
pub use object::{CallerScope, Instance, MethodContext, Object, ObjectState};
pub use value::Value;
