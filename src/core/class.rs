//! Class model: declared fields, methods and the inheritance registry
//!
//! `ClassRegistry` is the introspection collaborator the proxy core relies on. It
//! answers "which classes does this one extend" and "where is this method declared"
//! and nothing more; it never looks at instance state.

use crate::core::object::MethodContext;
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Member visibility. New host levels get new variants here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Concrete,
    Abstract,
    Interface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub visibility: Visibility,
    pub default: Value,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, visibility: Visibility, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            visibility,
            default: default.into(),
        }
    }

    pub fn public(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(name, Visibility::Public, default)
    }

    pub fn protected(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(name, Visibility::Protected, default)
    }

    pub fn private(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(name, Visibility::Private, default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub optional: bool,
}

impl ParamDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            by_ref: false,
            optional: false,
        }
    }
}

/// Native method implementation. Runs with `$this` bound to the receiver and the
/// caller scope set to the declaring class.
pub type MethodBody = Arc<dyn Fn(&mut MethodContext<'_>, &[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub visibility: Visibility,
    pub params: Vec<ParamDef>,
    pub returns_ref: bool,
    pub is_final: bool,
    pub body: Option<MethodBody>,
}

impl MethodDef {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut MethodContext<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            params: Vec::new(),
            returns_ref: false,
            is_final: false,
            body: Some(Arc::new(body)),
        }
    }

    /// Signature without an implementation (interface or abstract method)
    pub fn signature(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            params: Vec::new(),
            returns_ref: false,
            is_final: false,
            body: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDef::new(name));
        self
    }

    pub fn with_params(mut self, params: Vec<ParamDef>) -> Self {
        self.params = params;
        self
    }

    pub fn returning_ref(mut self) -> Self {
        self.returns_ref = true;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// Number of parameters a caller must supply
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("params", &self.params)
            .field("returns_ref", &self.returns_ref)
            .field("is_final", &self.is_final)
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// Class definition: the fields and methods a class itself declares
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub kind: ClassKind,
    pub is_final: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            kind: ClassKind::Concrete,
            is_final: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::Interface,
            ..Self::new(name)
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn declared_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn declared_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A method found on a class or one of its ancestors
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub declaring_class: String,
    pub def: MethodDef,
}

/// Registry of known classes, shared by every proxy definition generated from it
pub struct ClassRegistry {
    classes: DashMap<String, Arc<ClassDef>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
        }
    }

    pub fn register(&self, class: ClassDef) -> Arc<ClassDef> {
        let class = Arc::new(class);
        self.classes.insert(class.name.clone(), class.clone());
        class
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).map(|r| r.value().clone())
    }

    pub fn require(&self, name: &str) -> Result<Arc<ClassDef>> {
        self.get(name).ok_or_else(|| ProxyError::UnknownClass {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// The class followed by its ancestors, most-derived first
    pub fn lineage(&self, name: &str) -> Result<Vec<Arc<ClassDef>>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());

        while let Some(class_name) = current {
            if !seen.insert(class_name.clone()) {
                return Err(ProxyError::Schema(format!(
                    "inheritance cycle through {}",
                    class_name
                )));
            }
            let class = self.require(&class_name)?;
            current = class.parent.clone();
            chain.push(class);
        }

        Ok(chain)
    }

    /// Strict subclass test, following parents and implemented interfaces
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let mut pending = vec![class.to_string()];
        let mut seen = HashSet::new();

        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(def) = self.get(&name) else {
                continue;
            };
            for base in def.parent.iter().chain(def.interfaces.iter()) {
                if base == ancestor {
                    return true;
                }
                pending.push(base.clone());
            }
        }

        false
    }

    /// `class` is `expected` or one of its subclasses
    pub fn is_a(&self, class: &str, expected: &str) -> bool {
        class == expected || self.is_subclass_of(class, expected)
    }

    /// Same class, subclass or superclass: the family check protected members need
    pub fn is_compatible(&self, caller: &str, declaring: &str) -> bool {
        self.is_a(caller, declaring) || self.is_subclass_of(declaring, caller)
    }

    /// Finds the most-derived declaration of `method` on `class` or its ancestors
    pub fn find_method(&self, class: &str, method: &str) -> Option<ResolvedMethod> {
        let lineage = self.lineage(class).ok()?;
        for def in &lineage {
            if let Some(m) = def.declared_method(method) {
                return Some(ResolvedMethod {
                    declaring_class: def.name.clone(),
                    def: m.clone(),
                });
            }
        }

        // Interface signatures come last
        for def in &lineage {
            for interface in &def.interfaces {
                if let Some(found) = self.find_method(interface, method) {
                    return Some(found);
                }
            }
        }

        None
    }

    /// The private `method` declared by `declaring`, if `declaring` is part of
    /// `class`'s lineage. A subclass redeclaring the name does not hide it.
    pub fn find_private_method(&self, class: &str, declaring: &str, method: &str) -> Option<ResolvedMethod> {
        let lineage = self.lineage(class).ok()?;
        let def = lineage.iter().find(|def| def.name == declaring)?;
        let found = def
            .declared_method(method)
            .filter(|m| m.visibility == Visibility::Private)?;
        Some(ResolvedMethod {
            declaring_class: def.name.clone(),
            def: found.clone(),
        })
    }

    pub fn has_method(&self, class: &str, method: &str) -> bool {
        self.find_method(class, method).is_some()
    }

    /// Every method reachable from `class`, most-derived declaration winning
    pub fn methods(&self, class: &str) -> Result<Vec<ResolvedMethod>> {
        let mut seen = HashSet::new();
        let mut methods = Vec::new();
        let lineage = self.lineage(class)?;

        for def in &lineage {
            for m in &def.methods {
                if seen.insert(m.name.clone()) {
                    methods.push(ResolvedMethod {
                        declaring_class: def.name.clone(),
                        def: m.clone(),
                    });
                }
            }
        }
        for def in &lineage {
            for interface in &def.interfaces {
                for m in self.methods(interface)? {
                    if seen.insert(m.def.name.clone()) {
                        methods.push(m);
                    }
                }
            }
        }

        Ok(methods)
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
