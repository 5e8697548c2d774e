//! Proxy type definitions
//!
//! A definition is everything the runtime needs to build instances of one proxy
//! kind over one original class: the classified slot layout, the dispatcher
//! consulted by every access, the methods that get wrapped, and a stable
//! generated name. It is computed once per (kind, class) and shared.

use crate::access::dispatch::{AccessDispatcher, AccessKind};
use crate::access::scope::ScopePolicy;
use crate::core::class::{ClassDef, ClassKind, ClassRegistry, ParamDef, Visibility};
use crate::errors::{ProxyError, Result};
use crate::shape::OriginalTypeShape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyKind {
    Ghost,
    ValueHolder,
    Interceptor,
    ScopeLocalizer,
}

impl ProxyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyKind::Ghost => "ghost",
            ProxyKind::ValueHolder => "value-holder",
            ProxyKind::Interceptor => "interceptor",
            ProxyKind::ScopeLocalizer => "scope-localizer",
        }
    }

    /// Kinds that embed the original state and therefore need concrete fields
    fn embeds_state(self) -> bool {
        matches!(self, ProxyKind::Ghost | ProxyKind::ScopeLocalizer)
    }

    fn constructors(self) -> Vec<ConstructorVariant> {
        match self {
            ProxyKind::Ghost => vec![
                ConstructorVariant::WithoutConstructor,
                ConstructorVariant::WithConstructor,
            ],
            ProxyKind::ValueHolder => vec![ConstructorVariant::WithoutConstructor],
            ProxyKind::Interceptor | ProxyKind::ScopeLocalizer => {
                vec![ConstructorVariant::WrapInstance]
            }
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ghost" => Ok(ProxyKind::Ghost),
            "value-holder" | "value_holder" => Ok(ProxyKind::ValueHolder),
            "interceptor" => Ok(ProxyKind::Interceptor),
            "scope-localizer" | "scope_localizer" => Ok(ProxyKind::ScopeLocalizer),
            other => Err(ProxyError::Config(format!("unknown proxy kind '{}'", other))),
        }
    }
}

/// How instances of a proxy type come into being
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstructorVariant {
    /// State allocated with declared defaults, user construction code skipped
    WithoutConstructor,
    /// The original `__construct` runs on the proxy itself
    WithConstructor,
    /// Wraps an instance that already exists
    WrapInstance,
}

/// One original public method the proxy overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodWrapper {
    pub name: String,
    pub declaring_class: String,
    pub params: Vec<ParamDef>,
    pub returns_ref: bool,
}

/// Serializable view of a definition's metadata tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSummary {
    pub name: String,
    pub kind: ProxyKind,
    pub class: String,
    pub public: Vec<String>,
    /// Protected name -> declaring class
    pub protected: BTreeMap<String, String>,
    /// Private name -> declaring classes, most-derived first
    pub private: BTreeMap<String, Vec<String>>,
    /// Physical slots in layout order
    pub layout: Vec<String>,
    pub constructors: Vec<ConstructorVariant>,
    pub access_routines: Vec<String>,
    pub methods: Vec<MethodWrapper>,
}

#[derive(Debug)]
pub struct ProxyDefinition {
    name: String,
    kind: ProxyKind,
    dispatcher: Arc<AccessDispatcher>,
    wrappers: Vec<MethodWrapper>,
}

impl ProxyDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    pub fn class_name(&self) -> &str {
        self.dispatcher.class_name()
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        self.dispatcher.class()
    }

    pub fn shape(&self) -> &Arc<OriginalTypeShape> {
        self.dispatcher.shape()
    }

    pub fn dispatcher(&self) -> &Arc<AccessDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        self.dispatcher.registry()
    }

    pub fn wrappers(&self) -> &[MethodWrapper] {
        &self.wrappers
    }

    pub fn wrapper(&self, method: &str) -> Option<&MethodWrapper> {
        self.wrappers.iter().find(|w| w.name == method)
    }

    pub fn is_wrapped(&self, method: &str) -> bool {
        self.wrapper(method).is_some()
    }

    pub fn summary(&self) -> DefinitionSummary {
        let shape = self.shape();
        DefinitionSummary {
            name: self.name.clone(),
            kind: self.kind,
            class: self.class_name().to_string(),
            public: shape.public_names().to_vec(),
            protected: shape.protected_names().iter().cloned().collect(),
            private: shape.private_names().iter().cloned().collect(),
            layout: shape.fields().iter().map(|f| f.key.to_string()).collect(),
            constructors: self.kind.constructors(),
            access_routines: [
                AccessKind::Get,
                AccessKind::Set,
                AccessKind::Exists,
                AccessKind::Remove,
                AccessKind::Call,
            ]
            .iter()
            .map(|k| k.magic_name().to_string())
            .collect(),
            methods: self.wrappers.clone(),
        }
    }
}

/// Builds proxy definitions from the class registry
pub struct ProxyGenerator {
    registry: Arc<ClassRegistry>,
    policy: Arc<ScopePolicy>,
    namespace: String,
}

impl ProxyGenerator {
    pub fn new(registry: Arc<ClassRegistry>, policy: Arc<ScopePolicy>) -> Self {
        Self {
            registry,
            policy,
            namespace: "ProxyKitGenerated".to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn generate(&self, kind: ProxyKind, class_name: &str) -> Result<ProxyDefinition> {
        let class = self.registry.require(class_name)?;

        if class.is_final {
            return Err(ProxyError::shape(class_name, "final classes cannot be extended"));
        }
        if class.kind == ClassKind::Interface && kind.embeds_state() {
            return Err(ProxyError::shape(
                class_name,
                format!("interfaces cannot back a {} proxy", kind),
            ));
        }

        let shape = Arc::new(OriginalTypeShape::classify(&self.registry, class_name)?);
        let wrappers = self.wrappers(class_name)?;
        let name = self.proxy_name(kind, &shape);

        debug!(
            event = "proxy_generated",
            kind = %kind,
            class = %class_name,
            proxy = %name,
            slots = shape.slot_count(),
            wrapped = wrappers.len(),
            "Generated proxy definition"
        );

        let dispatcher = AccessDispatcher::with_shape(
            self.registry.clone(),
            class,
            shape,
            self.policy.clone(),
        );

        Ok(ProxyDefinition {
            name,
            kind,
            dispatcher: Arc::new(dispatcher),
            wrappers,
        })
    }

    /// Public, non-final, non-magic methods, most-derived declaration first
    fn wrappers(&self, class_name: &str) -> Result<Vec<MethodWrapper>> {
        Ok(self
            .registry
            .methods(class_name)?
            .into_iter()
            .filter(|m| m.def.visibility == Visibility::Public)
            .filter(|m| !m.def.is_final && !m.def.name.starts_with("__"))
            .map(|m| MethodWrapper {
                name: m.def.name.clone(),
                declaring_class: m.declaring_class,
                params: m.def.params.clone(),
                returns_ref: m.def.returns_ref,
            })
            .collect())
    }

    /// Deterministic over (kind, class, slot layout)
    fn proxy_name(&self, kind: ProxyKind, shape: &OriginalTypeShape) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(shape.class_name().as_bytes());
        for field in shape.fields() {
            hasher.update(field.key.to_string().as_bytes());
        }
        let hash = hasher.finalize().to_hex();
        format!(
            "{}\\__PM__\\{}\\Generated{}",
            self.namespace,
            shape.class_name(),
            &hash.as_str()[..16]
        )
    }
}
